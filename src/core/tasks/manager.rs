use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc,
};

use super::{
    handle::{
        CancelToken,
        TaskHandle,
    },
    types::{
        DeckJobUpdate,
        DeckProgress,
    },
};
use crate::core::{
    models::EnrichmentOptions,
    pipeline::{
        DeckPipeline,
        DeckRequest,
        DeckResult,
    },
    KotoError,
};

/// What a background deck job builds from.
#[derive(Debug, Clone)]
pub enum DeckJob {
    Session { session_id: String, request: DeckRequest },
    Collection { collection_id: String, deck_name: String, options: EnrichmentOptions },
}

pub struct TaskManager {
    runtime: Handle,
}

impl TaskManager {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// A manager on the runtime the caller is already running in.
    pub fn current() -> Result<Self, KotoError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| KotoError::Custom(format!("No tokio runtime available: {}", e)))
    }

    /// Runs a deck job in the background. Updates arrive on the returned receiver,
    /// ending with exactly one terminal update.
    pub fn spawn_deck_job(
        &self,
        pipeline: Arc<DeckPipeline>,
        job: DeckJob,
    ) -> (TaskHandle, mpsc::UnboundedReceiver<DeckJobUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancelToken::new();
        let cancel = cancel_token.clone();

        let join_handle = self.runtime.spawn(async move {
            let progress_sender = sender.clone();
            let progress = move |completed: usize, total: usize| {
                let _ = progress_sender
                    .send(DeckJobUpdate::Progress(DeckProgress { completed, total }));
            };

            let result: Result<DeckResult, KotoError> = match &job {
                DeckJob::Session { session_id, request } => {
                    pipeline.create_deck_with(session_id, request, &cancel, Some(&progress)).await
                }
                DeckJob::Collection { collection_id, deck_name, options } => {
                    pipeline
                        .create_deck_from_collection(
                            collection_id,
                            deck_name,
                            options,
                            &cancel,
                            Some(&progress),
                        )
                        .await
                }
            };

            let update = match result {
                Ok(deck) => DeckJobUpdate::Complete(Ok(deck)),
                Err(KotoError::Cancelled) => DeckJobUpdate::Cancelled,
                Err(e) => {
                    tracing::error!("Deck job failed: {}", e);
                    DeckJobUpdate::Complete(Err(e.to_string()))
                }
            };
            let _ = sender.send(update);
        });

        (TaskHandle::new(cancel_token, join_handle), receiver)
    }

    pub fn spawn_create_deck(
        &self,
        pipeline: Arc<DeckPipeline>,
        session_id: impl Into<String>,
        request: DeckRequest,
    ) -> (TaskHandle, mpsc::UnboundedReceiver<DeckJobUpdate>) {
        self.spawn_deck_job(pipeline, DeckJob::Session { session_id: session_id.into(), request })
    }
}

/// Drains whatever updates are ready without waiting.
pub fn poll_updates(receiver: &mut mpsc::UnboundedReceiver<DeckJobUpdate>) -> Vec<DeckJobUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        core::settings::Settings,
        dictionary::{
            LookupResult,
            LookupService,
        },
        parser::ParseOptions,
    };

    struct NoLookup;

    #[async_trait]
    impl LookupService for NoLookup {
        async fn lookup(&self, word: &str) -> Result<LookupResult, KotoError> {
            Err(KotoError::enrichment(word, "offline"))
        }
    }

    async fn collect(mut receiver: mpsc::UnboundedReceiver<DeckJobUpdate>) -> Vec<DeckJobUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = receiver.recv().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn test_deck_job_reports_progress_then_completes() {
        let pipeline = Arc::new(DeckPipeline::new(Settings::default(), Arc::new(NoLookup), None));
        let analysis = pipeline
            .analyze("Japanese,English\n猫,cat\n犬,dog\n".as_bytes(), &ParseOptions::default())
            .await
            .unwrap();

        let manager = TaskManager::current().unwrap();
        let (handle, receiver) = manager.spawn_create_deck(
            pipeline,
            analysis.session_id,
            DeckRequest::new("Pets", EnrichmentOptions::default()),
        );

        let updates = collect(receiver).await;
        handle.join().await;

        let progress: Vec<usize> = updates
            .iter()
            .filter_map(|u| match u {
                DeckJobUpdate::Progress(p) => Some(p.completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2]);

        match updates.last() {
            Some(DeckJobUpdate::Complete(Ok(deck))) => assert_eq!(deck.card_count, 2),
            other => panic!("unexpected final update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let pipeline = Arc::new(DeckPipeline::new(Settings::default(), Arc::new(NoLookup), None));
        let manager = TaskManager::current().unwrap();
        let (_handle, mut receiver) = manager.spawn_deck_job(
            pipeline,
            DeckJob::Collection {
                collection_id: "nope".into(),
                deck_name: "Empty".into(),
                options: EnrichmentOptions::default(),
            },
        );

        let update = receiver.recv().await.unwrap();
        assert_eq!(update.update_type(), "deck_failed");
        assert!(poll_updates(&mut receiver).is_empty());
    }
}
