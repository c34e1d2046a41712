use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

use futures::{
    stream,
    StreamExt,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::audio::{
    AudioKind,
    AudioService,
};
use crate::{
    core::{
        models::{
            EnrichmentOptions,
            MediaBundle,
            VocabularyEntry,
        },
        tasks::CancelToken,
        KotoError,
    },
    dictionary::{
        examples::rank_examples,
        LookupResult,
        LookupService,
        Sense,
    },
};

pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichedField {
    Lookup,
    Example,
    Audio,
    ExampleAudio,
}

impl fmt::Display for EnrichedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichedField::Lookup => "lookup",
            EnrichedField::Example => "example",
            EnrichedField::Audio => "audio",
            EnrichedField::ExampleAudio => "example_audio",
        };
        f.write_str(name)
    }
}

/// Result of enriching one entry. Never an error: failures are recorded per field.
#[derive(Debug, Clone, Default)]
pub struct RowOutcome {
    pub entry: VocabularyEntry,
    pub media: MediaBundle,
    pub senses: Vec<Sense>,
    pub failures: BTreeMap<EnrichedField, String>,
}

impl RowOutcome {
    fn fail(&mut self, field: EnrichedField, reason: impl ToString) {
        self.failures.insert(field, reason.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnenrichedRow {
    pub index: usize,
    pub word: String,
    pub failures: BTreeMap<EnrichedField, String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub entries: Vec<VocabularyEntry>,
    pub media: MediaBundle,
    pub unenriched: Vec<UnenrichedRow>,
}

pub struct EnrichmentOrchestrator {
    lookup: Arc<dyn LookupService>,
    audio: Option<Arc<dyn AudioService>>,
    max_meanings: usize,
    concurrency: usize,
}

impl EnrichmentOrchestrator {
    pub fn new(lookup: Arc<dyn LookupService>) -> Self {
        Self { lookup, audio: None, max_meanings: 3, concurrency: 6 }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioService>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_max_meanings(mut self, max_meanings: usize) -> Self {
        self.max_meanings = max_meanings.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn lookup_service(&self) -> &Arc<dyn LookupService> {
        &self.lookup
    }

    /// Fills missing reading, meaning, example and audio. CSV-provided values are never
    /// overwritten, and no service is called unless `enrich_cards` is set.
    pub async fn enrich(
        &self,
        entry: VocabularyEntry,
        options: &EnrichmentOptions,
        selection: Option<&[usize]>,
    ) -> RowOutcome {
        let mut outcome = RowOutcome { entry, ..Default::default() };
        if !options.enrich_cards {
            return outcome;
        }

        let word = outcome.entry.japanese.clone();
        let mut looked_up: Option<LookupResult> = None;

        if !outcome.entry.has_reading() || !outcome.entry.has_english() {
            match self.lookup.lookup(&word).await {
                Ok(result) => {
                    self.merge_lookup(&mut outcome.entry, &result, selection);
                    outcome.senses = result.senses.clone();
                    looked_up = Some(result);
                }
                Err(e) => outcome.fail(EnrichedField::Lookup, e),
            }
        }

        if options.wants_examples() && outcome.entry.examples.is_empty() {
            self.add_example(&mut outcome, looked_up.as_ref()).await;
        }

        if options.wants_audio() {
            match self.synthesize(&word, AudioKind::Word).await {
                Ok(file) => {
                    outcome.entry.audio_ref = Some(file.filename.clone());
                    outcome.media.insert(file);
                }
                Err(e) => outcome.fail(EnrichedField::Audio, e),
            }
        }

        if options.wants_example_audio() {
            let spoken = outcome.entry.first_example().map(|ex| ex.spoken_text().to_string());
            if let Some(spoken) = spoken.filter(|s| !s.is_empty()) {
                match self.synthesize(&spoken, AudioKind::Example).await {
                    Ok(file) => {
                        if let Some(example) = outcome.entry.first_example_mut() {
                            example.audio_ref = Some(file.filename.clone());
                        }
                        outcome.media.insert(file);
                    }
                    Err(e) => outcome.fail(EnrichedField::ExampleAudio, e),
                }
            }
        }

        outcome
    }

    fn merge_lookup(
        &self,
        entry: &mut VocabularyEntry,
        result: &LookupResult,
        selection: Option<&[usize]>,
    ) {
        if !entry.has_reading() {
            if let Some(reading) = result.reading.as_deref().filter(|r| !r.is_empty()) {
                entry.reading = Some(reading.to_string());
            }
        }

        if !entry.has_english() {
            let meanings = result.selected_meanings(selection);
            let capped: Vec<&str> =
                meanings.iter().take(self.max_meanings).map(String::as_str).collect();
            entry.english = capped.join("; ");
        }
    }

    async fn add_example(&self, outcome: &mut RowOutcome, looked_up: Option<&LookupResult>) {
        let word = outcome.entry.japanese.as_str();

        let candidates = match looked_up.filter(|r| !r.examples.is_empty()) {
            Some(result) => Ok(result.examples.clone()),
            None => self.lookup.examples(word).await,
        };

        match candidates {
            Ok(candidates) => match rank_examples(candidates, word).into_iter().next() {
                Some(best) => outcome.entry.examples.push(best),
                None => outcome.fail(EnrichedField::Example, "no example sentence found"),
            },
            Err(e) => outcome.fail(EnrichedField::Example, e),
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        kind: AudioKind,
    ) -> Result<crate::core::models::MediaFile, KotoError> {
        match &self.audio {
            Some(audio) => audio.synthesize(text, kind).await,
            None => Err(KotoError::enrichment(text, "no audio service configured")),
        }
    }

    /// Enriches entries with bounded concurrency. Output order matches input order.
    /// Cancellation is checked before each row starts; a cancelled batch returns `Cancelled`.
    pub async fn enrich_all(
        &self,
        entries: Vec<VocabularyEntry>,
        options: &EnrichmentOptions,
        cancel: &CancelToken,
        progress: Option<&ProgressFn>,
    ) -> Result<BatchOutcome, KotoError> {
        let total = entries.len();
        let concurrency = if options.enrich_cards { self.concurrency } else { 1 };

        let mut results = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((index, self.enrich(entry, options, None).await))
            })
            .buffered(concurrency);

        let mut batch = BatchOutcome::default();
        let mut completed = 0;

        while let Some(next) = results.next().await {
            let Some((index, outcome)) = next else {
                tracing::info!("Enrichment cancelled after {} of {} rows", completed, total);
                return Err(KotoError::Cancelled);
            };

            if !outcome.failures.is_empty() {
                for (field, reason) in &outcome.failures {
                    tracing::warn!(
                        "Row {} ('{}'): {} enrichment failed: {}",
                        index,
                        outcome.entry.japanese,
                        field,
                        reason
                    );
                }
                batch.unenriched.push(UnenrichedRow {
                    index,
                    word: outcome.entry.japanese.clone(),
                    failures: outcome.failures,
                });
            }

            batch.media.extend(outcome.media);
            batch.entries.push(outcome.entry);

            completed += 1;
            if let Some(progress) = progress {
                progress(completed, total);
            }
        }

        Ok(batch)
    }
}
