use std::{
    collections::BTreeMap,
    sync::Arc,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    collection::{
        Collection,
        CollectionWord,
    },
    models::{
        Card,
        EnrichmentOptions,
        VocabularyEntry,
    },
    settings::Settings,
    tasks::CancelToken,
    KotoError,
};
use crate::{
    anki::{
        CardAssembler,
        Package,
        PackageExporter,
    },
    dictionary::{
        examples::rank_examples,
        JishoClient,
        LookupResult,
        LookupService,
    },
    enrichment::{
        AudioService,
        EnrichmentOrchestrator,
        GoogleTts,
        ProgressFn,
        UnenrichedRow,
    },
    mapping::{
        map_rows,
        CanonicalField,
        FieldMapInferencer,
        FieldMapping,
        MappingSuggestion,
        MappingValidator,
        Provenance,
        ValidationResult,
    },
    parser::{
        self,
        CsvFormat,
        HeaderSet,
        ParseOptions,
        ParsedCsv,
    },
    persistence::{
        new_key,
        KeyedStore,
        MemoryStore,
    },
};

/// An uploaded CSV and the mapping state built on top of it.
#[derive(Debug, Clone)]
pub struct Session {
    pub parsed: Arc<ParsedCsv>,
    pub suggestion: MappingSuggestion,
    pub applied: Option<FieldMapping>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResult {
    pub session_id: String,
    pub format: CsvFormat,
    pub headers: HeaderSet,
    pub sample_rows: Vec<Vec<String>>,
    pub suggested_mapping: FieldMapping,
    pub provenance: BTreeMap<CanonicalField, Provenance>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckRequest {
    /// Blank falls back to the file's `#deck:` directive, then the default deck name.
    #[serde(default)]
    pub deck_name: String,
    #[serde(default)]
    pub options: EnrichmentOptions,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
}

impl DeckRequest {
    pub fn new(deck_name: impl Into<String>, options: EnrichmentOptions) -> Self {
        Self { deck_name: deck_name.into(), options, mapping: None }
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeckResult {
    pub card_count: usize,
    pub note_count: usize,
    /// True when enrichment ran and every row came through it cleanly.
    pub enriched: bool,
    pub unenriched_rows: Vec<UnenrichedRow>,
    pub skipped_rows: usize,
    pub package: Package,
}

#[derive(Debug, Clone, Serialize)]
pub struct WordLookup {
    pub result: LookupResult,
    pub needs_selection: bool,
}

pub struct DeckPipeline {
    settings: Settings,
    sessions: Arc<dyn KeyedStore<Session>>,
    collections: Arc<dyn KeyedStore<Collection>>,
    orchestrator: EnrichmentOrchestrator,
    inferencer: FieldMapInferencer,
    validator: MappingValidator,
    assembler: CardAssembler,
    exporter: PackageExporter,
}

impl DeckPipeline {
    /// A pipeline with in-memory stores expiring after the configured TTLs.
    pub fn new(
        settings: Settings,
        lookup: Arc<dyn LookupService>,
        audio: Option<Arc<dyn AudioService>>,
    ) -> Self {
        let mut orchestrator = EnrichmentOrchestrator::new(lookup)
            .with_max_meanings(settings.max_meanings())
            .with_concurrency(settings.concurrency());
        if let Some(audio) = audio {
            orchestrator = orchestrator.with_audio(audio);
        }

        Self {
            sessions: Arc::new(MemoryStore::<Session>::with_ttl(settings.session_ttl())),
            collections: Arc::new(MemoryStore::<Collection>::with_ttl(settings.collection_ttl())),
            orchestrator,
            inferencer: FieldMapInferencer::default(),
            validator: MappingValidator,
            assembler: CardAssembler,
            exporter: PackageExporter::new(settings.missing_media),
            settings,
        }
    }

    /// A pipeline backed by the Jisho/Tatoeba and Google TTS HTTP clients.
    pub fn with_http_services(settings: Settings) -> Result<Self, KotoError> {
        let timeout = settings.request_timeout();
        let attempts = settings.request_attempts;
        let lookup = Arc::new(JishoClient::new(timeout, attempts)?);
        let audio = Arc::new(GoogleTts::new(timeout, attempts)?);
        Ok(Self::new(settings, lookup, Some(audio)))
    }

    pub fn with_stores(
        mut self,
        sessions: Arc<dyn KeyedStore<Session>>,
        collections: Arc<dyn KeyedStore<Collection>>,
    ) -> Self {
        self.sessions = sessions;
        self.collections = collections;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Parses and infers a mapping without storing anything.
    pub fn inspect(
        &self,
        bytes: &[u8],
        options: &ParseOptions,
    ) -> Result<(ParsedCsv, MappingSuggestion), KotoError> {
        let parsed = parser::parse(bytes, options)?;
        let suggestion = self.inferencer.infer_with_directives(
            &parsed.headers,
            parsed.sample(self.settings.analyze_sample_rows),
            &parsed.directives,
        );

        tracing::info!(
            "Inferred mapping for {} of {} fields",
            suggestion.mapping.len(),
            CanonicalField::ALL.len()
        );
        Ok((parsed, suggestion))
    }

    pub async fn analyze(
        &self,
        bytes: &[u8],
        options: &ParseOptions,
    ) -> Result<AnalyzeResult, KotoError> {
        let purged = self.sessions.purge_expired().await;
        if purged > 0 {
            tracing::debug!("Purged {} expired sessions", purged);
        }

        let (parsed, suggestion) = self.inspect(bytes, options)?;
        let session_id = new_key();

        let result = AnalyzeResult {
            session_id: session_id.clone(),
            format: parsed.format,
            headers: parsed.headers.clone(),
            sample_rows: parsed
                .sample(self.settings.analyze_sample_rows)
                .iter()
                .map(|row| row.values().to_vec())
                .collect(),
            suggested_mapping: suggestion.mapping.clone(),
            provenance: suggestion.provenance.clone(),
            row_count: parsed.rows.len(),
        };

        let session = Session { parsed: Arc::new(parsed), suggestion, applied: None };
        self.sessions.set(&session_id, session).await;

        tracing::info!("Created session {}", session_id);
        Ok(result)
    }

    async fn session(&self, session_id: &str) -> Result<Session, KotoError> {
        self.sessions
            .get(session_id)
            .await
            .ok_or_else(|| KotoError::SessionNotFound(session_id.to_string()))
    }

    pub async fn validate_mapping(
        &self,
        session_id: &str,
        mapping: &FieldMapping,
    ) -> Result<ValidationResult, KotoError> {
        let session = self.session(session_id).await?;
        Ok(self.validator.validate(mapping, &session.parsed.headers))
    }

    /// Stores a valid mapping on the session. The last applied mapping wins.
    pub async fn apply_mapping(
        &self,
        session_id: &str,
        mapping: FieldMapping,
    ) -> Result<(), KotoError> {
        let validation = self.validate_mapping(session_id, &mapping).await?;
        if !validation.valid {
            return Err(KotoError::Mapping(validation));
        }

        let updated = self
            .sessions
            .update(
                session_id,
                Box::new(move |current| {
                    current.map(|mut session| {
                        session.applied = Some(mapping);
                        session
                    })
                }),
            )
            .await;

        match updated {
            Some(_) => Ok(()),
            None => Err(KotoError::SessionNotFound(session_id.to_string())),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.sessions.delete(session_id).await.is_some()
    }

    /// Explicit mapping, else the applied one, else the inferred one. Always validated.
    fn resolve_mapping(
        &self,
        session: &Session,
        explicit: Option<&FieldMapping>,
    ) -> Result<FieldMapping, KotoError> {
        let mapping = explicit
            .or(session.applied.as_ref())
            .unwrap_or(&session.suggestion.mapping)
            .clone();

        let validation = self.validator.validate(&mapping, &session.parsed.headers);
        if !validation.valid {
            return Err(KotoError::Mapping(validation));
        }
        Ok(mapping)
    }

    fn session_entries(
        &self,
        session: &Session,
        request: &DeckRequest,
    ) -> Result<(Vec<VocabularyEntry>, usize), KotoError> {
        let mapping = self.resolve_mapping(session, request.mapping.as_ref())?;
        let mapped = map_rows(&mapping, &session.parsed.headers, &session.parsed.rows);
        if mapped.skipped_rows > 0 {
            tracing::info!("Skipped {} rows without a japanese value", mapped.skipped_rows);
        }
        Ok((mapped.entries, mapped.skipped_rows))
    }

    pub async fn create_deck(
        &self,
        session_id: &str,
        request: &DeckRequest,
    ) -> Result<DeckResult, KotoError> {
        self.create_deck_with(session_id, request, &CancelToken::new(), None).await
    }

    pub async fn create_deck_with(
        &self,
        session_id: &str,
        request: &DeckRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressFn>,
    ) -> Result<DeckResult, KotoError> {
        let session = self.session(session_id).await?;
        let (entries, skipped_rows) = self.session_entries(&session, request)?;

        let deck_name = match request.deck_name.trim() {
            "" => session.parsed.directives.deck().unwrap_or_default(),
            name => name,
        };
        self.build_deck(entries, skipped_rows, deck_name, &request.options, cancel, progress).await
    }

    /// Enriches and assembles the first `sample_count` entries. No package is built.
    pub async fn preview_cards(
        &self,
        session_id: &str,
        request: &DeckRequest,
        sample_count: Option<usize>,
    ) -> Result<Vec<Card>, KotoError> {
        let session = self.session(session_id).await?;
        let (mut entries, _) = self.session_entries(&session, request)?;
        entries.truncate(sample_count.unwrap_or(self.settings.preview_sample_count));

        let batch =
            self.orchestrator.enrich_all(entries, &request.options, &CancelToken::new(), None).await?;
        Ok(self.assembler.assemble_all(&batch.entries, &request.options))
    }

    async fn build_deck(
        &self,
        entries: Vec<VocabularyEntry>,
        skipped_rows: usize,
        deck_name: &str,
        options: &EnrichmentOptions,
        cancel: &CancelToken,
        progress: Option<&ProgressFn>,
    ) -> Result<DeckResult, KotoError> {
        if entries.is_empty() {
            return Err(KotoError::NoCards);
        }

        let batch = self.orchestrator.enrich_all(entries, options, cancel, progress).await?;
        if cancel.is_cancelled() {
            return Err(KotoError::Cancelled);
        }

        let cards = self.assembler.assemble_all(&batch.entries, options);
        let package = self.exporter.export(&cards, deck_name, &batch.media)?;

        Ok(DeckResult {
            card_count: package.card_count,
            note_count: package.note_count,
            enriched: options.enrich_cards && batch.unenriched.is_empty(),
            unenriched_rows: batch.unenriched,
            skipped_rows,
            package,
        })
    }

    pub async fn lookup_word(&self, word: &str) -> Result<WordLookup, KotoError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(KotoError::Custom("Cannot look up an empty word".into()));
        }

        let result = self.orchestrator.lookup_service().lookup(word).await?;
        Ok(WordLookup { needs_selection: result.needs_selection(), result })
    }

    /// Builds a collection word from the chosen senses, defaulting to the first one.
    pub fn select_senses(&self, result: &LookupResult, selection: Option<&[usize]>) -> CollectionWord {
        let mut entry = VocabularyEntry::new(result.word.as_str());
        if let Some(reading) = result.reading.as_deref() {
            entry = entry.with_reading(reading);
        }

        let meanings = result.selected_meanings(selection);
        entry.english = meanings
            .iter()
            .take(self.settings.max_meanings())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ");

        if let Some(example) = rank_examples(result.examples.clone(), &result.word).into_iter().next() {
            entry.examples.push(example);
        }

        let selected_senses: Vec<usize> = match selection {
            Some(picked) => {
                picked.iter().copied().filter(|idx| *idx < result.senses.len()).collect()
            }
            None => Vec::new(),
        };
        let selected_senses = if selected_senses.is_empty() && !result.senses.is_empty() {
            vec![0]
        } else {
            selected_senses
        };

        let mut word = CollectionWord::new(entry);
        word.parts_of_speech = result.selected_parts_of_speech(selection);
        word.selected_senses = selected_senses;
        word
    }

    /// Creates an empty named collection and returns its id.
    pub async fn create_collection(&self, name: &str) -> String {
        let collection_id = new_key();
        let collection = Collection::new(name);
        tracing::debug!("Created collection '{}' as {}", collection.name, collection_id);
        self.collections.set(&collection_id, collection).await;
        collection_id
    }

    /// Adds a word, creating the collection under the default name on first use.
    pub async fn add_to_collection(
        &self,
        collection_id: &str,
        word: CollectionWord,
    ) -> Result<Collection, KotoError> {
        let headword = word.word().to_string();
        let updated = self
            .collections
            .update(
                collection_id,
                Box::new(move |current| {
                    let mut collection =
                        current.unwrap_or_else(|| Collection::new(Collection::DEFAULT_NAME));
                    collection.add(word);
                    Some(collection)
                }),
            )
            .await
            .ok_or_else(|| KotoError::CollectionNotFound(collection_id.to_string()))?;

        tracing::debug!("Added '{}' to collection {}", headword, collection_id);
        Ok(updated)
    }

    /// Returns whether the word was present.
    pub async fn remove_from_collection(
        &self,
        collection_id: &str,
        word: &str,
    ) -> Result<bool, KotoError> {
        let mut removed = false;
        let updated = self
            .collections
            .update(
                collection_id,
                Box::new(|current| {
                    current.map(|mut collection| {
                        removed = collection.remove(word);
                        collection
                    })
                }),
            )
            .await;

        match updated {
            Some(_) => Ok(removed),
            None => Err(KotoError::CollectionNotFound(collection_id.to_string())),
        }
    }

    pub async fn list_collection(&self, collection_id: &str) -> Result<Collection, KotoError> {
        self.collections
            .get(collection_id)
            .await
            .ok_or_else(|| KotoError::CollectionNotFound(collection_id.to_string()))
    }

    pub async fn clear_collection(&self, collection_id: &str) -> Result<(), KotoError> {
        self.collections
            .update(
                collection_id,
                Box::new(|current| {
                    current.map(|mut collection| {
                        collection.clear();
                        collection
                    })
                }),
            )
            .await
            .map(|_| ())
            .ok_or_else(|| KotoError::CollectionNotFound(collection_id.to_string()))
    }

    pub async fn create_deck_from_collection(
        &self,
        collection_id: &str,
        deck_name: &str,
        options: &EnrichmentOptions,
        cancel: &CancelToken,
        progress: Option<&ProgressFn>,
    ) -> Result<DeckResult, KotoError> {
        let collection = self.list_collection(collection_id).await?;
        if collection.is_empty() {
            return Err(KotoError::EmptyCollection(collection_id.to_string()));
        }

        let deck_name = match deck_name.trim() {
            "" => collection.name.as_str(),
            name => name,
        };
        self.build_deck(collection.entries(), 0, deck_name, options, cancel, progress).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        core::models::{
            CardKind,
            ExampleSentence,
            MediaFile,
        },
        dictionary::Sense,
        enrichment::AudioKind,
        mapping::validation::GENERAL_KEY,
    };

    struct StubLookup;

    #[async_trait]
    impl LookupService for StubLookup {
        async fn lookup(&self, word: &str) -> Result<LookupResult, KotoError> {
            match word {
                "猫" => {
                    let mut result = LookupResult::from_senses(
                        "猫",
                        Some("ねこ".to_string()),
                        vec![
                            Sense {
                                meanings: vec!["cat".into()],
                                parts_of_speech: vec!["Noun".into()],
                                ..Default::default()
                            },
                            Sense {
                                meanings: vec!["shamisen".into()],
                                parts_of_speech: vec!["Noun, colloquial".into()],
                                ..Default::default()
                            },
                        ],
                    );
                    result.examples = vec![ExampleSentence::new("猫が好きです。", "I like cats.")];
                    Ok(result)
                }
                "犬" => Ok(LookupResult::from_senses(
                    "犬",
                    Some("いぬ".to_string()),
                    vec![Sense { meanings: vec!["dog".into()], ..Default::default() }],
                )),
                _ => Err(KotoError::enrichment(word, "not found")),
            }
        }
    }

    struct StubAudio;

    #[async_trait]
    impl AudioService for StubAudio {
        async fn synthesize(&self, text: &str, kind: AudioKind) -> Result<MediaFile, KotoError> {
            Ok(MediaFile {
                filename: crate::core::utils::media_filename(kind.as_str(), text),
                data: vec![0xff, 0xfb],
            })
        }
    }

    fn pipeline() -> DeckPipeline {
        DeckPipeline::new(Settings::default(), Arc::new(StubLookup), Some(Arc::new(StubAudio)))
    }

    async fn analyzed(pipeline: &DeckPipeline, csv: &str) -> AnalyzeResult {
        pipeline.analyze(csv.as_bytes(), &ParseOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_plain_csv_makes_one_card() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese,English,Tags\n猫,cat,animal\n").await;

        let result = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new("Animals", EnrichmentOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.card_count, 1);
        assert!(!result.enriched);

        let cards = pipeline
            .preview_cards(&analysis.session_id, &DeckRequest::new("Animals", EnrichmentOptions::default()), None)
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "猫");
        assert!(cards[0].back.contains("cat"));
        assert_eq!(cards[0].tags.iter().collect::<Vec<_>>(), vec!["animal"]);
    }

    #[tokio::test]
    async fn test_analyze_reports_suggestion() {
        let pipeline = pipeline();
        let analysis =
            analyzed(&pipeline, "Term,Definition,Pronunciation\n猫,cat,ねこ\n犬,dog,いぬ\n").await;

        assert_eq!(analysis.row_count, 2);
        assert_eq!(analysis.sample_rows[0], vec!["猫", "cat", "ねこ"]);
        assert_eq!(analysis.suggested_mapping.get(CanonicalField::Japanese), Some("Term"));
        assert_eq!(analysis.suggested_mapping.get(CanonicalField::Reading), Some("Pronunciation"));
        assert_eq!(analysis.provenance.get(&CanonicalField::English), Some(&Provenance::Header));
    }

    #[tokio::test]
    async fn test_apply_mapping_rejects_invalid_and_keeps_last_valid() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "ColA,ColB\n猫,cat\n").await;
        let id = analysis.session_id.as_str();

        let duplicate = FieldMapping::new()
            .with(CanonicalField::Japanese, "ColA")
            .with(CanonicalField::English, "ColA");
        let err = pipeline.apply_mapping(id, duplicate).await.unwrap_err();
        assert!(matches!(err, KotoError::Mapping(ref v) if v.errors.len() == 2));

        let first = FieldMapping::new().with(CanonicalField::Japanese, "ColA");
        let second = first.clone().with(CanonicalField::English, "ColB");
        pipeline.apply_mapping(id, first).await.unwrap();
        pipeline.apply_mapping(id, second).await.unwrap();

        let cards = pipeline
            .preview_cards(id, &DeckRequest::new("d", EnrichmentOptions::default()), None)
            .await
            .unwrap();
        assert!(cards[0].back.contains("cat"));
    }

    #[tokio::test]
    async fn test_explicit_mapping_overrides_applied() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "ColA,ColB\n猫,cat\n").await;
        let id = analysis.session_id.as_str();

        pipeline
            .apply_mapping(
                id,
                FieldMapping::new()
                    .with(CanonicalField::Japanese, "ColA")
                    .with(CanonicalField::English, "ColB"),
            )
            .await
            .unwrap();

        let request = DeckRequest::new("d", EnrichmentOptions::default())
            .with_mapping(FieldMapping::new().with(CanonicalField::Japanese, "ColA"));
        let cards = pipeline.preview_cards(id, &request, None).await.unwrap();
        assert!(!cards[0].back.contains("cat"));
    }

    #[tokio::test]
    async fn test_invalid_mapping_blocks_deck_creation() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "ColA,ColB\n猫,cat\n").await;

        let request = DeckRequest::new("d", EnrichmentOptions::default())
            .with_mapping(FieldMapping::new().with(CanonicalField::English, "ColB"));
        let err = pipeline.create_deck(&analysis.session_id, &request).await.unwrap_err();
        match err {
            KotoError::Mapping(validation) => {
                assert!(validation.error_for("japanese").is_some());
                assert!(validation.error_for(GENERAL_KEY).is_none());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let pipeline = pipeline();
        let err = pipeline
            .create_deck("missing", &DeckRequest::new("d", EnrichmentOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, KotoError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_enriched_core2000_deck() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese\n猫\n犬\n鳥\n").await;
        let options = EnrichmentOptions {
            enrich_cards: true,
            include_audio: true,
            include_examples: true,
            include_example_audio: false,
            use_core2000: true,
        };

        let seen = Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| {
            if let Ok(mut seen) = seen.lock() {
                seen.push((done, total));
            }
        };

        let result = pipeline
            .create_deck_with(
                &analysis.session_id,
                &DeckRequest::new("Core", options),
                &CancelToken::new(),
                Some(&progress),
            )
            .await
            .unwrap();

        assert_eq!(result.note_count, 3);
        // 鳥 fails lookup and has no English, so it gets no production card
        assert_eq!(result.card_count, 5);
        assert!(!result.enriched);
        // 犬 has no example
        let failed: Vec<&str> = result.unenriched_rows.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(failed, vec!["犬", "鳥"]);
        assert_eq!(result.package.media.len(), 3);
        assert_eq!(seen.lock().unwrap().last(), Some(&(3, 3)));
    }

    #[tokio::test]
    async fn test_cancelled_deck() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese\n猫\n").await;
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline
            .create_deck_with(
                &analysis.session_id,
                &DeckRequest::new("d", EnrichmentOptions::default()),
                &cancel,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KotoError::Cancelled));
    }

    #[tokio::test]
    async fn test_rows_without_headword_are_skipped() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese,English\n猫,cat\n,orphan\n").await;

        let result = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new("d", EnrichmentOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.card_count, 1);
        assert_eq!(result.skipped_rows, 1);

        let analysis = analyzed(&pipeline, "Japanese,English\n,orphan\n").await;
        let err = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new("d", EnrichmentOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, KotoError::NoCards));
    }

    #[tokio::test]
    async fn test_preview_limits_sample() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese,English\n猫,cat\n犬,dog\n鳥,bird\n").await;
        let options = EnrichmentOptions { use_core2000: true, ..Default::default() };

        let cards = pipeline
            .preview_cards(&analysis.session_id, &DeckRequest::new("d", options), Some(2))
            .await
            .unwrap();
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[2].kind, CardKind::Recognition);
        assert_eq!(cards[2].front, "犬");
    }

    #[tokio::test]
    async fn test_lookup_and_sense_selection() {
        let pipeline = pipeline();
        let lookup = pipeline.lookup_word(" 猫 ").await.unwrap();
        assert!(lookup.needs_selection);

        let default = pipeline.select_senses(&lookup.result, None);
        assert_eq!(default.entry.english, "cat");
        assert_eq!(default.selected_senses, vec![0]);
        assert_eq!(default.entry.examples[0].japanese, "猫が好きです。");

        let both = pipeline.select_senses(&lookup.result, Some(&[1, 0, 9]));
        assert_eq!(both.entry.english, "shamisen; cat");
        assert_eq!(both.selected_senses, vec![1, 0]);
        assert_eq!(both.parts_of_speech, vec!["Noun, colloquial", "Noun"]);

        assert!(pipeline.lookup_word("鳥").await.is_err());
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let pipeline = pipeline();
        let id = new_key();

        assert!(matches!(
            pipeline.list_collection(&id).await,
            Err(KotoError::CollectionNotFound(_))
        ));

        let cat = pipeline.select_senses(&pipeline.lookup_word("猫").await.unwrap().result, None);
        let dog = pipeline.select_senses(&pipeline.lookup_word("犬").await.unwrap().result, None);
        pipeline.add_to_collection(&id, cat.clone()).await.unwrap();
        pipeline.add_to_collection(&id, dog).await.unwrap();
        let collection = pipeline.add_to_collection(&id, cat).await.unwrap();
        assert_eq!(collection.len(), 2);

        let result = pipeline
            .create_deck_from_collection(&id, "Pets", &EnrichmentOptions::default(), &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(result.card_count, 2);
        assert_eq!(result.package.filename, crate::anki::package_filename("Pets"));

        let unnamed = pipeline
            .create_deck_from_collection(&id, "", &EnrichmentOptions::default(), &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(unnamed.package.deck_name, Collection::DEFAULT_NAME);

        assert!(pipeline.remove_from_collection(&id, "猫").await.unwrap());
        assert!(!pipeline.remove_from_collection(&id, "猫").await.unwrap());
        assert_eq!(pipeline.list_collection(&id).await.unwrap().len(), 1);

        pipeline.clear_collection(&id).await.unwrap();
        let err = pipeline
            .create_deck_from_collection(&id, "Pets", &EnrichmentOptions::default(), &CancelToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, KotoError::EmptyCollection(_)));
    }

    #[tokio::test]
    async fn test_created_collection_keeps_its_name() {
        let pipeline = pipeline();
        let id = pipeline.create_collection("Pets").await;
        assert!(pipeline.list_collection(&id).await.unwrap().is_empty());

        let dog = pipeline.select_senses(&pipeline.lookup_word("犬").await.unwrap().result, None);
        let collection = pipeline.add_to_collection(&id, dog).await.unwrap();
        assert_eq!(collection.name, "Pets");

        let result = pipeline
            .create_deck_from_collection(&id, " ", &EnrichmentOptions::default(), &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(result.package.deck_name, "Pets");

        assert!(matches!(
            pipeline.remove_from_collection("missing", "犬").await,
            Err(KotoError::CollectionNotFound(_))
        ));
        assert!(matches!(
            pipeline.clear_collection("missing").await,
            Err(KotoError::CollectionNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_collection_edits_are_not_lost() {
        let pipeline = Arc::new(pipeline());
        let id = pipeline.create_collection("Busy").await;
        for i in 0..32 {
            let word = CollectionWord::new(VocabularyEntry::new(format!("old{}", i)));
            pipeline.add_to_collection(&id, word).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..32 {
            let (adder, id_add) = (pipeline.clone(), id.clone());
            handles.push(tokio::spawn(async move {
                let word = CollectionWord::new(VocabularyEntry::new(format!("new{}", i)));
                adder.add_to_collection(&id_add, word).await.map(|_| true)
            }));

            let (remover, id_remove) = (pipeline.clone(), id.clone());
            handles.push(tokio::spawn(async move {
                remover.remove_from_collection(&id_remove, &format!("old{}", i)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        let collection = pipeline.list_collection(&id).await.unwrap();
        assert_eq!(collection.len(), 32);
        assert!((0..32).all(|i| collection.contains(&format!("new{}", i))));
        assert!((0..32).all(|i| !collection.contains(&format!("old{}", i))));
    }

    #[tokio::test]
    async fn test_deck_directive_names_unnamed_deck() {
        let pipeline = pipeline();
        let csv = "#separator:tab\n#deck:Animals\n#tags column:3\n#columns:Word\tMeaning\tLabels\n\
                   猫\tcat\tpet\n犬\tdog\tpet\n";
        let analysis = analyzed(&pipeline, csv).await;

        assert_eq!(analysis.suggested_mapping.get(CanonicalField::Tags), Some("Labels"));
        assert_eq!(analysis.provenance.get(&CanonicalField::Tags), Some(&Provenance::Directive));

        let unnamed = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new("", EnrichmentOptions::default()))
            .await
            .unwrap();
        assert_eq!(unnamed.package.deck_name, "Animals");
        assert_eq!(unnamed.package.filename, "Animals.apkg");

        let named = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new("Mine", EnrichmentOptions::default()))
            .await
            .unwrap();
        assert_eq!(named.package.deck_name, "Mine");

        let cards = pipeline
            .preview_cards(&analysis.session_id, &DeckRequest::default(), None)
            .await
            .unwrap();
        assert!(cards.iter().all(|card| card.tags.contains("pet")));
    }

    #[tokio::test]
    async fn test_unnamed_deck_without_directive_uses_default() {
        let pipeline = pipeline();
        let analysis = analyzed(&pipeline, "Japanese,English\n猫,cat\n").await;

        let result = pipeline
            .create_deck(&analysis.session_id, &DeckRequest::new(" ", EnrichmentOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.package.deck_name, crate::anki::DEFAULT_DECK_NAME);
    }
}
