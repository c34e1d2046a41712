use std::collections::{
    BTreeMap,
    BTreeSet,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::utils::normalize_tag;

/// Flags controlling what the pipeline adds on top of the CSV data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichmentOptions {
    pub enrich_cards: bool,
    pub include_audio: bool,
    pub include_examples: bool,
    pub include_example_audio: bool,
    pub use_core2000: bool,
}

impl EnrichmentOptions {
    pub fn wants_audio(&self) -> bool {
        self.enrich_cards && self.include_audio
    }

    pub fn wants_examples(&self) -> bool {
        self.enrich_cards && self.include_examples
    }

    pub fn wants_example_audio(&self) -> bool {
        self.wants_examples() && self.include_example_audio
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleSentence {
    pub japanese: String,
    #[serde(default)]
    pub english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

impl ExampleSentence {
    pub fn new(japanese: impl Into<String>, english: impl Into<String>) -> Self {
        Self { japanese: japanese.into(), english: english.into(), audio_ref: None }
    }

    /// A CSV example cell is kept whole so the exported text matches the source.
    pub fn from_field(text: &str) -> Self {
        Self::new(text.trim(), "")
    }

    pub fn render(&self) -> String {
        if self.english.is_empty() {
            self.japanese.clone()
        } else {
            format!("{} ({})", self.japanese, self.english)
        }
    }

    /// The part worth reading aloud: everything before an inline translation.
    pub fn spoken_text(&self) -> &str {
        let text = self.japanese.as_str();
        let cut = [text.find('('), text.find('（'), text.find(" - ")].into_iter().flatten().min();

        match cut {
            Some(idx) => text[..idx].trim(),
            None => text.trim(),
        }
    }
}

/// One vocabulary item, built from a CSV row or a collection word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub japanese: String,
    #[serde(default)]
    pub english: String,
    #[serde(default)]
    pub reading: Option<String>,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

impl VocabularyEntry {
    pub fn new(japanese: impl Into<String>) -> Self {
        Self { japanese: japanese.into(), ..Default::default() }
    }

    pub fn with_english(mut self, english: impl Into<String>) -> Self {
        self.english = english.into();
        self
    }

    pub fn with_reading(mut self, reading: impl Into<String>) -> Self {
        let reading = reading.into();
        self.reading = (!reading.is_empty()).then_some(reading);
        self
    }

    pub fn with_example(mut self, example: ExampleSentence) -> Self {
        self.examples.push(example);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.insert_tag(tag);
        self
    }

    pub fn insert_tag(&mut self, tag: &str) {
        if let Some(tag) = normalize_tag(tag) {
            self.tags.insert(tag);
        }
    }

    /// Splits a raw tags cell on `,` and `;`.
    pub fn insert_tags_field(&mut self, raw: &str) {
        for tag in raw.split([',', ';']) {
            self.insert_tag(tag);
        }
    }

    pub fn reading(&self) -> &str {
        self.reading.as_deref().unwrap_or("")
    }

    pub fn has_reading(&self) -> bool {
        self.reading.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn has_english(&self) -> bool {
        !self.english.trim().is_empty()
    }

    pub fn first_example(&self) -> Option<&ExampleSentence> {
        self.examples.first()
    }

    pub fn first_example_mut(&mut self) -> Option<&mut ExampleSentence> {
        self.examples.first_mut()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Media produced during a run, keyed by filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaBundle {
    files: BTreeMap<String, Vec<u8>>,
}

impl MediaBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: MediaFile) {
        self.files.insert(file.filename, file.data);
    }

    pub fn extend(&mut self, other: MediaBundle) {
        self.files.extend(other.files);
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&[u8]> {
        self.files.get(filename).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Basic,
    Recognition,
    Production,
}

impl CardKind {
    /// Template position within the note type that renders this card.
    pub fn ordinal(&self) -> usize {
        match self {
            CardKind::Basic | CardKind::Recognition => 0,
            CardKind::Production => 1,
        }
    }
}

/// Note fields in export order: Japanese, Reading, English, Example, Audio, ExampleAudio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub japanese: String,
    pub reading: String,
    pub english: String,
    pub example: String,
    pub audio: String,
    pub example_audio: String,
}

impl NoteFields {
    pub const NAMES: [&'static str; 6] =
        ["Japanese", "Reading", "English", "Example", "Audio", "ExampleAudio"];

    pub fn as_array(&self) -> [&str; 6] {
        [
            &self.japanese,
            &self.reading,
            &self.english,
            &self.example,
            &self.audio,
            &self.example_audio,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub kind: CardKind,
    pub front: String,
    pub back: String,
    pub tags: BTreeSet<String>,
    pub note: NoteFields,
}
