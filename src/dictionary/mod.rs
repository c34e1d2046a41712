pub mod examples;
pub mod jisho;

use async_trait::async_trait;
pub use jisho::JishoClient;
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    models::ExampleSentence,
    KotoError,
};

/// One meaning group of a headword, with its own parts of speech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    pub meanings: Vec<String>,
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub word: String,
    #[serde(default)]
    pub reading: Option<String>,
    #[serde(default)]
    pub meanings: Vec<String>,
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
    #[serde(default)]
    pub senses: Vec<Sense>,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
    #[serde(default)]
    pub is_common: bool,
    #[serde(default)]
    pub jlpt: Vec<String>,
}

impl LookupResult {
    /// Fills the flat meaning and part-of-speech lists from the senses.
    pub fn from_senses(word: &str, reading: Option<String>, senses: Vec<Sense>) -> Self {
        let mut result = LookupResult { word: word.to_string(), reading, ..Default::default() };
        for sense in &senses {
            push_unique(&mut result.meanings, &sense.meanings);
            push_unique(&mut result.parts_of_speech, &sense.parts_of_speech);
        }
        result.senses = senses;
        result
    }

    pub fn needs_selection(&self) -> bool {
        self.senses.len() > 1
    }

    /// Senses picked by index. Out-of-range indices are ignored; an empty or missing
    /// selection means the first sense.
    pub fn selected_senses(&self, selection: Option<&[usize]>) -> Vec<&Sense> {
        let picked: Vec<&Sense> = selection
            .unwrap_or_default()
            .iter()
            .filter_map(|idx| self.senses.get(*idx))
            .collect();

        if picked.is_empty() {
            self.senses.first().into_iter().collect()
        } else {
            picked
        }
    }

    /// Meanings of the selected senses, falling back to the flat list when there are no senses.
    pub fn selected_meanings(&self, selection: Option<&[usize]>) -> Vec<String> {
        let senses = self.selected_senses(selection);
        if senses.is_empty() {
            return self.meanings.clone();
        }

        let mut meanings = Vec::new();
        for sense in senses {
            push_unique(&mut meanings, &sense.meanings);
        }
        meanings
    }

    pub fn selected_parts_of_speech(&self, selection: Option<&[usize]>) -> Vec<String> {
        let senses = self.selected_senses(selection);
        if senses.is_empty() {
            return self.parts_of_speech.clone();
        }

        let mut parts = Vec::new();
        for sense in senses {
            push_unique(&mut parts, &sense.parts_of_speech);
        }
        parts
    }
}

fn push_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// Dictionary backend consulted during enrichment.
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn lookup(&self, word: &str) -> Result<LookupResult, KotoError>;

    async fn examples(&self, _word: &str) -> Result<Vec<ExampleSentence>, KotoError> {
        Ok(Vec::new())
    }
}
