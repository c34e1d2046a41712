use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{
    examples::rank_examples,
    LookupResult,
    LookupService,
    Sense,
};
use crate::core::{
    http::{
        http_client,
        send_with_retry,
    },
    models::ExampleSentence,
    KotoError,
};

const JISHO_SEARCH_URL: &str = "https://jisho.org/api/v1/search/words";
const TATOEBA_SEARCH_URL: &str = "https://tatoeba.org/en/api_v0/search";
const MAX_EXAMPLES: usize = 3;

#[derive(Debug, Deserialize)]
struct JishoResponse {
    #[serde(default)]
    data: Vec<JishoEntry>,
}

#[derive(Debug, Deserialize)]
struct JishoEntry {
    #[serde(default)]
    is_common: Option<bool>,
    #[serde(default)]
    jlpt: Vec<String>,
    #[serde(default)]
    japanese: Vec<JishoForm>,
    #[serde(default)]
    senses: Vec<JishoSense>,
}

#[derive(Debug, Deserialize)]
struct JishoForm {
    word: Option<String>,
    reading: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JishoSense {
    #[serde(default)]
    english_definitions: Vec<String>,
    #[serde(default)]
    parts_of_speech: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl JishoEntry {
    fn matches(&self, word: &str) -> bool {
        self.japanese.iter().any(|form| {
            form.word.as_deref() == Some(word) || form.reading.as_deref() == Some(word)
        })
    }

    fn into_result(self, word: &str) -> LookupResult {
        let reading = self
            .japanese
            .iter()
            .find(|form| form.word.as_deref() == Some(word))
            .or_else(|| self.japanese.first())
            .and_then(|form| form.reading.clone());

        let senses = self
            .senses
            .into_iter()
            .filter(|sense| !sense.english_definitions.is_empty())
            .map(|sense| Sense {
                meanings: sense.english_definitions,
                parts_of_speech: sense.parts_of_speech,
                tags: sense.tags,
            })
            .collect();

        let mut result = LookupResult::from_senses(word, reading, senses);
        result.is_common = self.is_common.unwrap_or(false);
        result.jlpt = self.jlpt;
        result
    }
}

/// Picks the entry whose headword or reading equals `word`, else the first one.
fn parse_lookup(word: &str, body: &str) -> Result<LookupResult, KotoError> {
    let response: JishoResponse = serde_json::from_str(body)?;
    let mut entries = response.data;

    let idx = entries.iter().position(|entry| entry.matches(word)).unwrap_or(0);
    if idx >= entries.len() {
        return Err(KotoError::enrichment(word, "no dictionary entry found"));
    }

    let result = entries.swap_remove(idx).into_result(word);
    if result.senses.is_empty() {
        return Err(KotoError::enrichment(word, "dictionary entry has no meanings"));
    }
    Ok(result)
}

fn english_translation(translations: &Value) -> Option<String> {
    let groups = translations.as_array()?;
    groups
        .iter()
        .flat_map(|group| match group {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .find(|t| t.get("lang").and_then(Value::as_str) == Some("eng"))
        .and_then(|t| t.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

/// Sentences containing `word` that have an English translation, best first.
fn parse_examples(word: &str, body: &str) -> Result<Vec<ExampleSentence>, KotoError> {
    let response: Value = serde_json::from_str(body)?;
    let results = response.get("results").and_then(Value::as_array).cloned().unwrap_or_default();

    let examples = results
        .iter()
        .filter_map(|result| {
            let text = result.get("text").and_then(Value::as_str)?;
            let english = english_translation(result.get("translations")?)?;
            text.contains(word).then(|| ExampleSentence::new(text, english))
        })
        .collect();

    let mut ranked = rank_examples(examples, word);
    ranked.truncate(MAX_EXAMPLES);
    Ok(ranked)
}

/// Jisho word search for meanings, Tatoeba for example sentences.
#[derive(Debug, Clone)]
pub struct JishoClient {
    client: Client,
    attempts: usize,
}

impl JishoClient {
    pub fn new(timeout: Duration, attempts: usize) -> Result<Self, KotoError> {
        Ok(Self { client: http_client(timeout)?, attempts })
    }
}

#[async_trait]
impl LookupService for JishoClient {
    async fn lookup(&self, word: &str) -> Result<LookupResult, KotoError> {
        let resp = send_with_retry(self.attempts, || {
            self.client.get(JISHO_SEARCH_URL).query(&[("keyword", word)])
        })
        .await
        .map_err(|e| KotoError::enrichment(word, e))?;

        let body = resp.text().await.map_err(|e| KotoError::enrichment(word, e))?;
        parse_lookup(word, &body)
    }

    async fn examples(&self, word: &str) -> Result<Vec<ExampleSentence>, KotoError> {
        let resp = send_with_retry(self.attempts, || {
            self.client
                .get(TATOEBA_SEARCH_URL)
                .query(&[("from", "jpn"), ("to", "eng"), ("query", word)])
        })
        .await
        .map_err(|e| KotoError::enrichment(word, e))?;

        let body = resp.text().await.map_err(|e| KotoError::enrichment(word, e))?;
        parse_examples(word, &body)
    }
}
