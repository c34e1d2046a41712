use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::{
    http::{
        http_client,
        send_with_retry,
    },
    models::MediaFile,
    utils::media_filename,
    KotoError,
};

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";
const GOOGLE_TTS_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Word,
    Example,
}

impl AudioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioKind::Word => "word",
            AudioKind::Example => "example",
        }
    }
}

/// Text-to-speech backend. The returned file name must be stable for the same input.
#[async_trait]
pub trait AudioService: Send + Sync {
    async fn synthesize(&self, text: &str, kind: AudioKind) -> Result<MediaFile, KotoError>;
}

#[derive(Debug, Clone)]
pub struct GoogleTts {
    client: Client,
    attempts: usize,
    language: String,
}

impl GoogleTts {
    pub fn new(timeout: Duration, attempts: usize) -> Result<Self, KotoError> {
        Ok(Self { client: http_client(timeout)?, attempts, language: "ja".to_string() })
    }
}

#[async_trait]
impl AudioService for GoogleTts {
    async fn synthesize(&self, text: &str, kind: AudioKind) -> Result<MediaFile, KotoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KotoError::enrichment(text, "nothing to synthesize"));
        }
        if text.chars().count() > GOOGLE_TTS_MAX_CHARS {
            return Err(KotoError::enrichment(text, "text too long for speech synthesis"));
        }

        let resp = send_with_retry(self.attempts, || {
            self.client.get(GOOGLE_TTS_URL).query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.language.as_str()),
                ("q", text),
            ])
        })
        .await
        .map_err(|e| KotoError::enrichment(text, e))?;

        let data = resp.bytes().await.map_err(|e| KotoError::enrichment(text, e))?.to_vec();
        if data.is_empty() {
            return Err(KotoError::enrichment(text, "speech service returned no audio"));
        }

        Ok(MediaFile { filename: media_filename(kind.as_str(), text), data })
    }
}
