use thiserror::Error;

use crate::mapping::ValidationResult;

#[derive(Error, Debug)]
pub enum KotoError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Malformed input at line {line}: {message}")]
    MalformedInput { line: u64, message: String },

    #[error("Input is not valid {encoding} text")]
    Undecodable { encoding: &'static str },

    #[error("Invalid field mapping: {}", .0.summary())]
    Mapping(ValidationResult),

    #[error("Enrichment failed for '{word}': {reason}")]
    Enrichment { word: String, reason: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Card references media file '{filename}' that was never produced")]
    DanglingMedia { filename: String },

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Collection {0} not found")]
    CollectionNotFound(String),

    #[error("Collection {0} is empty")]
    EmptyCollection(String),

    #[error("No cards could be created from the input")]
    NoCards,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("KotoError: {0}")]
    Custom(String),
}

impl KotoError {
    pub fn enrichment(word: &str, reason: impl ToString) -> Self {
        KotoError::Enrichment { word: word.to_string(), reason: reason.to_string() }
    }

    /// Parse and mapping failures are the caller's to fix; everything else is ours.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            KotoError::MalformedInput { .. } | KotoError::Undecodable { .. } | KotoError::Mapping(_)
        )
    }
}

impl From<std::io::Error> for KotoError {
    fn from(error: std::io::Error) -> Self {
        KotoError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for KotoError {
    fn from(error: reqwest::Error) -> Self {
        KotoError::Reqwest(Box::new(error))
    }
}
