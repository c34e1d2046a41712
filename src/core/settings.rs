use std::{
    path::Path,
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::KotoError;
use crate::{
    anki::MissingMediaPolicy,
    persistence::{
        load_json_from,
        load_json_or_default,
        save_json,
    },
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub concurrency: usize,
    pub preview_sample_count: usize,
    pub analyze_sample_rows: usize,
    pub session_ttl_secs: u64,
    pub collection_ttl_secs: u64,
    pub max_meanings: usize,
    pub request_timeout_secs: u64,
    pub request_attempts: usize,
    pub missing_media: MissingMediaPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 6,
            preview_sample_count: 5,
            analyze_sample_rows: 5,
            session_ttl_secs: 60 * 60,
            collection_ttl_secs: 7 * 24 * 60 * 60,
            max_meanings: 3,
            request_timeout_secs: 30,
            request_attempts: 3,
            missing_media: MissingMediaPolicy::Omit,
        }
    }
}

impl Settings {
    /// Settings from the app data directory, or defaults.
    pub fn load() -> Self {
        load_json_or_default(SETTINGS_FILE)
    }

    pub fn load_from(path: &Path) -> Result<Self, KotoError> {
        load_json_from(path)
    }

    pub fn save(&self) -> Result<(), KotoError> {
        save_json(self, SETTINGS_FILE)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, 32)
    }

    pub fn max_meanings(&self) -> usize {
        self.max_meanings.max(1)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn collection_ttl(&self) -> Duration {
        Duration::from_secs(self.collection_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"concurrency": 64, "missing_media": "fail"}"#).unwrap();
        assert_eq!(settings.concurrency(), 32);
        assert_eq!(settings.missing_media, MissingMediaPolicy::Fail);
        assert_eq!(settings.max_meanings, 3);
        assert_eq!(settings.session_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"preview_sample_count": 2}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.preview_sample_count, 2);
        assert_eq!(settings.concurrency, 6);
    }

    #[test]
    fn test_concurrency_floor() {
        let settings = Settings { concurrency: 0, ..Default::default() };
        assert_eq!(settings.concurrency(), 1);
    }
}
