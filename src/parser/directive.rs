use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    assemble,
    read_records,
    CsvFormat,
    CsvParser,
    HeaderMode,
    ParsedCsv,
};
use crate::core::KotoError;

const MARKERS: [&str; 4] = ["#separator:", "#html:", "#columns:", "#notetype:"];

/// `#key:value` lines from the top of an Anki text file. Keys are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directives {
    entries: BTreeMap<String, String>,
}

impl Directives {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.trim().to_lowercase(), value.trim().to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn separator(&self) -> Result<u8, KotoError> {
        let Some(value) = self.get("separator") else {
            return Ok(b'\t');
        };

        match value.to_lowercase().as_str() {
            "tab" => Ok(b'\t'),
            "comma" => Ok(b','),
            "semicolon" => Ok(b';'),
            "pipe" => Ok(b'|'),
            "space" => Ok(b' '),
            other if other.len() == 1 && other.is_ascii() => Ok(other.as_bytes()[0]),
            other => Err(KotoError::MalformedInput {
                line: 1,
                message: format!("unsupported separator '{}'", other),
            }),
        }
    }

    pub fn columns(&self) -> Result<Option<Vec<String>>, KotoError> {
        let Some(value) = self.get("columns") else {
            return Ok(None);
        };
        let separator = char::from(self.separator()?);
        Ok(Some(value.split(separator).map(|c| c.trim().to_string()).collect()))
    }

    /// 1-based index of the tags column.
    pub fn tags_column(&self) -> Option<usize> {
        self.get("tags column").and_then(|v| v.parse().ok()).filter(|idx| *idx > 0)
    }

    /// Deck name to use when the request leaves it blank.
    pub fn deck(&self) -> Option<&str> {
        self.get("deck").filter(|name| !name.is_empty())
    }
}

/// Anki's text import format: directive lines, then delimited rows (tab by default).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveParser;

impl DirectiveParser {
    pub fn is_directive_marker(line: &str) -> bool {
        let lowered = line.trim().to_lowercase();
        MARKERS.iter().any(|marker| lowered.starts_with(marker))
    }

    /// Splits the directive block from the body; returns the body and how many lines were consumed.
    fn split_directives(text: &str) -> (Directives, &str, u64) {
        let mut directives = Directives::default();
        let mut consumed_bytes = 0;
        let mut consumed_lines = 0;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                break;
            }

            if let Some((key, value)) = trimmed.strip_prefix('#').and_then(|d| d.split_once(':')) {
                directives.insert(key, value);
            }
            consumed_bytes += line.len();
            consumed_lines += 1;
        }

        (directives, &text[consumed_bytes..], consumed_lines)
    }
}

impl CsvParser for DirectiveParser {
    fn format(&self) -> CsvFormat {
        CsvFormat::AnkiDirective
    }

    fn parse(&self, text: &str, header_mode: HeaderMode) -> Result<ParsedCsv, KotoError> {
        let (directives, body, offset) = Self::split_directives(text);
        let separator = directives.separator()?;
        let columns = directives.columns()?;

        tracing::debug!("Anki directives: {:?}", directives);

        let records = read_records(body, separator, offset)?;
        assemble(self.format(), records, header_mode, columns, directives)
    }
}
