pub mod inference;
pub mod validation;

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
};

pub use inference::{
    FieldMapInferencer,
    MappingSuggestion,
    Provenance,
};
use serde::{
    Deserialize,
    Serialize,
};
pub use validation::{
    MappingValidator,
    ValidationResult,
};

use crate::{
    core::{
        models::{
            ExampleSentence,
            VocabularyEntry,
        },
        KotoError,
    },
    parser::{
        HeaderSet,
        RawRow,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalField {
    Japanese,
    English,
    Reading,
    Example,
    Tags,
}

impl CanonicalField {
    /// Resolution order used by inference.
    pub const ALL: [CanonicalField; 5] = [
        CanonicalField::Japanese,
        CanonicalField::English,
        CanonicalField::Reading,
        CanonicalField::Example,
        CanonicalField::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Japanese => "japanese",
            CanonicalField::English => "english",
            CanonicalField::Reading => "reading",
            CanonicalField::Example => "example",
            CanonicalField::Tags => "tags",
        }
    }

    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Japanese => &[
                "japanese",
                "word",
                "front",
                "kanji",
                "vocabulary",
                "expression",
                "term",
                "日本語",
                "単語",
            ],
            CanonicalField::English => {
                &["english", "meaning", "translation", "back", "definition", "英語", "意味"]
            }
            CanonicalField::Reading => &[
                "reading",
                "pronunciation",
                "kana",
                "hiragana",
                "yomigana",
                "furigana",
                "読み方",
                "読み",
                "ふりがな",
            ],
            CanonicalField::Example => &["example", "sentence", "usage", "context", "例文"],
            CanonicalField::Tags => &["tag", "tags", "category", "categories", "group", "タグ"],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = KotoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == lowered)
            .ok_or_else(|| KotoError::Custom(format!("Unknown field '{}'", s)))
    }
}

/// Canonical field to CSV column name. Serializes as `{"japanese": "Term", ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    columns: BTreeMap<CanonicalField, String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: CanonicalField, column: impl Into<String>) -> Self {
        self.set(field, column);
        self
    }

    pub fn set(&mut self, field: CanonicalField, column: impl Into<String>) {
        self.columns.insert(field, column.into());
    }

    pub fn unset(&mut self, field: CanonicalField) -> Option<String> {
        self.columns.remove(&field)
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn is_column_used(&self, column: &str) -> bool {
        self.columns.values().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.columns.iter().map(|(field, column)| (*field, column.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolves each mapped column to its index; unknown columns are left out.
    pub fn resolve(&self, headers: &HeaderSet) -> ResolvedMapping {
        let mut indices = BTreeMap::new();
        for (field, column) in self.iter() {
            if let Some(idx) = headers.position(column) {
                indices.insert(field, idx);
            }
        }
        ResolvedMapping { indices }
    }
}

/// A mapping bound to column indices of one header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    indices: BTreeMap<CanonicalField, usize>,
}

impl ResolvedMapping {
    fn value<'a>(&self, row: &'a RawRow, field: CanonicalField) -> &'a str {
        self.indices.get(&field).and_then(|idx| row.get(*idx)).map(str::trim).unwrap_or("")
    }

    /// Builds an entry from a row, or `None` when the headword cell is empty.
    pub fn entry(&self, row: &RawRow) -> Option<VocabularyEntry> {
        let japanese = self.value(row, CanonicalField::Japanese);
        if japanese.is_empty() {
            return None;
        }

        let mut entry = VocabularyEntry::new(japanese)
            .with_english(self.value(row, CanonicalField::English))
            .with_reading(self.value(row, CanonicalField::Reading));

        let example = self.value(row, CanonicalField::Example);
        if !example.is_empty() {
            entry.examples.push(ExampleSentence::from_field(example));
        }

        entry.insert_tags_field(self.value(row, CanonicalField::Tags));
        Some(entry)
    }
}

/// Entries built from rows, in row order, plus the count of rows without a headword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRows {
    pub entries: Vec<VocabularyEntry>,
    pub skipped_rows: usize,
}

pub fn map_rows(mapping: &FieldMapping, headers: &HeaderSet, rows: &[RawRow]) -> MappedRows {
    let resolved = mapping.resolve(headers);
    let mut mapped = MappedRows::default();

    for row in rows {
        match resolved.entry(row) {
            Some(entry) => mapped.entries.push(entry),
            None => {
                tracing::debug!("Skipping line {}: empty japanese value", row.line());
                mapped.skipped_rows += 1;
            }
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> HeaderSet {
        HeaderSet::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_mapping_serializes_as_plain_object() {
        let mapping = FieldMapping::new()
            .with(CanonicalField::Japanese, "Term")
            .with(CanonicalField::English, "Definition");
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"japanese":"Term","english":"Definition"}"#);

        let back: FieldMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("Reading".parse::<CanonicalField>().unwrap(), CanonicalField::Reading);
        assert!("furigana".parse::<CanonicalField>().is_err());
    }

    #[test]
    fn test_map_rows_skips_missing_headword() {
        let headers = headers(&["Japanese", "English", "Example", "Tags"]);
        let rows = vec![
            RawRow::new(2, vec!["猫".into(), " cat ".into(), "猫が好き (I like cats)".into(), "noun animal".into()]),
            RawRow::new(3, vec!["  ".into(), "nothing".into(), "".into(), "".into()]),
            RawRow::new(4, vec!["犬".into(), "dog".into(), "".into(), "".into()]),
        ];
        let mapping = FieldMapping::new()
            .with(CanonicalField::Japanese, "Japanese")
            .with(CanonicalField::English, "English")
            .with(CanonicalField::Example, "Example")
            .with(CanonicalField::Tags, "Tags");

        let mapped = map_rows(&mapping, &headers, &rows);
        assert_eq!(mapped.skipped_rows, 1);
        assert_eq!(mapped.entries.len(), 2);

        let cat = &mapped.entries[0];
        assert_eq!(cat.english, "cat");
        assert_eq!(cat.reading, None);
        assert_eq!(cat.examples[0].japanese, "猫が好き (I like cats)");
        assert!(cat.tags.contains("noun_animal"));

        assert_eq!(mapped.entries[1].japanese, "犬");
        assert!(mapped.entries[1].examples.is_empty());
    }
}
