use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::models::VocabularyEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionWord {
    pub entry: VocabularyEntry,
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
    #[serde(default)]
    pub selected_senses: Vec<usize>,
    pub added_at: DateTime<Utc>,
}

impl CollectionWord {
    pub fn new(entry: VocabularyEntry) -> Self {
        Self { entry, parts_of_speech: Vec::new(), selected_senses: Vec::new(), added_at: Utc::now() }
    }

    pub fn word(&self) -> &str {
        &self.entry.japanese
    }
}

/// Words gathered one lookup at a time, keyed by headword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    words: Vec<CollectionWord>,
}

impl Collection {
    pub const DEFAULT_NAME: &'static str = "kotodeck Collection";

    /// A blank name falls back to [`Collection::DEFAULT_NAME`].
    pub fn new(name: &str) -> Self {
        let name = match name.trim() {
            "" => Self::DEFAULT_NAME,
            trimmed => trimmed,
        };
        Self { name: name.to_string(), words: Vec::new() }
    }

    /// Adds a word, replacing any earlier entry with the same headword in place.
    /// Returns true when the word was new.
    pub fn add(&mut self, word: CollectionWord) -> bool {
        match self.words.iter_mut().find(|w| w.word() == word.word()) {
            Some(existing) => {
                *existing = word;
                false
            }
            None => {
                self.words.push(word);
                true
            }
        }
    }

    pub fn remove(&mut self, word: &str) -> bool {
        if let Some(pos) = self.words.iter().position(|w| w.word() == word) {
            self.words.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w.word() == word)
    }

    pub fn words(&self) -> &[CollectionWord] {
        &self.words
    }

    pub fn entries(&self) -> Vec<VocabularyEntry> {
        self.words.iter().map(|w| w.entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(japanese: &str, english: &str) -> CollectionWord {
        CollectionWord::new(VocabularyEntry::new(japanese).with_english(english))
    }

    #[test]
    fn test_add_is_last_write_wins() {
        let mut collection = Collection::new("animals");
        assert!(collection.add(word("猫", "cat")));
        assert!(collection.add(word("犬", "dog")));
        assert!(!collection.add(word("猫", "kitty")));

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.words()[0].entry.english, "kitty");
        assert_eq!(collection.words()[1].word(), "犬");
    }

    #[test]
    fn test_blank_name_uses_default() {
        assert_eq!(Collection::new("  ").name, Collection::DEFAULT_NAME);
        assert_eq!(Collection::new(" Pets ").name, "Pets");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut collection = Collection::new("animals");
        collection.add(word("猫", "cat"));
        collection.add(word("犬", "dog"));

        assert!(collection.remove("猫"));
        assert!(!collection.remove("猫"));
        assert!(!collection.contains("猫"));
        assert_eq!(collection.entries().len(), 1);

        collection.clear();
        assert!(collection.is_empty());
    }
}
