use std::collections::BTreeSet;

use crate::core::{
    models::{
        Card,
        CardKind,
        EnrichmentOptions,
        NoteFields,
        VocabularyEntry,
    },
    utils::{
        escape_html,
        normalize_tag,
        sound_tag,
    },
};

/// Turns entries into cards. Output depends only on the entry and options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardAssembler;

fn join_present(parts: &[&str]) -> String {
    parts.iter().filter(|p| !p.is_empty()).copied().collect::<Vec<_>>().join("<br>")
}

impl CardAssembler {
    pub fn note_fields(&self, entry: &VocabularyEntry, options: &EnrichmentOptions) -> NoteFields {
        let example = entry.first_example();

        NoteFields {
            japanese: escape_html(entry.japanese.trim()),
            reading: escape_html(entry.reading().trim()),
            english: escape_html(entry.english.trim()),
            example: example.map(|ex| escape_html(&ex.render())).unwrap_or_default(),
            audio: entry.audio_ref.as_deref().map(sound_tag).unwrap_or_default(),
            example_audio: example
                .filter(|_| options.include_example_audio)
                .and_then(|ex| ex.audio_ref.as_deref())
                .map(sound_tag)
                .unwrap_or_default(),
        }
    }

    pub fn tags(&self, entry: &VocabularyEntry) -> BTreeSet<String> {
        entry.tags.iter().filter_map(|tag| normalize_tag(tag)).collect()
    }

    /// A production card needs an English prompt, so entries without one get recognition only.
    pub fn assemble(&self, entry: &VocabularyEntry, options: &EnrichmentOptions) -> Vec<Card> {
        let note = self.note_fields(entry, options);
        let tags = self.tags(entry);

        let kinds: &[CardKind] = if options.use_core2000 {
            &[CardKind::Recognition, CardKind::Production]
        } else {
            &[CardKind::Basic]
        };

        kinds
            .iter()
            .filter(|kind| **kind != CardKind::Production || !note.english.is_empty())
            .map(|kind| {
                let (front, back) = Self::render(*kind, &note);
                Card { kind: *kind, front, back, tags: tags.clone(), note: note.clone() }
            })
            .collect()
    }

    pub fn assemble_all(&self, entries: &[VocabularyEntry], options: &EnrichmentOptions) -> Vec<Card> {
        entries.iter().flat_map(|entry| self.assemble(entry, options)).collect()
    }

    fn render(kind: CardKind, note: &NoteFields) -> (String, String) {
        match kind {
            CardKind::Basic | CardKind::Recognition => (
                join_present(&[&note.japanese, &note.audio]),
                join_present(&[&note.reading, &note.english, &note.example, &note.example_audio]),
            ),
            CardKind::Production => (
                note.english.clone(),
                join_present(&[
                    &note.japanese,
                    &note.reading,
                    &note.audio,
                    &note.example,
                    &note.example_audio,
                ]),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ExampleSentence;

    fn cat() -> VocabularyEntry {
        VocabularyEntry::new("猫")
            .with_english("cat")
            .with_reading("ねこ")
            .with_example(ExampleSentence::from_field("猫が好き (I like cats)"))
            .with_tag("animal")
    }

    #[test]
    fn test_single_card() {
        let cards = CardAssembler.assemble(&cat(), &EnrichmentOptions::default());
        assert_eq!(cards.len(), 1);

        let card = &cards[0];
        assert_eq!(card.kind, CardKind::Basic);
        assert_eq!(card.front, "猫");
        assert_eq!(card.back, "ねこ<br>cat<br>猫が好き (I like cats)");
        assert_eq!(card.tags, BTreeSet::from(["animal".to_string()]));
    }

    #[test]
    fn test_core2000_pair() {
        let options = EnrichmentOptions { use_core2000: true, ..Default::default() };
        let cards = CardAssembler.assemble(&cat(), &options);
        assert_eq!(cards.len(), 2);

        let (recognition, production) = (&cards[0], &cards[1]);
        assert_eq!(recognition.kind, CardKind::Recognition);
        assert_eq!(production.kind, CardKind::Production);
        assert_eq!(recognition.front, "猫");
        assert_eq!(production.front, "cat");
        assert_ne!(recognition.front, production.front);
        assert_eq!(recognition.tags, production.tags);
        assert!(production.back.starts_with("猫<br>ねこ"));
    }

    #[test]
    fn test_core2000_without_english_skips_production() {
        let options = EnrichmentOptions { use_core2000: true, ..Default::default() };
        let entry = VocabularyEntry::new("猫").with_reading("ねこ").with_english("   ");
        let cards = CardAssembler.assemble(&entry, &options);

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].kind, CardKind::Recognition);
        assert!(cards.iter().all(|card| !card.front.is_empty()));
    }

    #[test]
    fn test_tags_with_spaces_are_normalized() {
        let mut entry = cat();
        entry.tags.insert("noun animal".to_string());
        let cards = CardAssembler.assemble(&entry, &EnrichmentOptions::default());
        assert!(cards[0].tags.contains("noun_animal"));
        assert!(!cards[0].tags.contains("noun animal"));
    }

    #[test]
    fn test_html_is_escaped() {
        let entry = VocabularyEntry::new("<b>猫</b>").with_english("cat & kitten");
        let cards = CardAssembler.assemble(&entry, &EnrichmentOptions::default());
        assert_eq!(cards[0].front, "&lt;b&gt;猫&lt;/b&gt;");
        assert_eq!(cards[0].note.english, "cat &amp; kitten");
    }

    #[test]
    fn test_audio_markers() {
        let mut entry = cat();
        entry.audio_ref = Some("kotodeck_word.mp3".to_string());
        entry.examples[0].audio_ref = Some("kotodeck_example.mp3".to_string());

        let cards = CardAssembler.assemble(&entry, &EnrichmentOptions::default());
        assert_eq!(cards[0].front, "猫<br>[sound:kotodeck_word.mp3]");
        assert!(!cards[0].back.contains("kotodeck_example.mp3"));

        let options = EnrichmentOptions { include_example_audio: true, ..Default::default() };
        let cards = CardAssembler.assemble(&entry, &options);
        assert!(cards[0].back.ends_with("[sound:kotodeck_example.mp3]"));
        assert_eq!(cards[0].note.example_audio, "[sound:kotodeck_example.mp3]");
    }

    #[test]
    fn test_deterministic() {
        let options = EnrichmentOptions { use_core2000: true, ..Default::default() };
        assert_eq!(CardAssembler.assemble(&cat(), &options), CardAssembler.assemble(&cat(), &options));
    }
}
