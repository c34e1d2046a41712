use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    fs,
    io::{
        Cursor,
        Write,
    },
};

use serde::{
    Deserialize,
    Serialize,
};
use zip::{
    write::SimpleFileOptions,
    DateTime,
    ZipWriter,
};

use super::{
    apkg::{
        ApkgNote,
        CollectionWriter,
        COLLECTION_FILE,
        MEDIA_MAP_FILE,
    },
    templates::NoteType,
};
use crate::core::{
    models::{
        Card,
        CardKind,
        MediaBundle,
    },
    utils::{
        sanitize_deck_name,
        sound_references,
    },
    KotoError,
};

pub const DEFAULT_DECK_NAME: &str = "kotodeck Deck";

/// What to do with a `[sound:...]` reference whose file was never produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMediaPolicy {
    #[default]
    Omit,
    Fail,
}

/// An Anki `.apkg`: zip of `collection.anki2`, a `media` map and numbered media entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub filename: String,
    pub deck_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub note_count: usize,
    pub card_count: usize,
    pub media: Vec<String>,
    pub omitted_media: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PackageExporter {
    missing_media: MissingMediaPolicy,
}

impl PackageExporter {
    pub fn new(missing_media: MissingMediaPolicy) -> Self {
        Self { missing_media }
    }

    pub fn export(
        &self,
        cards: &[Card],
        deck_name: &str,
        media: &MediaBundle,
    ) -> Result<Package, KotoError> {
        if cards.is_empty() {
            return Err(KotoError::NoCards);
        }

        let deck_name = match sanitize_deck_name(deck_name) {
            name if name.is_empty() => DEFAULT_DECK_NAME.to_string(),
            name => name,
        };
        let note_type = Self::note_type_for(cards)?;
        let mut notes = Self::group_notes(cards)?;
        let (referenced, omitted) = self.resolve_media(&mut notes, media)?;

        let dir = tempfile::tempdir()?;
        let collection_path = dir.path().join(COLLECTION_FILE);
        CollectionWriter::new(&deck_name, &note_type).write(&collection_path, &notes)?;
        let collection = fs::read(&collection_path)?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        zip.start_file(COLLECTION_FILE, options)?;
        zip.write_all(&collection)?;

        let mut media_map = BTreeMap::new();
        for (index, filename) in referenced.iter().enumerate() {
            let data = media.get(filename).ok_or_else(|| KotoError::DanglingMedia {
                filename: filename.clone(),
            })?;
            zip.start_file(index.to_string(), options)?;
            zip.write_all(data)?;
            media_map.insert(index.to_string(), filename.as_str());
        }

        zip.start_file(MEDIA_MAP_FILE, options)?;
        zip.write_all(serde_json::to_string(&media_map)?.as_bytes())?;

        let bytes = zip.finish()?.into_inner();
        let card_count = notes.iter().map(|n| n.ords.len()).sum();

        tracing::info!(
            "Exported deck '{}': {} notes, {} cards, {} media files ({} bytes)",
            deck_name,
            notes.len(),
            card_count,
            referenced.len(),
            bytes.len()
        );

        Ok(Package {
            filename: package_filename(&deck_name),
            deck_name,
            bytes,
            note_count: notes.len(),
            card_count,
            media: referenced,
            omitted_media: omitted,
        })
    }

    fn note_type_for(cards: &[Card]) -> Result<NoteType, KotoError> {
        let dual = cards.iter().any(|c| c.kind != CardKind::Basic);
        if dual && cards.iter().any(|c| c.kind == CardKind::Basic) {
            return Err(KotoError::Export("cannot mix single and dual card modes in one deck".into()));
        }
        Ok(NoteType::for_mode(dual))
    }

    /// A first-template card opens a note; a production card must follow its recognition card.
    fn group_notes(cards: &[Card]) -> Result<Vec<ApkgNote>, KotoError> {
        let mut notes: Vec<ApkgNote> = Vec::new();

        for card in cards {
            let ord = card.kind.ordinal();
            if ord == 0 {
                notes.push(ApkgNote {
                    fields: card.note.clone(),
                    tags: card.tags.clone(),
                    ords: vec![0],
                });
                continue;
            }

            match notes.last_mut() {
                Some(note) if note.fields == card.note && !note.ords.contains(&ord) => {
                    note.ords.push(ord)
                }
                _ => {
                    return Err(KotoError::Export(format!(
                        "production card for '{}' has no matching recognition card",
                        card.note.japanese
                    )))
                }
            }
        }

        Ok(notes)
    }

    /// Returns referenced media (sorted, unique) and the references that were dropped.
    fn resolve_media(
        &self,
        notes: &mut [ApkgNote],
        media: &MediaBundle,
    ) -> Result<(Vec<String>, Vec<String>), KotoError> {
        let mut referenced = BTreeSet::new();
        let mut omitted = Vec::new();

        for note in notes.iter_mut() {
            for field in [&mut note.fields.audio, &mut note.fields.example_audio] {
                let mut kept = Vec::new();
                for filename in sound_references(field) {
                    if media.contains(filename) {
                        referenced.insert(filename.to_string());
                        kept.push(format!("[sound:{}]", filename));
                        continue;
                    }

                    match self.missing_media {
                        MissingMediaPolicy::Fail => {
                            return Err(KotoError::DanglingMedia { filename: filename.to_string() })
                        }
                        MissingMediaPolicy::Omit => {
                            tracing::warn!(
                                "Dropping reference to missing media '{}' for '{}'",
                                filename,
                                note.fields.japanese
                            );
                            omitted.push(filename.to_string());
                        }
                    }
                }
                *field = kept.concat();
            }
        }

        Ok((referenced.into_iter().collect(), omitted))
    }
}

pub fn package_filename(deck_name: &str) -> String {
    let slug: String = deck_name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "deck.apkg".to_string()
    } else {
        format!("{}.apkg", slug)
    }
}
