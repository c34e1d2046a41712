//! Anki collection database (`collection.anki2`, schema 11) written into a package.

use std::{
    collections::BTreeSet,
    path::Path,
};

use rusqlite::{
    params,
    Connection,
};
use serde_json::{
    json,
    Value,
};
use sha2::{
    Digest,
    Sha256,
};

use super::templates::NoteType;
use crate::core::{
    models::NoteFields,
    utils::stable_id,
    KotoError,
};

pub const COLLECTION_FILE: &str = "collection.anki2";
pub const MEDIA_MAP_FILE: &str = "media";

/// Every timestamp in the collection is pinned so identical input yields identical bytes.
const CREATED_SECS: i64 = 1_704_067_200;
const CREATED_MILLIS: i64 = CREATED_SECS * 1000;
const SCHEMA_VERSION: i64 = 11;
const DEFAULT_DECK_ID: i64 = 1;
const DEFAULT_CONF_ID: i64 = 1;
const FIELD_SEPARATOR: &str = "\x1f";

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";
const LATEX_POST: &str = "\\end{document}";

const SCHEMA: &str = r#"
    CREATE TABLE col (
        id integer primary key,
        crt integer not null,
        mod integer not null,
        scm integer not null,
        ver integer not null,
        dty integer not null,
        usn integer not null,
        ls integer not null,
        conf text not null,
        models text not null,
        decks text not null,
        dconf text not null,
        tags text not null
    );
    CREATE TABLE notes (
        id integer primary key,
        guid text not null,
        mid integer not null,
        mod integer not null,
        usn integer not null,
        tags text not null,
        flds text not null,
        sfld integer not null,
        csum integer not null,
        flags integer not null,
        data text not null
    );
    CREATE TABLE cards (
        id integer primary key,
        nid integer not null,
        did integer not null,
        ord integer not null,
        mod integer not null,
        usn integer not null,
        type integer not null,
        queue integer not null,
        due integer not null,
        ivl integer not null,
        factor integer not null,
        reps integer not null,
        lapses integer not null,
        left integer not null,
        odue integer not null,
        odid integer not null,
        flags integer not null,
        data text not null
    );
    CREATE TABLE revlog (
        id integer primary key,
        cid integer not null,
        usn integer not null,
        ease integer not null,
        ivl integer not null,
        lastIvl integer not null,
        factor integer not null,
        time integer not null,
        type integer not null
    );
    CREATE TABLE graves (
        usn integer not null,
        oid integer not null,
        type integer not null
    );
    CREATE INDEX ix_notes_usn on notes (usn);
    CREATE INDEX ix_cards_usn on cards (usn);
    CREATE INDEX ix_revlog_usn on revlog (usn);
    CREATE INDEX ix_cards_nid on cards (nid);
    CREATE INDEX ix_cards_sched on cards (did, queue, due);
    CREATE INDEX ix_revlog_cid on revlog (cid);
    CREATE INDEX ix_notes_csum on notes (csum);
"#;

/// One note and the template ordinals it has cards for.
#[derive(Debug, Clone)]
pub(crate) struct ApkgNote {
    pub fields: NoteFields,
    pub tags: BTreeSet<String>,
    pub ords: Vec<usize>,
}

pub(crate) struct CollectionWriter<'a> {
    deck_name: &'a str,
    note_type: &'a NoteType,
}

impl<'a> CollectionWriter<'a> {
    pub fn new(deck_name: &'a str, note_type: &'a NoteType) -> Self {
        Self { deck_name, note_type }
    }

    pub fn deck_id(&self) -> i64 {
        stable_id(&format!("deck\0{}", self.deck_name))
    }

    pub fn model_id(&self) -> i64 {
        stable_id(&format!("notetype\0{}", self.note_type.name))
    }

    /// Creates the collection at `path`, which must not exist yet.
    pub fn write(&self, path: &Path, notes: &[ApkgNote]) -> Result<(), KotoError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
             VALUES (1, ?1, ?2, ?2, ?3, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')",
            params![
                CREATED_SECS,
                CREATED_MILLIS,
                SCHEMA_VERSION,
                self.conf(notes.len()).to_string(),
                self.models().to_string(),
                self.decks().to_string(),
                Self::dconf().to_string(),
            ],
        )?;

        let mut card_id = CREATED_MILLIS;
        for (position, note) in notes.iter().enumerate() {
            let note_id = CREATED_MILLIS + position as i64;
            let tags = if note.tags.is_empty() {
                String::new()
            } else {
                format!(" {} ", note.tags.iter().map(String::as_str).collect::<Vec<_>>().join(" "))
            };

            tx.execute(
                "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                 VALUES (?1, ?2, ?3, ?4, -1, ?5, ?6, ?7, ?8, 0, '')",
                params![
                    note_id,
                    self.guid(&note.fields),
                    self.model_id(),
                    CREATED_SECS,
                    tags,
                    note.fields.as_array().join(FIELD_SEPARATOR),
                    note.fields.japanese,
                    field_checksum(&note.fields.japanese),
                ],
            )?;

            for ord in &note.ords {
                tx.execute(
                    "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl,
                                        factor, reps, lapses, left, odue, odid, flags, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, -1, 0, 0, ?6, 0, 0, 0, 0, 0, 0, 0, 0, '')",
                    params![
                        card_id,
                        note_id,
                        self.deck_id(),
                        *ord as i64,
                        CREATED_SECS,
                        position as i64 + 1,
                    ],
                )?;
                card_id += 1;
            }
        }
        tx.commit()?;

        conn.close().map_err(|(_, e)| KotoError::Sqlite(e))?;
        Ok(())
    }

    /// Same word in the same note type keeps its guid, so re-imports update instead of duplicate.
    fn guid(&self, fields: &NoteFields) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.note_type.name.as_bytes());
        for field in [&fields.japanese, &fields.reading, &fields.english] {
            hasher.update([0u8]);
            hasher.update(field.as_bytes());
        }
        hex::encode(&hasher.finalize()[..10])
    }

    fn conf(&self, note_count: usize) -> Value {
        json!({
            "activeDecks": [DEFAULT_DECK_ID],
            "curDeck": DEFAULT_DECK_ID,
            "newSpread": 0,
            "collapseTime": 1200,
            "timeLim": 0,
            "estTimes": true,
            "dueCounts": true,
            "curModel": self.model_id().to_string(),
            "nextPos": note_count + 1,
            "sortType": "noteFld",
            "sortBackwards": false,
            "addToCur": true,
        })
    }

    fn models(&self) -> Value {
        let note_type = self.note_type;
        let flds: Vec<Value> = note_type
            .fields
            .iter()
            .enumerate()
            .map(|(ord, name)| {
                json!({
                    "name": name,
                    "ord": ord,
                    "sticky": false,
                    "rtl": false,
                    "font": "Arial",
                    "size": 20,
                    "media": [],
                })
            })
            .collect();

        let tmpls: Vec<Value> = note_type
            .templates
            .iter()
            .enumerate()
            .map(|(ord, template)| {
                json!({
                    "name": template.name,
                    "ord": ord,
                    "qfmt": template.front,
                    "afmt": template.back,
                    "bqfmt": "",
                    "bafmt": "",
                    "did": null,
                    "bfont": "",
                    "bsize": 0,
                })
            })
            .collect();

        let req: Vec<Value> = note_type
            .templates
            .iter()
            .enumerate()
            .map(|(ord, template)| json!([ord, "any", [template.required_field]]))
            .collect();

        let id = self.model_id();
        json!({
            id.to_string(): {
                "id": id,
                "name": note_type.name,
                "type": 0,
                "mod": CREATED_SECS,
                "usn": -1,
                "sortf": 0,
                "did": self.deck_id(),
                "tmpls": tmpls,
                "flds": flds,
                "css": note_type.css,
                "latexPre": LATEX_PRE,
                "latexPost": LATEX_POST,
                "latexsvg": false,
                "req": req,
                "tags": [],
                "vers": [],
            }
        })
    }

    fn decks(&self) -> Value {
        let deck = |id: i64, name: &str| {
            json!({
                "id": id,
                "name": name,
                "mod": CREATED_SECS,
                "usn": -1,
                "desc": "",
                "dyn": 0,
                "conf": DEFAULT_CONF_ID,
                "collapsed": false,
                "browserCollapsed": false,
                "extendNew": 0,
                "extendRev": 0,
                "newToday": [0, 0],
                "revToday": [0, 0],
                "lrnToday": [0, 0],
                "timeToday": [0, 0],
            })
        };

        let id = self.deck_id();
        json!({
            DEFAULT_DECK_ID.to_string(): deck(DEFAULT_DECK_ID, "Default"),
            id.to_string(): deck(id, self.deck_name),
        })
    }

    fn dconf() -> Value {
        json!({
            DEFAULT_CONF_ID.to_string(): {
                "id": DEFAULT_CONF_ID,
                "name": "Default",
                "mod": 0,
                "usn": 0,
                "maxTaken": 60,
                "autoplay": true,
                "timer": 0,
                "replayq": true,
                "dyn": false,
                "new": {
                    "delays": [1, 10],
                    "ints": [1, 4, 7],
                    "initialFactor": 2500,
                    "order": 1,
                    "perDay": 20,
                    "bury": true,
                    "separate": true,
                },
                "lapse": {
                    "delays": [10],
                    "mult": 0,
                    "minInt": 1,
                    "leechFails": 8,
                    "leechAction": 0,
                },
                "rev": {
                    "perDay": 200,
                    "ease4": 1.3,
                    "fuzz": 0.05,
                    "ivlFct": 1,
                    "maxIvl": 36500,
                    "bury": true,
                    "minSpace": 1,
                },
            }
        })
    }
}

/// First-field checksum used by Anki's duplicate index. Anki recomputes it on import.
fn field_checksum(field: &str) -> i64 {
    let digest = Sha256::digest(field.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}
