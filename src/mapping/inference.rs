use std::collections::{
    BTreeMap,
    HashSet,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    CanonicalField,
    FieldMapping,
};
use crate::{
    core::utils::{
        contains_japanese,
        is_kana_only,
    },
    parser::{
        Directives,
        HeaderSet,
        RawRow,
    },
};

/// How an inferred column was chosen, shown next to the suggestion in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Directive,
    Header,
    Content,
    Position,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub mapping: FieldMapping,
    pub provenance: BTreeMap<CanonicalField, Provenance>,
}

impl MappingSuggestion {
    fn claim(
        &mut self,
        claimed: &mut HashSet<usize>,
        field: CanonicalField,
        idx: usize,
        column: &str,
        provenance: Provenance,
    ) {
        claimed.insert(idx);
        self.mapping.set(field, column);
        self.provenance.insert(field, provenance);
    }

    fn has(&self, field: CanonicalField) -> bool {
        self.mapping.get(field).is_some()
    }
}

#[derive(Debug, Default)]
struct ColumnProfile {
    non_empty: usize,
    japanese: usize,
    kana_only: usize,
}

impl ColumnProfile {
    fn of(idx: usize, rows: &[RawRow]) -> Self {
        let mut profile = ColumnProfile::default();
        for value in rows.iter().filter_map(|row| row.get(idx)).map(str::trim) {
            if value.is_empty() {
                continue;
            }
            profile.non_empty += 1;
            if contains_japanese(value) {
                profile.japanese += 1;
            }
            if is_kana_only(value) {
                profile.kana_only += 1;
            }
        }
        profile
    }

    fn share(&self, count: usize) -> f64 {
        if self.non_empty == 0 {
            0.0
        } else {
            count as f64 / self.non_empty as f64
        }
    }
}

/// Proposes a column mapping from header names, then sample content, then position.
#[derive(Debug, Clone)]
pub struct FieldMapInferencer {
    content_threshold: f64,
}

impl Default for FieldMapInferencer {
    fn default() -> Self {
        Self { content_threshold: 0.7 }
    }
}

impl FieldMapInferencer {
    pub fn new(content_threshold: f64) -> Self {
        Self { content_threshold: content_threshold.clamp(0.0, 1.0) }
    }

    pub fn infer(&self, headers: &HeaderSet, sample: &[RawRow]) -> MappingSuggestion {
        self.infer_with_directives(headers, sample, &Directives::default())
    }

    /// Like [`infer`](Self::infer), but columns named by Anki directives are claimed first.
    pub fn infer_with_directives(
        &self,
        headers: &HeaderSet,
        sample: &[RawRow],
        directives: &Directives,
    ) -> MappingSuggestion {
        let mut suggestion = MappingSuggestion::default();
        let mut claimed = HashSet::new();

        self.match_directives(headers, directives, &mut suggestion, &mut claimed);
        self.match_headers(headers, &mut suggestion, &mut claimed, |name, synonym| name == synonym);
        self.match_headers(headers, &mut suggestion, &mut claimed, |name, synonym| {
            name.contains(synonym)
        });
        self.match_content(headers, sample, &mut suggestion, &mut claimed);
        self.match_position(headers, &mut suggestion, &mut claimed);

        tracing::debug!(
            "Inferred mapping {:?} from {} headers and {} sample rows",
            suggestion.mapping,
            headers.len(),
            sample.len()
        );
        suggestion
    }

    fn match_directives(
        &self,
        headers: &HeaderSet,
        directives: &Directives,
        suggestion: &mut MappingSuggestion,
        claimed: &mut HashSet<usize>,
    ) {
        let Some(column) = directives.tags_column() else {
            return;
        };

        match headers.get(column - 1) {
            Some(name) => {
                suggestion.claim(claimed, CanonicalField::Tags, column - 1, name, Provenance::Directive)
            }
            None => tracing::warn!(
                "Ignoring tags column {} outside the {} available columns",
                column,
                headers.len()
            ),
        }
    }

    fn match_headers(
        &self,
        headers: &HeaderSet,
        suggestion: &mut MappingSuggestion,
        claimed: &mut HashSet<usize>,
        matches: impl Fn(&str, &str) -> bool,
    ) {
        for field in CanonicalField::ALL {
            if suggestion.has(field) {
                continue;
            }

            let found = headers.iter().enumerate().find(|(idx, name)| {
                let lowered = name.trim().to_lowercase();
                !claimed.contains(idx) && field.synonyms().iter().any(|s| matches(&lowered, s))
            });

            if let Some((idx, name)) = found {
                suggestion.claim(claimed, field, idx, name, Provenance::Header);
            }
        }
    }

    fn match_content(
        &self,
        headers: &HeaderSet,
        sample: &[RawRow],
        suggestion: &mut MappingSuggestion,
        claimed: &mut HashSet<usize>,
    ) {
        if sample.is_empty() {
            return;
        }

        for (idx, name) in headers.iter().enumerate() {
            if claimed.contains(&idx) {
                continue;
            }

            let profile = ColumnProfile::of(idx, sample);
            if profile.non_empty == 0 {
                continue;
            }

            let field = if !suggestion.has(CanonicalField::Japanese)
                && profile.share(profile.japanese) >= self.content_threshold
                && profile.kana_only < profile.japanese
            {
                Some(CanonicalField::Japanese)
            } else if !suggestion.has(CanonicalField::Reading)
                && profile.share(profile.kana_only) >= self.content_threshold
            {
                Some(CanonicalField::Reading)
            } else if !suggestion.has(CanonicalField::English)
                && profile.share(profile.non_empty - profile.japanese) >= self.content_threshold
            {
                Some(CanonicalField::English)
            } else {
                None
            };

            if let Some(field) = field {
                suggestion.claim(claimed, field, idx, name, Provenance::Content);
            }
        }
    }

    fn match_position(
        &self,
        headers: &HeaderSet,
        suggestion: &mut MappingSuggestion,
        claimed: &mut HashSet<usize>,
    ) {
        if !(2..=5).contains(&headers.len()) {
            return;
        }

        for (idx, field) in CanonicalField::ALL.into_iter().enumerate().take(headers.len()) {
            if suggestion.has(field) || claimed.contains(&idx) {
                continue;
            }
            if let Some(name) = headers.get(idx) {
                suggestion.claim(claimed, field, idx, name, Provenance::Position);
            }
        }
    }
}
