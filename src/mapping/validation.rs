use std::collections::{
    BTreeMap,
    HashMap,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    CanonicalField,
    FieldMapping,
};
use crate::parser::HeaderSet;

pub const GENERAL_KEY: &str = "_general";
pub const DUPLICATE_COLUMN: &str = "this column is used in multiple fields";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn error_for(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "no errors".to_string();
        }
        self.errors
            .iter()
            .map(|(key, message)| format!("{}: {}", key, message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Pure completeness and uniqueness check of a mapping against a header set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingValidator;

impl MappingValidator {
    pub fn validate(&self, mapping: &FieldMapping, headers: &HeaderSet) -> ValidationResult {
        let mut errors = BTreeMap::new();

        if headers.is_empty() {
            errors.insert(GENERAL_KEY.to_string(), "The CSV file has no columns".to_string());
        }

        let mapped: Vec<(CanonicalField, &str)> =
            mapping.iter().filter(|(_, column)| !column.trim().is_empty()).collect();

        if !mapped.iter().any(|(field, _)| *field == CanonicalField::Japanese) {
            errors.insert(
                CanonicalField::Japanese.to_string(),
                "Required field 'japanese' is not mapped".to_string(),
            );
        }

        let mut usage: HashMap<&str, usize> = HashMap::new();
        for (_, column) in &mapped {
            *usage.entry(*column).or_default() += 1;
        }

        for (field, column) in &mapped {
            if usage.get(column).copied().unwrap_or(0) > 1 {
                errors.insert(field.to_string(), DUPLICATE_COLUMN.to_string());
            } else if !headers.is_empty() && !headers.contains(column) {
                errors.insert(
                    field.to_string(),
                    format!("CSV column '{}' not found in headers", column),
                );
            }
        }

        ValidationResult { valid: errors.is_empty(), errors }
    }
}
