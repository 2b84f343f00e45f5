// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Record identifier as handed out by the id source or embedded in rows.
///
/// Sources disagree on whether ids are numbers or strings, so equality and hashing
/// go through [`canonical_key`]: `RecordId::Int(7) == RecordId::Text("7".into())`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

/// Canonical (string) form of a [`RecordId`]; every index in the ledger is keyed by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdKey(Arc<str>);

impl IdKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn canonical_key(id: &RecordId) -> IdKey {
    match id {
        RecordId::Int(value) => IdKey(Arc::from(value.to_string())),
        RecordId::Text(value) => IdKey(Arc::from(value.as_str())),
    }
}

impl RecordId {
    pub fn key(&self) -> IdKey {
        canonical_key(self)
    }

    /// Parses free-form input (CLI args, route params): integers become `Int`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) => RecordId::Int(value),
            Err(_) => RecordId::Text(trimmed.to_string()),
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RecordId::Int(a), RecordId::Int(b)) => a == b,
            (RecordId::Text(a), RecordId::Text(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(value) => write!(f, "{value}"),
            RecordId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn numeric_and_string_forms_compare_equal() {
        assert_eq!(RecordId::Int(42), RecordId::from("42"));
        assert_ne!(RecordId::Int(42), RecordId::from("042"));
        let mut set = HashSet::new();
        set.insert(RecordId::Int(9));
        assert!(set.contains(&RecordId::from("9")));
    }

    #[test]
    fn deserializes_untagged() {
        let ids: Vec<RecordId> = serde_json::from_str(r#"[1, "abc", 3]"#).unwrap();
        assert_eq!(ids, vec![RecordId::Int(1), RecordId::from("abc"), RecordId::Int(3)]);
        assert!(matches!(ids[1], RecordId::Text(_)));
    }

    #[test]
    fn parse_prefers_integers() {
        assert!(matches!(RecordId::parse(" 17 "), RecordId::Int(17)));
        assert!(matches!(RecordId::parse("JOB-17"), RecordId::Text(_)));
        assert_eq!(RecordId::parse("17").key().as_str(), "17");
    }
}
