//! Alias registry: historical column names mapped to canonical target names.

use super::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aliases the tracker's earlier releases and hand-edited databases are
/// known to use.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("manifestid", "manifest_id"),
    ("manifest", "manifest_id"),
    ("md5sum", "md5"),
    ("md5hash", "md5"),
    ("crack", "crack_type"),
];

/// Mapping from normalized historical names to canonical target column names.
///
/// Keys are normalized on insertion, so `ManifestID`, `manifest_id` and
/// `manifestid` all land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct AliasRegistry {
    entries: BTreeMap<String, String>,
}

impl AliasRegistry {
    /// Create a registry with no aliases.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add an alias, replacing any previous entry for the same normalized name.
    pub fn with_alias(mut self, historical: &str, canonical: impl Into<String>) -> Self {
        self.insert(historical, canonical);
        self
    }

    /// Add an alias in place.
    pub fn insert(&mut self, historical: &str, canonical: impl Into<String>) {
        self.entries.insert(normalize(historical), canonical.into());
    }

    /// Merge all entries from `other`; entries in `other` win.
    pub fn extend(&mut self, other: AliasRegistry) {
        self.entries.extend(other.entries);
    }

    /// Canonical target name for a source column name, if one is registered.
    pub fn resolve(&self, source_name: &str) -> Option<&str> {
        self.entries.get(&normalize(source_name)).map(String::as_str)
    }

    /// Iterate `(normalized_source_name, canonical_target_name)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry has no aliases.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AliasRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (historical, canonical) in DEFAULT_ALIASES {
            registry.insert(historical, *canonical);
        }
        registry
    }
}

impl From<BTreeMap<String, String>> for AliasRegistry {
    fn from(raw: BTreeMap<String, String>) -> Self {
        let mut registry = Self::empty();
        for (historical, canonical) in raw {
            registry.insert(&historical, canonical);
        }
        registry
    }
}

impl From<AliasRegistry> for BTreeMap<String, String> {
    fn from(registry: AliasRegistry) -> Self {
        registry.entries
    }
}
