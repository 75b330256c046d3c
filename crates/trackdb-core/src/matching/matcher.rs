//! Column matching between a source schema and the target schema.
//!
//! Target tables are paired with source tables by exact, case-insensitive,
//! then normalized name. Within a pair, each target column is resolved in
//! declaration order against the columns not yet claimed, trying the rules
//! in priority order; the first rule with a candidate claims it. There is no
//! backtracking, so an early target column can take a source column that a
//! later one would have matched more precisely.
//!
//! The matcher never looks at column types. Type compatibility is the
//! planner's concern.

use super::alias::AliasRegistry;
use super::normalize::normalize;
use crate::migration::MigrationError;
use crate::schema::{Schema, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a target name was resolved to a source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    /// Identical names.
    Exact,
    /// Names equal ignoring ASCII case.
    CaseInsensitive,
    /// Names equal after normalization.
    Normalized,
    /// Source name is a registered alias of the target name.
    Alias,
    /// Normalized names contain one another (opt-in).
    Containment,
    /// No source counterpart.
    Unmatched,
}

impl MatchMethod {
    /// Column rules in priority order.
    const COLUMN_RULES: [MatchMethod; 5] = [
        MatchMethod::Exact,
        MatchMethod::CaseInsensitive,
        MatchMethod::Normalized,
        MatchMethod::Alias,
        MatchMethod::Containment,
    ];
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::Exact => write!(f, "exact"),
            MatchMethod::CaseInsensitive => write!(f, "case-insensitive"),
            MatchMethod::Normalized => write!(f, "normalized"),
            MatchMethod::Alias => write!(f, "alias"),
            MatchMethod::Containment => write!(f, "containment"),
            MatchMethod::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// What to do when a rule finds more than one unclaimed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Claim the first candidate in source column order.
    #[default]
    Greedy,
    /// Fail with [`MigrationError::UnresolvedAmbiguous`].
    Strict,
}

/// Resolution of one target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMatch {
    /// Target column name.
    pub target: String,
    /// Claimed source column, if any.
    pub source: Option<String>,
    /// Rule that produced the match.
    pub method: MatchMethod,
}

impl ColumnMatch {
    fn unmatched(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: None,
            method: MatchMethod::Unmatched,
        }
    }
}

/// Column correspondence for one (source, target) table pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Target table name.
    pub target_table: String,
    /// Paired source table, if one was found.
    pub source_table: Option<String>,
    /// How the table pair was resolved.
    pub table_method: MatchMethod,
    /// One entry per target column, in target order.
    pub columns: Vec<ColumnMatch>,
    /// Source columns no target column claimed, in source order.
    pub dropped: Vec<String>,
}

impl ColumnMapping {
    /// Mapping for a target table with no source counterpart.
    pub fn fresh(target: &Table) -> Self {
        Self {
            target_table: target.name.clone(),
            source_table: None,
            table_method: MatchMethod::Unmatched,
            columns: target
                .columns
                .iter()
                .map(|c| ColumnMatch::unmatched(c.name.clone()))
                .collect(),
            dropped: Vec::new(),
        }
    }

    /// Source column claimed by a target column.
    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.get(target).and_then(|m| m.source.as_deref())
    }

    /// Resolution entry for a target column.
    pub fn get(&self, target: &str) -> Option<&ColumnMatch> {
        self.columns.iter().find(|m| m.target == target)
    }

    /// Entries that claimed a source column.
    pub fn matched(&self) -> impl Iterator<Item = &ColumnMatch> {
        self.columns.iter().filter(|m| m.source.is_some())
    }

    /// Entries with no source column.
    pub fn unmatched(&self) -> impl Iterator<Item = &ColumnMatch> {
        self.columns.iter().filter(|m| m.source.is_none())
    }

    /// Number of matched target columns.
    pub fn matched_count(&self) -> usize {
        self.matched().count()
    }

    /// Check that no two target columns claim the same source column.
    pub fn is_injective(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.matched()
            .filter_map(|m| m.source.as_deref())
            .all(|source| seen.insert(source))
    }
}

/// Column mappings for every target table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaMapping {
    /// One mapping per target table, in target order.
    pub tables: Vec<ColumnMapping>,
    /// Source tables no target table was paired with.
    pub unmanaged: Vec<String>,
}

impl SchemaMapping {
    /// Mapping for a target table.
    pub fn table(&self, target_table: &str) -> Option<&ColumnMapping> {
        self.tables.iter().find(|m| m.target_table == target_table)
    }
}

/// Matches source columns to target columns.
#[derive(Debug, Clone)]
pub struct ColumnMatcher<'a> {
    aliases: &'a AliasRegistry,
    containment: bool,
    strategy: MatchStrategy,
}

impl<'a> ColumnMatcher<'a> {
    /// Table rules in priority order. Aliases apply to columns only.
    const TABLE_RULES: [MatchMethod; 3] = [
        MatchMethod::Exact,
        MatchMethod::CaseInsensitive,
        MatchMethod::Normalized,
    ];

    /// Create a greedy matcher using the given aliases, without the
    /// containment rule.
    pub fn new(aliases: &'a AliasRegistry) -> Self {
        Self {
            aliases,
            containment: false,
            strategy: MatchStrategy::Greedy,
        }
    }

    /// Enable or disable the containment fallback rule.
    pub fn with_containment(mut self, enabled: bool) -> Self {
        self.containment = enabled;
        self
    }

    /// Set the ambiguity strategy.
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Pair every target table with a source table and resolve its columns.
    pub fn match_schemas(
        &self,
        source: &Schema,
        target: &Schema,
    ) -> Result<SchemaMapping, MigrationError> {
        let mut claimed = vec![false; source.tables.len()];
        let mut tables = Vec::with_capacity(target.tables.len());

        for target_table in &target.tables {
            let mapping = match self.resolve_table(source, &target_table.name, &mut claimed) {
                Some((source_table, method)) => {
                    let mut mapping = self.match_table(Some(source_table), target_table)?;
                    mapping.table_method = method;
                    mapping
                }
                None => ColumnMapping::fresh(target_table),
            };

            debug!(
                table = %mapping.target_table,
                source_table = ?mapping.source_table,
                matched = mapping.matched_count(),
                dropped = mapping.dropped.len(),
                "resolved table mapping"
            );
            tables.push(mapping);
        }

        let unmanaged = source
            .tables
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(t, _)| t.name.clone())
            .collect();

        Ok(SchemaMapping { tables, unmanaged })
    }

    /// Resolve the columns of one table pair. `source` is `None` when the
    /// target table has no counterpart.
    pub fn match_table(
        &self,
        source: Option<&Table>,
        target: &Table,
    ) -> Result<ColumnMapping, MigrationError> {
        let Some(source) = source else {
            return Ok(ColumnMapping::fresh(target));
        };

        // Remaining candidates: (name, normalized name), None once claimed.
        let mut pool: Vec<Option<(&str, String)>> = source
            .columns
            .iter()
            .map(|c| Some((c.name.as_str(), normalize(&c.name))))
            .collect();

        let mut columns = Vec::with_capacity(target.columns.len());

        for target_column in &target.columns {
            let target_name = target_column.name.as_str();
            let target_key = normalize(target_name);
            let mut resolved = ColumnMatch::unmatched(target_name);

            for method in MatchMethod::COLUMN_RULES {
                if method == MatchMethod::Containment && !self.containment {
                    continue;
                }

                let candidates: Vec<usize> = pool
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, slot)| slot.as_ref().map(|s| (idx, s)))
                    .filter(|(_, (name, key))| {
                        self.rule_matches(method, name, key, target_name, &target_key)
                    })
                    .map(|(idx, _)| idx)
                    .collect();

                let Some(&first) = candidates.first() else {
                    continue;
                };

                if candidates.len() > 1 && self.strategy == MatchStrategy::Strict {
                    return Err(MigrationError::UnresolvedAmbiguous {
                        table: target.name.clone(),
                        column: target_name.to_string(),
                        candidates: candidates
                            .iter()
                            .filter_map(|&idx| pool[idx].as_ref().map(|(n, _)| n.to_string()))
                            .collect(),
                    });
                }

                if let Some((name, _)) = pool[first].take() {
                    resolved.source = Some(name.to_string());
                    resolved.method = method;
                }
                break;
            }

            columns.push(resolved);
        }

        let dropped = pool
            .into_iter()
            .flatten()
            .map(|(name, _)| name.to_string())
            .collect();

        let mapping = ColumnMapping {
            target_table: target.name.clone(),
            source_table: Some(source.name.clone()),
            table_method: MatchMethod::Exact,
            columns,
            dropped,
        };
        debug_assert!(mapping.is_injective());
        Ok(mapping)
    }

    fn rule_matches(
        &self,
        method: MatchMethod,
        source_name: &str,
        source_key: &str,
        target_name: &str,
        target_key: &str,
    ) -> bool {
        match method {
            MatchMethod::Exact => source_name == target_name,
            MatchMethod::CaseInsensitive => source_name.eq_ignore_ascii_case(target_name),
            MatchMethod::Normalized => !target_key.is_empty() && source_key == target_key,
            MatchMethod::Alias => self.aliases.resolve(source_name) == Some(target_name),
            MatchMethod::Containment => {
                !target_key.is_empty()
                    && !source_key.is_empty()
                    && (source_key.contains(target_key) || target_key.contains(source_key))
            }
            MatchMethod::Unmatched => false,
        }
    }

    fn resolve_table<'s>(
        &self,
        source: &'s Schema,
        target_name: &str,
        claimed: &mut [bool],
    ) -> Option<(&'s Table, MatchMethod)> {
        let target_key = normalize(target_name);

        for method in Self::TABLE_RULES {
            let found = source.tables.iter().enumerate().find(|(idx, table)| {
                !claimed[*idx]
                    && self.rule_matches(
                        method,
                        &table.name,
                        &normalize(&table.name),
                        target_name,
                        &target_key,
                    )
            });

            if let Some((idx, table)) = found {
                claimed[idx] = true;
                return Some((table, method));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn text(name: &str) -> Column {
        Column::new(name, ColumnType::Text)
    }

    fn table(name: &str, columns: &[&str]) -> Table {
        columns
            .iter()
            .fold(Table::new(name), |t, c| t.with_column(text(c)))
    }

    #[test]
    fn test_rule_priority() {
        let aliases = AliasRegistry::default();
        let matcher = ColumnMatcher::new(&aliases);

        let source = table("builds", &["NAME", "Manifest-ID", "md5sum", "link", "notes"]);
        let target = table("builds", &["link", "name", "manifest_id", "md5", "year"]);

        let mapping = matcher.match_table(Some(&source), &target).unwrap();

        let method = |t: &str| mapping.get(t).map(|m| m.method);
        assert_eq!(method("link"), Some(MatchMethod::Exact));
        assert_eq!(method("name"), Some(MatchMethod::CaseInsensitive));
        assert_eq!(method("manifest_id"), Some(MatchMethod::Normalized));
        assert_eq!(method("md5"), Some(MatchMethod::Alias));
        assert_eq!(method("year"), Some(MatchMethod::Unmatched));

        assert_eq!(mapping.source_for("name"), Some("NAME"));
        assert_eq!(mapping.source_for("md5"), Some("md5sum"));
        assert_eq!(mapping.dropped, vec!["notes".to_string()]);
        assert!(mapping.is_injective());
    }

    #[test]
    fn test_alias_spellings_resolve_identically() {
        let aliases = AliasRegistry::default();
        let matcher = ColumnMatcher::new(&aliases);
        let target = table("builds", &["manifest_id"]);

        for spelling in ["ManifestID", "manifestId", "manifest_id"] {
            let source = table("builds", &[spelling]);
            let mapping = matcher.match_table(Some(&source), &target).unwrap();
            assert_eq!(mapping.source_for("manifest_id"), Some(spelling));
            assert!(mapping.dropped.is_empty());
        }
    }

    #[test]
    fn test_greedy_first_claim_wins() {
        // `manifest_id` is resolved first and takes `ManifestId` by
        // normalization, so the later exact target falls back to the
        // case-insensitive rule.
        let aliases = AliasRegistry::empty();
        let matcher = ColumnMatcher::new(&aliases);

        let source = table("t", &["ManifestId", "ManifestID"]);
        let target = table("t", &["manifest_id", "ManifestId"]);

        let mapping = matcher.match_table(Some(&source), &target).unwrap();
        assert_eq!(mapping.source_for("manifest_id"), Some("ManifestId"));
        assert_eq!(mapping.source_for("ManifestId"), Some("ManifestID"));
        assert_eq!(
            mapping.get("ManifestId").map(|m| m.method),
            Some(MatchMethod::CaseInsensitive)
        );
        assert!(mapping.is_injective());
    }

    #[test]
    fn test_strict_strategy_reports_ambiguity() {
        let aliases = AliasRegistry::empty();
        let matcher = ColumnMatcher::new(&aliases).with_strategy(MatchStrategy::Strict);

        let source = table("t", &["crack-type", "crack_type_"]);
        let target = table("t", &["CrackType"]);

        let err = matcher.match_table(Some(&source), &target).unwrap_err();
        match err {
            MigrationError::UnresolvedAmbiguous { column, candidates, .. } => {
                assert_eq!(column, "CrackType");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_containment_is_opt_in() {
        let aliases = AliasRegistry::empty();
        let source = table("tools", &["tool_version_string"]);
        let target = table("tools", &["version"]);

        let plain = ColumnMatcher::new(&aliases)
            .match_table(Some(&source), &target)
            .unwrap();
        assert_eq!(plain.source_for("version"), None);
        assert_eq!(plain.dropped, vec!["tool_version_string".to_string()]);

        let fuzzy = ColumnMatcher::new(&aliases)
            .with_containment(true)
            .match_table(Some(&source), &target)
            .unwrap();
        assert_eq!(fuzzy.source_for("version"), Some("tool_version_string"));
        assert_eq!(
            fuzzy.get("version").map(|m| m.method),
            Some(MatchMethod::Containment)
        );
    }

    #[test]
    fn test_match_schemas_pairs_tables() {
        let aliases = AliasRegistry::default();
        let matcher = ColumnMatcher::new(&aliases);

        let source = Schema::new()
            .with_table(table("Tools", &["name"]))
            .with_table(table("legacy_notes", &["body"]))
            .with_table(table("cheats", &["name"]));
        let target = Schema::new()
            .with_table(table("tools", &["name"]))
            .with_table(table("cheats", &["name"]))
            .with_table(table("preserved", &["name"]));

        let mapping = matcher.match_schemas(&source, &target).unwrap();

        let tools = mapping.table("tools").unwrap();
        assert_eq!(tools.source_table.as_deref(), Some("Tools"));
        assert_eq!(tools.table_method, MatchMethod::CaseInsensitive);

        let cheats = mapping.table("cheats").unwrap();
        assert_eq!(cheats.table_method, MatchMethod::Exact);

        let preserved = mapping.table("preserved").unwrap();
        assert_eq!(preserved.source_table, None);
        assert_eq!(preserved.matched_count(), 0);

        assert_eq!(mapping.unmanaged, vec!["legacy_notes".to_string()]);
    }

    #[test]
    fn test_empty_source_table_everything_unmatched() {
        let aliases = AliasRegistry::default();
        let matcher = ColumnMatcher::new(&aliases);
        let target = table("tools", &["name", "link"]);

        let mapping = matcher.match_table(None, &target).unwrap();
        assert_eq!(mapping.unmatched().count(), 2);
        assert!(mapping.dropped.is_empty());
    }
}
