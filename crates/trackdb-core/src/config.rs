//! Engine configuration.
//!
//! Everything the engine needs to know about its environment arrives in an
//! [`EngineConfig`] passed at call time.

use crate::error::{Error, Result};
use crate::matching::{AliasRegistry, ColumnMatcher, MatchStrategy};
use crate::migration::MigrationConfig;
use serde::Deserialize;
use std::path::Path;

/// Default suffix for temporary rebuild tables.
pub const DEFAULT_TEMP_SUFFIX: &str = "__trackdb_migrate";

/// File name of the alias file inside the application's config directory.
pub const ALIAS_FILE_NAME: &str = "aliases.json";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Alias registry used by the matcher.
    pub aliases: AliasRegistry,

    /// Enable the containment fallback rule.
    pub containment_fallback: bool,

    /// Ambiguity handling.
    pub strategy: MatchStrategy,

    /// Suffix for temporary rebuild tables.
    pub temp_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aliases: AliasRegistry::default(),
            containment_fallback: false,
            strategy: MatchStrategy::Greedy,
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the default aliases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alias registry.
    pub fn with_aliases(mut self, aliases: AliasRegistry) -> Self {
        self.aliases = aliases;
        self
    }

    /// Enable or disable the containment fallback rule.
    pub fn with_containment_fallback(mut self, enabled: bool) -> Self {
        self.containment_fallback = enabled;
        self
    }

    /// Set the ambiguity strategy.
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the temporary table suffix.
    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    /// Load aliases from a JSON alias file, on top of or instead of the
    /// current registry.
    pub fn with_alias_file(mut self, path: &Path) -> Result<Self> {
        let file = AliasFile::load(path)?;
        if file.replace_defaults {
            self.aliases = file.aliases;
        } else {
            self.aliases.extend(file.aliases);
        }
        Ok(self)
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.temp_suffix.is_empty() {
            return Err(Error::Config("temp_suffix must not be empty".to_string()));
        }
        if let Some((key, _)) = self.aliases.iter().find(|(_, target)| target.is_empty()) {
            return Err(Error::Config(format!("alias '{}' has an empty target", key)));
        }
        if let Some((key, _)) = self.aliases.iter().find(|(key, _)| key.is_empty()) {
            return Err(Error::Config(format!(
                "alias '{}' has no alphanumeric characters",
                key
            )));
        }
        Ok(())
    }

    /// Column matcher for this configuration.
    pub fn matcher(&self) -> ColumnMatcher<'_> {
        ColumnMatcher::new(&self.aliases)
            .with_containment(self.containment_fallback)
            .with_strategy(self.strategy)
    }

    /// Executor configuration.
    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            temp_suffix: self.temp_suffix.clone(),
        }
    }
}

/// On-disk alias file:
///
/// ```json
/// { "aliases": { "VerNumber": "version" }, "replace_defaults": false }
/// ```
#[derive(Debug, Deserialize)]
pub struct AliasFile {
    /// Historical name to canonical target name.
    #[serde(default = "AliasRegistry::empty")]
    pub aliases: AliasRegistry,

    /// Use only these aliases instead of extending the defaults.
    #[serde(default)]
    pub replace_defaults: bool,
}

impl AliasFile {
    /// Read and parse an alias file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid alias file {}: {}", path.display(), e)))
    }

    /// Parse alias file contents.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
