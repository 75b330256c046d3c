//! Subcommand handling.

use crate::formatter::Formatter;
use rusqlite::Connection;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;
use trackdb_core::config::ALIAS_FILE_NAME;
use trackdb_core::{
    initialize, inspect_path, tracker_schema, EngineConfig, ImportFailure, Importer,
    MatchStrategy, MigrationReport, PreparedImport, Schema,
};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error before any report exists.
    #[error(transparent)]
    Core(#[from] trackdb_core::Error),

    /// Import failure, carrying its report.
    #[error(transparent)]
    Import(#[from] ImportFailure),

    /// A database could not be opened for writing.
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        /// Database file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A named file does not exist.
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The user declined a flagged import.
    #[error("not confirmed; nothing was changed")]
    Declined,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Report generated before the failure, if any.
    pub fn report(&self) -> Option<&MigrationReport> {
        match self {
            CliError::Import(failure) => Some(failure.report.as_ref()),
            _ => None,
        }
    }
}

/// Shared state for one invocation.
pub struct Context<'a> {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Output formatter.
    pub formatter: &'a dyn Formatter,
}

/// Build the engine configuration from flags and the alias file.
///
/// An explicitly named alias file must exist; the default one is optional.
pub fn engine_config(
    aliases: Option<&Path>,
    containment: bool,
    strict: bool,
) -> Result<EngineConfig, CliError> {
    let strategy = if strict {
        MatchStrategy::Strict
    } else {
        MatchStrategy::Greedy
    };
    let mut config = EngineConfig::new()
        .with_containment_fallback(containment)
        .with_strategy(strategy);

    let alias_file = match aliases {
        Some(path) if !path.exists() => return Err(CliError::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => default_alias_file().filter(|path| path.exists()),
    };
    if let Some(path) = alias_file {
        info!(path = %path.display(), "loading aliases");
        config = config.with_alias_file(&path)?;
    }

    config.validate()?;
    Ok(config)
}

fn default_alias_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trackdb").join(ALIAS_FILE_NAME))
}

/// `trackdb init`
pub fn init(ctx: &Context<'_>, db: &Path) -> Result<(), CliError> {
    let mut conn = open(db)?;
    initialize(&mut conn)?;
    println!(
        "{}",
        ctx.formatter
            .format_message(&format!("Initialized {}", db.display()))
    );
    Ok(())
}

/// `trackdb inspect`
pub fn inspect(ctx: &Context<'_>, db: &Path) -> Result<(), CliError> {
    let schema = inspect_path(existing(db)?)?;
    println!("{}", ctx.formatter.format_schema(&schema));
    Ok(())
}

/// `trackdb plan`
pub async fn plan(ctx: &Context<'_>, db: &Path, reference: Option<&Path>) -> Result<(), CliError> {
    let prepared = prepare(ctx, existing(db)?, target_schema(reference)?).await?;
    println!("{}", ctx.formatter.format_report(&prepared.report));
    Ok(())
}

/// `trackdb migrate`
pub async fn migrate(
    ctx: &Context<'_>,
    db: &Path,
    reference: Option<&Path>,
    assume_yes: bool,
) -> Result<(), CliError> {
    let prepared = prepare(ctx, existing(db)?, target_schema(reference)?).await?;
    confirm(ctx, &prepared.report, assume_yes)?;

    let mut conn = open(db)?;
    let report = Importer::new(ctx.config.clone()).execute(&mut conn, prepared)?;
    println!("{}", ctx.formatter.format_report(&report));
    Ok(())
}

/// `trackdb import`
///
/// SOURCE is copied next to DEST and the copy is migrated to the built-in
/// schema. DEST is replaced only once the migration has committed; on any
/// failure the staged copy is deleted and DEST is left alone.
pub async fn import(
    ctx: &Context<'_>,
    source: &Path,
    dest: &Path,
    assume_yes: bool,
) -> Result<(), CliError> {
    let source = existing(source)?;
    let dir = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let staged = NamedTempFile::new_in(dir)?;
    std::fs::copy(source, staged.path())?;

    let prepared = prepare(ctx, staged.path(), tracker_schema()).await?;
    confirm(ctx, &prepared.report, assume_yes)?;

    let report = {
        let mut conn = open(staged.path())?;
        Importer::new(ctx.config.clone()).execute(&mut conn, prepared)?
    };

    staged.persist(dest).map_err(|e| CliError::Io(e.error))?;
    info!(source = %source.display(), dest = %dest.display(), "imported database");

    println!("{}", ctx.formatter.format_report(&report));
    Ok(())
}

async fn prepare(ctx: &Context<'_>, db: &Path, target: Schema) -> Result<PreparedImport, CliError> {
    Ok(Importer::prepare_in_background(db.to_path_buf(), target, ctx.config.clone()).await?)
}

fn target_schema(reference: Option<&Path>) -> Result<Schema, CliError> {
    match reference {
        Some(path) => Ok(inspect_path(existing(path)?)?),
        None => Ok(tracker_schema()),
    }
}

/// Ask before running a flagged plan, unless told not to.
fn confirm(ctx: &Context<'_>, report: &MigrationReport, assume_yes: bool) -> Result<(), CliError> {
    if !report.requires_confirmation || assume_yes {
        return Ok(());
    }

    eprintln!("{}", ctx.formatter.format_report(report));
    eprint!("This import drops or fabricates data. Proceed? [y/N] ");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(CliError::Declined),
    }
}

fn existing(path: &Path) -> Result<&Path, CliError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(CliError::NotFound(path.to_path_buf()))
    }
}

fn open(path: &Path) -> Result<Connection, CliError> {
    Connection::open(path).map_err(|source| CliError::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_flags() {
        let config = engine_config(None, true, true).unwrap();
        assert!(config.containment_fallback);
        assert_eq!(config.strategy, MatchStrategy::Strict);
    }

    #[test]
    fn test_explicit_alias_file_must_exist() {
        let err = engine_config(Some(Path::new("/nonexistent/aliases.json")), false, false)
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[test]
    fn test_explicit_alias_file_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "aliases": {{ "ver": "version" }} }}"#).unwrap();

        let config = engine_config(Some(file.path()), false, false).unwrap();
        assert_eq!(config.aliases.resolve("Ver"), Some("version"));
    }

    #[test]
    fn test_existing() {
        assert!(existing(Path::new("/nonexistent/tracker.db")).is_err());
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(existing(file.path()).is_ok());
    }
}
