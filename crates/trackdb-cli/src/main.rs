//! trackdb Command-Line Client
//!
//! Creates tracker databases, inspects their schema, and imports foreign or
//! older databases into the current schema.

mod commands;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// trackdb Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "trackdb")]
#[command(version, about = "Create, inspect and import tracker databases")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// JSON alias file (defaults to <config dir>/trackdb/aliases.json if present)
    #[arg(long, global = true)]
    pub aliases: Option<PathBuf>,

    /// Also match columns whose normalized names contain one another
    #[arg(long, global = true)]
    pub containment: bool,

    /// Fail on ambiguous column matches instead of taking the first candidate
    #[arg(long, global = true)]
    pub strict: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a database with the built-in schema
    Init {
        /// Database file
        db: PathBuf,
    },

    /// Print the schema of a database
    Inspect {
        /// Database file
        db: PathBuf,
    },

    /// Print the migration report without changing anything
    Plan {
        /// Database file
        db: PathBuf,

        /// Take the target schema from this database instead of the built-in one
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Migrate a database in place
    Migrate {
        /// Database file
        db: PathBuf,

        /// Take the target schema from this database instead of the built-in one
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Proceed without asking when data would be dropped or fabricated
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Replace DEST with a migrated copy of SOURCE
    Import {
        /// Database to import
        source: PathBuf,

        /// Working database to replace
        dest: PathBuf,

        /// Proceed without asking when data would be dropped or fabricated
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so JSON output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackdb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    if let Err(e) = run(args, &*formatter).await {
        eprintln!("{}", formatter.format_error(&e.to_string(), e.report()));
        std::process::exit(1);
    }
}

async fn run(args: Args, formatter: &dyn formatter::Formatter) -> Result<(), commands::CliError> {
    let config = commands::engine_config(args.aliases.as_deref(), args.containment, args.strict)?;
    let ctx = commands::Context { config, formatter };

    match args.command {
        Command::Init { db } => commands::init(&ctx, &db),
        Command::Inspect { db } => commands::inspect(&ctx, &db),
        Command::Plan { db, reference } => commands::plan(&ctx, &db, reference.as_deref()).await,
        Command::Migrate { db, reference, yes } => {
            commands::migrate(&ctx, &db, reference.as_deref(), yes).await
        }
        Command::Import { source, dest, yes } => commands::import(&ctx, &source, &dest, yes).await,
    }
}
