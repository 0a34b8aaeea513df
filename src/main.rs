//! cfgsync CLI - apply declarative configuration documents to a row store

use anyhow::Context;
use cfgsync::config::{self, CfgsyncConfig};
use cfgsync::engine::{self, WriteOptions};
use cfgsync::output::is_quiet;
use cfgsync::storage::{CommitStatus, SqliteStore, Transaction};
use cfgsync::ui::{self, Icons};
use cfgsync::Schema;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cfgsync")]
#[command(version)]
#[command(about = "Declarative configuration reconciliation for schema-typed row stores")]
#[command(long_about = r#"
cfgsync applies a full desired-state configuration document to a row store
in one atomic transaction:
  • Rows are matched by index tokens, created, updated or cascade-deleted
  • Containment children follow their owners
  • Associations are linked once every row exists

Example usage:
  cfgsync init --schema schema.json
  cfgsync apply desired.json --dry-run
  cfgsync apply desired.json
  cfgsync dump > current.json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./cfgsync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the schema file (JSON, or TOML by extension)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a desired configuration document
    Apply {
        /// JSON document describing the full desired state
        document: PathBuf,

        /// Report pending changes without committing
        #[arg(long)]
        dry_run: bool,

        /// Fail when the document changes an immutable column
        #[arg(long)]
        strict: bool,
    },

    /// Print the stored configuration as a document
    Dump {
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Show statistics about the store
    Stats,

    /// Validate the schema file
    CheckSchema,

    /// Write a default cfgsync.toml
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

/// Effective settings: CLI flags over config file over defaults
struct Settings {
    database: PathBuf,
    schema: Option<PathBuf>,
    strict: bool,
}

impl Settings {
    fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let file = config::load_config(cli.config.as_deref())?.unwrap_or_default();
        Ok(Self {
            database: cli
                .database
                .clone()
                .or_else(|| file.database.map(PathBuf::from))
                .unwrap_or_else(config::default_database_path),
            schema: cli.schema.clone().or_else(|| file.schema.map(PathBuf::from)),
            strict: file.strict_immutable,
        })
    }

    fn schema(&self) -> anyhow::Result<Schema> {
        let Some(path) = &self.schema else {
            anyhow::bail!("no schema file: pass --schema or set `schema` in cfgsync.toml");
        };
        Schema::load(path).with_context(|| format!("failed to load schema {}", path.display()))
    }

    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        config::ensure_db_dir(&self.database)?;
        let store = SqliteStore::open(&self.database)
            .with_context(|| format!("failed to open database {}", self.database.display()))?;
        Ok(store)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else if is_quiet() {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(&cli)?;

    match cli.command {
        Commands::Apply { document, dry_run, strict } => {
            let schema = settings.schema()?;
            let contents = std::fs::read_to_string(&document)
                .with_context(|| format!("failed to read {}", document.display()))?;
            let value: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not valid JSON", document.display()))?;
            let options = if strict || settings.strict {
                WriteOptions::strict()
            } else {
                WriteOptions::default()
            };

            let mut store = settings.open_store()?;
            ui::header(&format!("Applying {}", document.display()));
            ui::info("Database", &settings.database.display().to_string());
            ui::info("Immutable columns", options.immutable.as_str());

            let report = if dry_run {
                let report = engine::plan(value, &schema, &mut store, &options)?;
                ui::phase("Pending changes (dry run, nothing committed)");
                ui::change_summary(&report.changes);
                report
            } else {
                let outcome = engine::apply(value, &schema, &mut store, &options)?;
                ui::phase("Committed changes");
                ui::change_summary(&outcome.report.changes);
                match outcome.status {
                    CommitStatus::Success => ui::success("Configuration applied"),
                    CommitStatus::Unchanged => ui::success("Store already matches the document"),
                }
                outcome.report
            };

            tracing::debug!("{}{}", report.rows, report.links);
            if cli.verbose && !is_quiet() {
                println!(
                    "{}",
                    ui::stats_table([
                        ("Rows synced", report.rows.synced),
                        ("Rows created", report.rows.created),
                        ("Rows deleted", report.rows.deleted),
                        ("References resolved", report.links.resolved),
                        ("Reference columns changed", report.links.linked),
                    ])
                );
            }
        }

        Commands::Dump { compact } => {
            let schema = settings.schema()?;
            let mut store = settings.open_store()?;
            let txn = Transaction::begin(&mut store)?;
            let value = cfgsync::read::read(&schema, &txn)?;
            let rendered = if compact {
                serde_json::to_string(&value)?
            } else {
                serde_json::to_string_pretty(&value)?
            };
            println!("{}", rendered);
        }

        Commands::Stats => {
            let store = settings.open_store()?;
            let stats = store.stats()?;
            tracing::debug!("{}", stats);

            if is_quiet() {
                return Ok(());
            }
            println!("{} Store: {}", Icons::DATABASE, settings.database.display());
            let mut table = ui::TableBuilder::new();
            table.add_row("Rows", stats.rows);
            table.add_row("Commits", stats.commits);
            for (name, count) in &stats.tables {
                table.add_row(&format!("  {}", name), count);
            }
            println!("{}", table.build());
        }

        Commands::CheckSchema => {
            let schema = settings.schema()?;
            ui::section(&format!("{} Schema", Icons::SCHEMA));
            for table in schema.tables.values() {
                let role = match (&table.parent, table.singleton) {
                    (_, true) => "singleton".to_string(),
                    (None, false) => "root".to_string(),
                    (Some(parent), false) => format!("child of {}", parent),
                };
                let indexes = if table.has_natural_index() {
                    table.index_columns().collect::<Vec<_>>().join(", ")
                } else {
                    ui::dim("uuid")
                };
                ui::summary_row(
                    &table.name,
                    &format!(
                        "{} | index [{}] | {} config | {} references",
                        role,
                        indexes,
                        table.config.len(),
                        table.references.len()
                    ),
                );
            }
            ui::success(&format!("{} tables valid", schema.tables.len()));
        }

        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let cfg = CfgsyncConfig {
                database: Some(settings.database.display().to_string()),
                schema: settings.schema.as_ref().map(|p| p.display().to_string()),
                strict_immutable: settings.strict,
            };
            config::write_config(&path, &cfg, force)?;
            config::ensure_db_dir(&settings.database)?;

            ui::success(&format!("Wrote {}", path.display()));
            if cfg.schema.is_none() {
                ui::warn("No schema configured yet; set `schema` before running apply");
            }
            ui::info(&format!("{} Database", Icons::DATABASE), &settings.database.display().to_string());
        }
    }

    Ok(())
}
