//! oxide-stepwise CLI
//!
//! Command-line tool for managing SQL script migrations.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use oxide_stepwise::prelude::*;
use oxide_stepwise::scaffold;

/// Versioned, reversible SQL script migrations.
#[derive(Parser)]
#[command(name = "oxide-stepwise")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Configuration file (defaults to ./stepwise.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Migrations directory.
    #[arg(short, long)]
    migrations_dir: Option<PathBuf>,

    /// Read scripts from a packed bundle instead of the directory.
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Fail when an applied script has changed since it ran.
    #[arg(long)]
    strict_checksums: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations directory.
    Init,

    /// Create a new migration script.
    New {
        /// Descriptive script name.
        name: String,

        /// Use the next sequence number instead of a timestamp.
        #[arg(long)]
        seq: bool,
    },

    /// List known migration scripts.
    List,

    /// Show applied migration history.
    Status,

    /// Pack all scripts into a single JSON bundle.
    Pack {
        /// Output file.
        #[arg(short, long, default_value = "migrations.bundle.json")]
        output: PathBuf,
    },

    /// Compare applied scripts against their current contents.
    Verify,

    /// Apply or revert migrations.
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Migrate up to a version (the newest if not specified).
    Up {
        /// Target version.
        #[arg(long)]
        version: Option<i64>,
    },

    /// Revert down to a version.
    Down {
        /// Target version.
        #[arg(long)]
        version: i64,
    },

    /// Revert every applied migration.
    Drop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::discover(cli.config.as_deref())?;
    let migrations_dir = config.migrations_dir(cli.migrations_dir.as_deref());
    let bundle = config.bundle(cli.bundle.as_deref());
    let strict = cli.strict_checksums || config.migrations.strict_checksums;

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations directory...");
            scaffold::init_dir(&migrations_dir)?;
        }

        Commands::New { name, seq } => {
            let numbering = if seq {
                Numbering::Sequence
            } else {
                Numbering::Timestamp
            };
            let path = scaffold::new_script(&migrations_dir, &name, numbering)?;
            println!("{}", path.display());
        }

        Commands::List => {
            let set = load_set(&migrations_dir, bundle.as_deref())?;
            if set.is_empty() {
                info!("No migration scripts found.");
            } else {
                println!("\n{:<16} Script", "Version");
                println!("{:-<60}", "");
                for statement in &set {
                    println!("{:<16} {}", statement.version, statement.filename);
                }
                println!();
            }
        }

        Commands::Status => {
            let set = load_set(&migrations_dir, bundle.as_deref())?;
            let pool = connect(&config.database_url(cli.database.as_deref())).await?;
            let status = Migrator::new(pool, set).status().await?;

            if status.history.is_empty() {
                info!("No migrations have been applied yet.");
            } else {
                println!("\n{:<16} {:<6} {:<40} Applied", "Version", "Type", "Script");
                println!("{:-<90}", "");
                for record in &status.history {
                    println!(
                        "{:<16} {:<6} {:<40} {}",
                        record.version,
                        record.direction,
                        record.filename,
                        record.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                println!();
            }

            println!("Current position: {}", status.position);
            if !status.pending.is_empty() {
                let pending: Vec<String> = status.pending.iter().map(i64::to_string).collect();
                println!("Pending: {}", pending.join(", "));
            }
        }

        Commands::Pack { output } => {
            let packed = ScriptBundle::from_dir(&migrations_dir)?;
            // Reject scripts that would fail to load later.
            MigrationSetBuilder::bundle(packed.clone()).build()?;

            for script in packed.entries() {
                println!("{}", script.path);
            }
            packed.write_json(&output)?;
            info!(
                scripts = packed.len(),
                output = %output.display(),
                "Bundle written"
            );
        }

        Commands::Verify => {
            let set = load_set(&migrations_dir, bundle.as_deref())?;
            let pool = connect(&config.database_url(cli.database.as_deref())).await?;
            let drifts = Migrator::new(pool, set).verify().await?;

            if drifts.is_empty() {
                info!("All applied scripts match their recorded checksums.");
            } else {
                for drift in &drifts {
                    warn!(
                        version = drift.version,
                        filename = %drift.filename,
                        "Script changed since it was applied"
                    );
                }
                if let Some(drift) = drifts.into_iter().next() {
                    return Err(MigrateError::from(drift).into());
                }
            }
        }

        Commands::Migrate { action } => {
            let set = load_set(&migrations_dir, bundle.as_deref())?;
            let pool = connect(&config.database_url(cli.database.as_deref())).await?;
            let migrator = Migrator::new(pool, set).strict_checksums(strict);

            let report = match action {
                MigrateAction::Up { version: None } => migrator.ensure_head().await?,
                MigrateAction::Up {
                    version: Some(version),
                } => migrator.ensure_schema(version).await?,
                MigrateAction::Down { version } => migrator.down(version).await?,
                MigrateAction::Drop => migrator.drop_all().await?,
            };
            print_report(&report);
        }
    }

    Ok(())
}

fn load_set(dir: &Path, bundle: Option<&Path>) -> Result<MigrationSet> {
    let builder = match bundle {
        Some(path) => {
            info!(bundle = %path.display(), "Loading scripts from bundle");
            MigrationSetBuilder::bundle(ScriptBundle::read_json(path)?)
        }
        None => MigrationSetBuilder::directory(dir),
    };
    builder.build()
}

async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(MigrateError::StoreUnavailable)?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(MigrateError::StoreUnavailable)
}

fn print_report(report: &MigrationReport) {
    match &report.outcome {
        Outcome::Migrated {
            direction,
            versions,
        } => info!(
            direction = %direction,
            steps = versions.len(),
            from = %report.from,
            "Migration complete"
        ),
        Outcome::AlreadyAt(version) => info!(version, "Schema is up to date"),
        Outcome::SchemaAhead {
            recorded,
            latest_known,
        } => warn!(
            recorded,
            latest_known, "Database schema is newer than the local migration scripts"
        ),
        Outcome::NothingToDo => info!("Nothing to do"),
    }
}
