mod action_cmds;
mod config;
mod parse_cmd;
mod submit_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use storymap_db::pool;

use config::StorymapConfig;

#[derive(Parser)]
#[command(name = "storymap", about = "Validate, preview and apply LLM-proposed story map changes")]
struct Cli {
    /// Database URL (overrides STORYMAP_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a storymap config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/storymap")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Validate actions against a state snapshot (offline)
    Validate {
        /// JSON file with one action, an array, or an `actions` envelope
        actions: PathBuf,
        /// PlanningState snapshot as JSON
        #[arg(long)]
        state: PathBuf,
        /// Stop at the first invalid action
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Print the deltas a batch would produce (offline)
    Preview {
        actions: PathBuf,
        #[arg(long)]
        state: PathBuf,
    },
    /// Apply a batch all-or-nothing and emit the new state (offline)
    Apply {
        actions: PathBuf,
        #[arg(long)]
        state: PathBuf,
        /// Write the new state here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Parse model output into action events, one JSON object per line
    Parse {
        /// File to read (stdin when omitted)
        file: Option<PathBuf>,
        /// Project ID for actions that lack a valid one
        #[arg(long)]
        project: Option<String>,
        /// Only interpret the whole response at the end (no NDJSON)
        #[arg(long)]
        whole: bool,
    },
    /// Validate, apply and persist actions for a project
    Submit {
        /// JSON file with the action(s) to submit
        file: PathBuf,
        /// Project ID
        #[arg(long)]
        project: String,
        /// Replay key; a repeated key returns the first outcome
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Show the audit log of a project
    History {
        #[arg(long)]
        project: String,
    },
}

/// Execute the `storymap init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `storymap db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `storymap db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = StorymapConfig::resolve(cli_db_url);

    println!("Initializing storymap database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("storymap db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Validate {
            actions,
            state,
            stop_on_error,
        } => {
            action_cmds::run_validate(&actions, &state, stop_on_error)?;
        }
        Commands::Preview { actions, state } => {
            action_cmds::run_preview(&actions, &state)?;
        }
        Commands::Apply {
            actions,
            state,
            output,
        } => {
            action_cmds::run_apply(&actions, &state, output.as_deref())?;
        }
        Commands::Parse {
            file,
            project,
            whole,
        } => {
            parse_cmd::run_parse(file.as_deref(), project.as_deref(), whole).await?;
        }
        Commands::Submit {
            file,
            project,
            idempotency_key,
        } => {
            let resolved = StorymapConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result =
                submit_cmd::run_submit(&db_pool, &file, &project, idempotency_key.as_deref())
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::History { project } => {
            let resolved = StorymapConfig::resolve(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = submit_cmd::run_history(&db_pool, &project).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
