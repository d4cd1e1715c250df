mod calendar;
mod config;
mod field_cmds;
mod kb_cmds;
mod measure_cmd;
mod plan_cmds;
mod schedule_cmds;
mod serve_cmd;
mod services;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use uuid::Uuid;

use agriplan_db::models::{MoistureState, TaskStatus};
use agriplan_db::pool;

use config::AgriplanConfig;

#[derive(Parser)]
#[command(name = "agriplan", about = "Sugarcane field operation planner")]
struct Cli {
    /// Database URL (overrides AGRIPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an agriplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/agriplan")]
        db_url: String,
        /// OpenAI-compatible chat endpoint
        #[arg(long)]
        llm_endpoint: Option<String>,
        /// API key for the chat endpoint
        #[arg(long)]
        llm_api_key: Option<String>,
        /// Chat model name
        #[arg(long)]
        llm_model: Option<String>,
        /// OpenAI-compatible embeddings endpoint, or `offline` for local hashing
        #[arg(long)]
        emb_endpoint: Option<String>,
        /// API key for the embeddings endpoint
        #[arg(long)]
        emb_api_key: Option<String>,
        /// Embedding model name
        #[arg(long)]
        emb_model: Option<String>,
        /// Rule file replacing the built-in stage table
        #[arg(long)]
        rules_path: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the agriplan database (requires config file or env vars)
    DbInit,
    /// Field management
    Field {
        #[command(subcommand)]
        command: FieldCommands,
    },
    /// Plan generation and replanning
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Record field measurements
    Measure {
        #[command(subcommand)]
        command: MeasureCommands,
    },
    /// Schedule tasks
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Knowledge base
    Kb {
        #[command(subcommand)]
        command: KbCommands,
    },
    /// Serve the HTTP JSON API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print shell completions to stdout
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum FieldCommands {
    /// Register a field
    Add {
        /// Owner identifier
        #[arg(long)]
        owner: String,
        /// Cane variety (e.g. KK3)
        #[arg(long)]
        variety: String,
        /// new_plant or ratoon
        #[arg(long, default_value = "new_plant")]
        crop_type: String,
        /// Area in rai
        #[arg(long)]
        area: f64,
        #[arg(long, default_value = "")]
        province: String,
        #[arg(long, default_value = "")]
        district: String,
        /// sand, loam or clay
        #[arg(long)]
        soil: String,
        /// Irrigation source (pond, canal, well, none)
        #[arg(long, default_value = "none")]
        irrigation: String,
        /// Pump capacity in m3/h
        #[arg(long)]
        pump: Option<f64>,
        /// Planting date (YYYY-MM-DD)
        #[arg(long)]
        planted: NaiveDate,
    },
    /// List fields
    List {
        /// Only fields of this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show one field
    Show { field_id: Uuid },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate a plan from the field's attributes
    Generate {
        field_id: Uuid,
        /// Print tasks grouped by date
        #[arg(long)]
        calendar: bool,
    },
    /// Re-evaluate the plan against recent measurements and reported problems
    Replan {
        field_id: Uuid,
        /// Reason recorded in the replan log
        #[arg(long)]
        reason: Option<String>,
        /// Reported problem (repeatable)
        #[arg(long = "problem")]
        problems: Vec<String>,
    },
    /// Show the latest plan (or every version)
    Show {
        field_id: Uuid,
        /// List all versions and replan history
        #[arg(long)]
        history: bool,
    },
}

#[derive(Subcommand)]
pub enum MeasureCommands {
    /// Record a measurement
    Add {
        field_id: Uuid,
        /// Cane height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Soil moisture in percent
        #[arg(long)]
        moisture: Option<f64>,
        /// dry, ok or wet
        #[arg(long)]
        state: Option<MoistureState>,
        /// Rainfall in mm
        #[arg(long)]
        rain: Option<f64>,
        /// Pest severity (0-5)
        #[arg(long)]
        pest: Option<i32>,
        #[arg(long, default_value = "")]
        note: String,
        /// Measurement time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// List a field's tasks
    List {
        field_id: Uuid,
        /// First due date (inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last due date (inclusive)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Group tasks by date
        #[arg(long)]
        calendar: bool,
    },
    /// Update a task's status
    SetStatus {
        task_id: Uuid,
        /// todo, done or skipped
        status: TaskStatus,
        /// Quantity actually applied
        #[arg(long)]
        actual: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum KbCommands {
    /// Ingest a text document
    Ingest {
        /// Path to a UTF-8 text file
        file: PathBuf,
        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        tags: String,
        /// Source URL used for citations
        #[arg(long)]
        url: Option<String>,
    },
    /// Search the knowledge base
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
}

/// Execute the `agriplan init` command: write config file.
fn cmd_init(cfg: config::ConfigFile, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(url) = &cfg.database.url {
        println!("  database.url = {url}");
    }
    match &cfg.llm.endpoint {
        Some(endpoint) => println!("  llm.endpoint = {endpoint}"),
        None => println!("  llm: not configured (offline advisor)"),
    }
    match &cfg.embedding.endpoint {
        Some(endpoint) => println!("  embedding.endpoint = {endpoint}"),
        None => println!("  embedding: not configured (keyword search)"),
    }
    println!();
    println!("Next: run `agriplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `agriplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = AgriplanConfig::resolve(cli_db_url)?;

    println!("Initializing agriplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("agriplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            llm_endpoint,
            llm_api_key,
            llm_model,
            emb_endpoint,
            emb_api_key,
            emb_model,
            rules_path,
            force,
        } => {
            let cfg = config::ConfigFile {
                database: config::DatabaseSection { url: Some(db_url) },
                llm: config::ProviderSection {
                    endpoint: llm_endpoint,
                    api_key: llm_api_key,
                    model: llm_model,
                },
                embedding: config::ProviderSection {
                    endpoint: emb_endpoint,
                    api_key: emb_api_key,
                    model: emb_model,
                },
                rules: config::RulesSection { path: rules_path },
                kb: config::KbSection::default(),
            };
            cmd_init(cfg, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Field { command } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = field_cmds::run_field_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &resolved, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Measure { command } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = measure_cmd::run_measure_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Schedule { command } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = schedule_cmds::run_schedule_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Kb { command } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = kb_cmds::run_kb_command(command, &resolved, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = AgriplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(&resolved, db_pool.clone(), &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "agriplan", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that read or modify process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
