use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod collect;
mod ingest;
mod report;

#[derive(Debug, Parser)]
#[command(name = "shelfdb")]
#[command(about = "Catalog intelligence command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate,
    /// Manage the source registry
    Sources {
        #[command(subcommand)]
        command: SourcesCommands,
    },
    /// Ingest browser-export JSON files for a single source
    Ingest {
        /// Export files to ingest, in capture order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source slug the exports belong to
        #[arg(long)]
        source: String,

        /// Observation timestamp for records without their own `scraped_at`
        /// (RFC 3339); defaults to now
        #[arg(long)]
        observed_at: Option<DateTime<Utc>>,

        /// Reconcile and print the summary without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Collect storefront catalogs for sources with a configured shop URL
    Collect {
        /// Restrict collection to a specific source (by slug)
        #[arg(long)]
        source: Option<String>,

        /// Preview which sources would be collected without fetching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print pricing and category analytics across sources
    Report,
    /// Show recent ingest runs
    Runs {
        /// Number of runs to show, newest first
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Retire products not observed within the staleness window
    Retire {
        /// Override the configured staleness window, in days
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum SourcesCommands {
    /// Upsert the YAML registry into the database
    Seed,
    /// List active sources
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = shelfdb_core::load_app_config_from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let cli = Cli::parse();

    let pool_config = shelfdb_db::PoolConfig::from_app_config(&config);
    let pool = shelfdb_db::connect_pool(&config.database_url, pool_config).await?;
    shelfdb_db::ping(&pool).await?;

    match cli.command {
        Commands::Migrate => {
            shelfdb_db::run_migrations(&pool).await?;
            println!("migrations are up to date");
        }
        Commands::Sources { command } => match command {
            SourcesCommands::Seed => {
                let file = shelfdb_core::load_sources(&config.sources_path)?;
                let count = shelfdb_db::seed_sources(&pool, &file.sources).await?;
                println!("seeded {count} sources from {}", config.sources_path.display());
            }
            SourcesCommands::List => {
                let sources = shelfdb_db::list_active_sources(&pool).await?;
                for s in &sources {
                    println!(
                        "{:<24} {:<12} {}",
                        s.slug,
                        s.role,
                        s.shop_url.as_deref().unwrap_or("-")
                    );
                }
                println!("{} active sources", sources.len());
            }
        },
        Commands::Ingest {
            files,
            source,
            observed_at,
            dry_run,
        } => {
            ingest::run_ingest(&pool, &config, &source, &files, observed_at, dry_run).await?;
        }
        Commands::Collect { source, dry_run } => {
            collect::run_collect(&pool, &config, source.as_deref(), dry_run).await?;
        }
        Commands::Report => {
            report::run_report(&pool).await?;
        }
        Commands::Runs { limit } => {
            let runs = shelfdb_db::list_ingest_runs(&pool, limit).await?;
            println!(
                "{:<6} {:<12} {:<10} {:>8} {:>11} {:>15} {}",
                "id", "type", "status", "records", "identities", "unidentifiable", "created"
            );
            for run in &runs {
                println!(
                    "{:<6} {:<12} {:<10} {:>8} {:>11} {:>15} {}",
                    run.id,
                    run.run_type,
                    run.status,
                    run.records_in,
                    run.unique_identities,
                    run.unidentifiable,
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            println!("{} runs", runs.len());
        }
        Commands::Retire { days } => {
            let window = days.unwrap_or(config.stale_after_days);
            let retired = shelfdb_db::retire_unseen_products(&pool, window).await?;
            println!("retired {retired} products unseen for more than {window} days");
        }
    }

    Ok(())
}

/// Best-effort attempt to mark a run failed; logs instead of propagating so
/// the original error survives as the command's exit cause.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    run_type: &str,
    message: String,
) {
    if let Err(e) = shelfdb_db::fail_ingest_run(pool, run_id, &message).await {
        tracing::error!(run_id, run_type, error = %e, "failed to mark ingest run as failed");
    }
}
