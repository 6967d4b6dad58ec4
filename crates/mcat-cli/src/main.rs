use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mcat_core::{AppConfig, Channel, FileAuditLog};
use mcat_db::CatalogStore;
use tracing_subscriber::EnvFilter;

mod catalog;
mod categories;

#[derive(Debug, Parser)]
#[command(name = "mcat")]
#[command(about = "Master catalog reconciliation for HB, Pazarama and PTT")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Merge product candidates from a JSON array into the master catalog
    ImportProducts {
        /// Path to a JSON file holding an array of candidates
        file: PathBuf,
    },
    /// Store a platform's category tree from a JSON file
    ImportCategories {
        /// Platform the tree belongs to (hb, pazarama, ptt)
        platform: Channel,
        /// Path to the category tree JSON
        file: PathBuf,
    },
    /// Map a master category name to a platform leaf category
    ResolveCategory {
        platform: Channel,
        /// Master category name
        name: String,
        /// Pick the Nth offered candidate (1-based) instead of prompting
        #[arg(long, conflicts_with = "id")]
        choose: Option<usize>,
        /// Use this platform category id instead of prompting
        #[arg(long)]
        id: Option<String>,
    },
    /// List records waiting to be pushed to their channels
    Dirty {
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// List recorded identity conflicts, newest first
    Duplicates {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Change a master price: "149.90", "*1.2", "/2", "+10" or "-5"
    Reprice {
        barcode: String,
        #[arg(allow_hyphen_values = true)]
        expr: String,
        /// Confirm a change that more than doubles or halves the price
        #[arg(long)]
        yes: bool,
    },
    /// Set the price multiplier used for one channel
    Markup {
        barcode: String,
        channel: Channel,
        factor: f64,
    },
    /// Forget every cached category mapping
    ClearMappings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = mcat_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let audit = Arc::new(FileAuditLog::open(&config.audit_log_path).map_err(|e| {
        anyhow::anyhow!(
            "failed to open audit log {}: {e}",
            config.audit_log_path.display()
        )
    })?);
    let store = CatalogStore::connect(&config, audit.clone()).await?;
    let result = run(&store, &config, cli.command).await;

    if let Err(e) = audit.flush() {
        tracing::error!(error = %e, "failed to flush audit log");
    }
    result
}

async fn run(store: &CatalogStore, config: &AppConfig, command: Commands) -> anyhow::Result<()> {
    let applied = store.migrate().await?;
    if applied > 0 {
        tracing::info!(applied, "migrations applied");
    }

    match command {
        Commands::Migrate => println!("applied {applied} migration(s)"),
        Commands::ImportProducts { file } => catalog::run_import_products(store, &file).await?,
        Commands::ImportCategories { platform, file } => {
            categories::run_import_categories(store, platform, &file).await?;
        }
        Commands::ResolveCategory {
            platform,
            name,
            choose,
            id,
        } => {
            categories::run_resolve_category(store, config, platform, &name, choose, id).await?;
        }
        Commands::Dirty { limit } => catalog::run_dirty(store, limit).await?,
        Commands::Duplicates { limit } => catalog::run_duplicates(store, limit).await?,
        Commands::Reprice { barcode, expr, yes } => {
            catalog::run_reprice(store, &barcode, &expr, yes).await?;
        }
        Commands::Markup {
            barcode,
            channel,
            factor,
        } => catalog::run_markup(store, &barcode, channel, factor).await?,
        Commands::ClearMappings => categories::run_clear_mappings(store, config).await?,
    }

    Ok(())
}
