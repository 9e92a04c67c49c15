use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info};

use project_harvester_lib::config::DEFAULT_PAGES;
use project_harvester_lib::{
    logger, AppConfig, CancelToken, ChromeSession, HarvestOptions, Harvester, SqliteStore,
};

/// Harvest project registrations from the registry listing into SQLite.
#[derive(Debug, Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Maximum number of listing pages to visit.
    #[arg(long, default_value_t = DEFAULT_PAGES)]
    pages: usize,

    /// Database file; overrides DB_URL.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listing URL; overrides REGISTRY_URL.
    #[arg(long)]
    url: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    logger::init();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(url) = cli.url {
        config.registry_url = url;
    }
    let options = HarvestOptions::new(&config, cli.pages)?;

    info!("Starting Project Harvester...");
    let mut store = SqliteStore::open(&config.db_path)?;
    let mut session = ChromeSession::launch(&config)?;

    let summary = Harvester::new(options).run(&mut session, &mut store, &CancelToken::new(), &mut |s| {
        info!(
            "Progress: {} pages, {} inserted, {} skipped, {} failed",
            s.pages_visited, s.inserted, s.skipped_duplicate, s.failed
        );
    });
    drop(session);

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.aborted() {
        error!("Harvest aborted before finishing.");
        process::exit(1);
    }
    info!("Harvest completed.");
    Ok(())
}
