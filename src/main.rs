//! Decisivis - Match prediction service
//!
//! Runs the prediction pipeline headless: loads historical match data,
//! restores persisted model versions and keeps the self-retraining loop
//! alive until Ctrl+C.
//!
//! # Usage
//! ```sh
//! cargo run -- --data matches.csv
//! ```
//!
//! # Environment Variables
//! - `CACHE_TTL_SECS` - Seconds a cached prediction stays valid (default: 3600)
//! - `OUTCOME_BUFFER_CAPACITY` - Reports accumulated before retraining (default: 100)
//! - `ADVISORY_ENABLED` - Consult the advisory collaborator (default: false)
//! - `MODEL_DIR` - Directory model versions are persisted into (default: ./models)

use anyhow::Result;
use clap::Parser;
use decisivis::application::system::PredictionSystem;
use decisivis::config::Config;
use decisivis::domain::ports::AdvisoryService;
use decisivis::infrastructure::advisory::{HttpAdvisoryService, NullAdvisoryService};
use decisivis::infrastructure::match_store::InMemoryMatchStore;
use decisivis::infrastructure::model_repo::JsonModelRepository;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "decisivis", about = "Self-retraining match prediction service")]
struct Args {
    /// Historical match results CSV.
    #[arg(long)]
    data: PathBuf,

    /// Overrides MODEL_DIR.
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Decisivis {} starting...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(model_dir) = args.model_dir {
        config.model_dir = model_dir;
    }
    info!(
        "Configuration loaded: buffer={}, ttl={}s, advisory={}",
        config.buffer_capacity, config.cache_ttl_secs, config.advisory_enabled
    );

    let store = Arc::new(InMemoryMatchStore::load_csv(&args.data)?);
    info!("Match data loaded: {} rows", store.len().await);

    let advisory: Arc<dyn AdvisoryService> = if config.advisory_enabled {
        Arc::new(HttpAdvisoryService::new(
            config.advisory_url.clone(),
            config.advisory_timeout_ms,
        )?)
    } else {
        Arc::new(NullAdvisoryService)
    };
    let model_repo = Arc::new(JsonModelRepository::new(config.model_dir.clone()));

    let system = PredictionSystem::build(config, store, advisory, model_repo).await?;
    let _loop_handle = system.start();
    info!("Retraining loop running.");

    // Surface controller state transitions in the logs.
    let mut state = system.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!("Controller state: {current:?}");
        }
        warn!("Controller state channel closed");
    });

    info!("Service running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");

    Ok(())
}
