mod clob;
mod config;
mod error;
mod market;
mod reading;
mod reconcile;
mod resolver;
mod scheduler;
mod signing;
mod state;
mod types;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use crate::clob::{DryRunClob, LiveClob, OrderExecutor};
use crate::config::Config;
use crate::error::BotError;
use crate::market::GammaCatalog;
use crate::reading::PgReadingSource;
use crate::reconcile::{OrderPolicy, Reconciler};
use crate::scheduler::RunMode;
use crate::state::{JsonFileStateStore, MemoryStateStore, StateStore};

#[derive(Parser, Debug)]
#[command(name = "autobet", version, about = "Buy YES on the temperature bucket the latest reading lands in")]
struct Cli {
    /// Run a single cycle and exit (default: watch forever).
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (optional; in production set env vars directly)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autobet=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(?config, "loaded configuration");

    let mode = RunMode::from_flag(cli.once, config.check_interval);
    info!(
        "auto-bet bot starting ({})",
        if cli.once { "one-shot mode" } else { "watcher mode" }
    );

    let executor = build_executor(&config).await;
    let store: Box<dyn StateStore> = match &config.state_file {
        Some(path) => {
            let file = JsonFileStateStore::new(path);
            info!(path = %file.path().display(), "position state persisted to file");
            Box::new(file)
        }
        None => {
            warn!("STATE_FILE not set: position state is lost on restart");
            Box::new(MemoryStateStore::new())
        }
    };

    let mut reconciler = Reconciler::new(
        Box::new(PgReadingSource::connect_lazy(&config.database_url)?),
        Box::new(GammaCatalog::new(&config.gamma_base_url)?),
        executor,
        store,
        config.market_slug.clone(),
        OrderPolicy {
            notional: config.bet_size,
            limit_price: config.price_limit,
        },
    )?;

    let cycles = match mode {
        RunMode::Once => scheduler::run(&mut reconciler, mode, std::future::pending()).await,
        RunMode::Watch { .. } => {
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            scheduler::run(&mut reconciler, mode, shutdown).await
        }
    };

    info!(
        cycles,
        last_reading = ?reconciler.state().last_processed_reading_id,
        held = ?reconciler.state().held_bucket_id,
        "stopped"
    );
    Ok(())
}

/// Live CLOB when a key is configured and usable; otherwise simulation.
async fn build_executor(config: &Config) -> Box<dyn OrderExecutor> {
    if config.simulate() {
        if config.dry_run {
            info!("DRY_RUN set: orders will be simulated");
        } else {
            warn!("PRIVATE_KEY missing or placeholder: orders will be simulated");
        }
        return Box::new(DryRunClob);
    }
    let Some(key) = config.private_key.as_deref() else {
        return Box::new(DryRunClob);
    };

    let live = match LiveClob::new(&config.clob_host, key, config.chain_id, config.neg_risk) {
        Ok(l) => l,
        Err(e) => {
            error!(
                "{}; falling back to simulation",
                BotError::Config(format!("{e:#}"))
            );
            return Box::new(DryRunClob);
        }
    };
    if let Err(e) = live.verify_chain(&config.rpc_url).await {
        warn!(error = %format!("{e:#}"), "RPC chain check failed, continuing with configured chain id");
    }
    Box::new(live)
}
