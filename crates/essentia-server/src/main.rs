//! Essentia grid standalone server
//!
//! Runs one grid cache against in-memory collaborators, ticks it on the
//! configured interval and logs every change batch until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use essentia_core::{
    ActionSource, CapabilityToken, ChangeBatch, EssentiaReceiver, GridConfig, GridEssentiaCache,
    InMemoryFluidStore, InMemoryPowerGrid, StaticRegistry, TickDriver, TransferMode,
};

const ASPECTS: [&str; 6] = ["aer", "aqua", "ignis", "ordo", "perditio", "terra"];

/// Essentia grid - network-wide essentia cache with power-gated transfers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Initial power balance of the grid
    #[arg(long, default_value_t = 10_000.0)]
    power: f64,

    /// Essentia of each aspect seeded into the store at startup
    #[arg(long, default_value_t = 64)]
    seed: i64,

    /// Stop after this many ticks instead of waiting for Ctrl-C
    #[arg(long)]
    ticks: Option<u64>,
}

/// Logs every batch it receives while the grid it belongs to is alive.
struct LoggingReceiver {
    grid: std::sync::Weak<GridEssentiaCache<String, String>>,
}

impl EssentiaReceiver<String> for LoggingReceiver {
    fn is_valid(&self, token: &CapabilityToken) -> bool {
        self.grid
            .upgrade()
            .is_some_and(|grid| grid.is_valid(token))
    }

    fn post_change(&self, changes: &ChangeBatch<String>) {
        for change in changes.iter() {
            info!(aspect = %change.aspect, delta = change.amount, "essentia changed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "essentia_server={level},essentia_core={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting essentia grid server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => GridConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => GridConfig::default(),
    };
    info!(
        ratio = config.conversion_ratio,
        power_per_essentia = config.power_per_essentia,
        tick_ms = config.tick_interval.as_millis() as u64,
        "configuration loaded"
    );

    let mut registry: StaticRegistry<String, String> = StaticRegistry::new();
    for aspect in ASPECTS {
        registry.register(aspect.to_string(), format!("gas.{aspect}"));
    }

    let store: Arc<InMemoryFluidStore<String>> = Arc::new(InMemoryFluidStore::new());
    let power = Arc::new(InMemoryPowerGrid::new(args.power));
    let tick_interval = config.tick_interval;
    let grid = GridEssentiaCache::builder(CapabilityToken::new(1))
        .config(config)
        .store(store.clone())
        .power(power.clone())
        .registry(Arc::new(registry))
        .build()?;
    grid.on_grid_ready();

    let ratio = i64::from(grid.config().conversion_ratio);
    for aspect in ASPECTS {
        store.set_silently(format!("gas.{aspect}"), args.seed.saturating_mul(ratio));
    }
    grid.on_list_update();

    let receiver = Arc::new(LoggingReceiver {
        grid: Arc::downgrade(&grid),
    });
    grid.add_listener(receiver, grid.token());
    info!(aspects = grid.essentia_list().len(), "grid ready");

    let driver = TickDriver::spawn(Arc::clone(&grid), tick_interval);

    let ignis = "ignis".to_string();
    let source = ActionSource::Machine(1);
    let extracted = grid.extract(&ignis, 8, TransferMode::Commit, &source);
    let rejected = grid.inject(&ignis, 3, TransferMode::Commit, &source);
    info!(
        extracted,
        rejected,
        power_left = power.balance(),
        "demo transfers complete"
    );

    match args.ticks {
        Some(n) => tokio::time::sleep(tick_interval.saturating_mul(u32::try_from(n)?)).await,
        None => {
            info!("Running; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    let ticks = driver.shutdown().await;
    let snapshot = grid.counters().snapshot();
    info!(ticks, ?snapshot, "essentia grid server stopped");

    Ok(())
}
