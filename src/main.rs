use clap::Parser;
use solspot::api::{BinanceClient, TelegramNotifier};
use solspot::persistence::{FileStore, RedisStore, StateStore};
use solspot::trader::ShutdownSignal;
use solspot::{logging, BotConfig, Result, Trader};

/// Single-pair spot momentum trader
#[derive(Parser, Debug)]
#[command(name = "solspot", version, about)]
struct Cli {
    /// TOML settings file (optional; environment variables override it)
    #[arg(long)]
    config: Option<String>,

    /// Load environment variables from this file instead of `.env`
    #[arg(long)]
    env_file: Option<String>,

    /// Validate configuration, print the effective settings and exit
    #[arg(long, default_value_t = false)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_filename(path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    let mut shutdown = ShutdownSignal::install().await;

    let config = BotConfig::load(cli.config.as_deref());
    logging::init(config.as_ref().ok().and_then(|c| c.log_file.as_deref()));

    tracing::info!("🚀 SolSpotBot starting...");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Invalid configuration: {}", e);
            return Err(e);
        }
    };
    tracing::info!("⚙️  {}", config.summary());

    if cli.check_config {
        println!("{}", config.summary());
        return Ok(());
    }

    let binance = BinanceClient::new(
        config.credentials.clone(),
        config.binance_base_url.clone(),
        config.retry.clone(),
    )?;
    if let Err(e) = binance.ping().await {
        tracing::warn!("⚠️  Binance ping failed, continuing: {}", e);
    }

    let notifier = TelegramNotifier::new(&config.telegram)?;
    let store = connect_store(&config).await?;
    tracing::info!("💾 State storage: {}", store.describe());

    let mut trader = Trader::new(&config, binance.clone(), binance, store, notifier);
    let startup = trader.startup().await;
    tracing::info!("Startup: {:?}", startup);

    trader.run(shutdown.recv()).await;
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

async fn connect_store(config: &BotConfig) -> Result<StateStore> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::new(url, &config.symbol).await?;
            tracing::info!("Redis persistence enabled at {}", url);
            Ok(StateStore::Redis(store))
        }
        None => Ok(StateStore::File(FileStore::new(config.state_file.clone()))),
    }
}
