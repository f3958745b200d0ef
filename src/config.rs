use crate::api::binance::BINANCE_API_BASE;
use crate::api::retry::RetryPolicy;
use crate::api::telegram::TELEGRAM_API_BASE;
use crate::strategy::{EntryConfig, ExitConfig, MomentumStrategy, Strategy};
use crate::{BotError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "solspot.toml";
pub const DEFAULT_LOG_FILE: &str = "bot.log";

/// Kline intervals accepted by Binance Spot
const VALID_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

#[derive(Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for BinanceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceCredentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct TelegramSettings {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub base_url: String,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{}***", prefix)
}

/// Raw layered settings, before validation
///
/// Keys match the lowercased environment variable names.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
    pub binance_base_url: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_base_url: String,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub timeframe: String,
    pub candle_limit: usize,
    pub loop_interval_secs: u64,
    pub watchdog_minutes: u64,
    pub entry_min_second_pct: f64,
    pub entry_combined_pct: f64,
    pub entry_four_candle_total_pct: f64,
    pub max_loss_fraction: f64,
    pub trailing_share: f64,
    pub state_file: String,
    pub log_file: Option<String>,
    pub redis_url: Option<String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Settings {
    /// Defaults, then the optional TOML file, then the process environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::from_sources(path, Environment::default())
    }

    pub fn from_sources(path: Option<&str>, environment: Environment) -> Result<Self> {
        let entry = EntryConfig::default();
        let exit = ExitConfig::default();
        let retry = RetryPolicy::default();

        let builder = Config::builder()
            .set_default("binance_base_url", BINANCE_API_BASE)?
            .set_default("telegram_base_url", TELEGRAM_API_BASE)?
            .set_default("symbol", "SOLUSDC")?
            .set_default("base_asset", "SOL")?
            .set_default("quote_asset", "USDC")?
            .set_default("timeframe", "3m")?
            .set_default("candle_limit", 20)?
            .set_default("loop_interval_secs", 7)?
            .set_default("watchdog_minutes", 15)?
            .set_default("entry_min_second_pct", entry.min_second_pct)?
            .set_default("entry_combined_pct", entry.combined_pct)?
            .set_default("entry_four_candle_total_pct", entry.four_candle_total_pct)?
            .set_default("max_loss_fraction", exit.max_loss_fraction)?
            .set_default("trailing_share", exit.trailing_share)?
            .set_default("state_file", "state.json")?
            .set_default("log_file", DEFAULT_LOG_FILE)?
            .set_default("max_retries", retry.max_attempts as i64)?
            .set_default("retry_backoff_ms", retry.backoff.as_millis() as i64)?
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(path.is_some()))
            .add_source(environment);

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn validate(self) -> Result<BotConfig> {
        let api_key = required(self.binance_api_key, "BINANCE_API_KEY")?;
        let api_secret = required(self.binance_api_secret, "BINANCE_API_SECRET")?;

        if format!("{}{}", self.base_asset, self.quote_asset) != self.symbol {
            return Err(BotError::Config(format!(
                "symbol {} does not match {} + {}",
                self.symbol, self.base_asset, self.quote_asset
            )));
        }

        if !VALID_INTERVALS.contains(&self.timeframe.as_str()) {
            return Err(BotError::Config(format!(
                "Unsupported timeframe '{}'",
                self.timeframe
            )));
        }

        let min_candles = MomentumStrategy::default().min_candles_required();
        if self.candle_limit < min_candles {
            return Err(BotError::Config(format!(
                "candle_limit must be at least {} (got {})",
                min_candles, self.candle_limit
            )));
        }

        if self.loop_interval_secs == 0 {
            return Err(BotError::Config("loop_interval_secs must be positive".into()));
        }
        if self.watchdog_minutes == 0 {
            return Err(BotError::Config("watchdog_minutes must be positive".into()));
        }

        if !(self.max_loss_fraction > 0.0 && self.max_loss_fraction < 1.0) {
            return Err(BotError::Config(format!(
                "max_loss_fraction must be in (0, 1) (got {})",
                self.max_loss_fraction
            )));
        }
        if !(self.trailing_share > 0.0 && self.trailing_share <= 1.0) {
            return Err(BotError::Config(format!(
                "trailing_share must be in (0, 1] (got {})",
                self.trailing_share
            )));
        }

        let thresholds = [
            self.entry_min_second_pct,
            self.entry_combined_pct,
            self.entry_four_candle_total_pct,
        ];
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(BotError::Config("entry thresholds must be finite".into()));
        }

        Ok(BotConfig {
            credentials: BinanceCredentials {
                api_key,
                api_secret,
            },
            binance_base_url: self.binance_base_url,
            telegram: TelegramSettings {
                token: non_empty(self.telegram_token),
                chat_id: non_empty(self.telegram_chat_id),
                base_url: self.telegram_base_url,
            },
            symbol: self.symbol,
            base_asset: self.base_asset,
            quote_asset: self.quote_asset,
            timeframe: self.timeframe,
            candle_limit: self.candle_limit,
            loop_interval: Duration::from_secs(self.loop_interval_secs),
            watchdog_threshold: Duration::from_secs(self.watchdog_minutes * 60),
            entry: EntryConfig {
                min_second_pct: self.entry_min_second_pct,
                combined_pct: self.entry_combined_pct,
                four_candle_total_pct: self.entry_four_candle_total_pct,
            },
            exit: ExitConfig {
                max_loss_fraction: self.max_loss_fraction,
                trailing_share: self.trailing_share,
            },
            state_file: PathBuf::from(self.state_file),
            log_file: non_empty(self.log_file).map(PathBuf::from),
            redis_url: non_empty(self.redis_url),
            retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| BotError::Config(format!("{} is required", name)))
}

/// Validated, immutable bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: BinanceCredentials,
    pub binance_base_url: String,
    pub telegram: TelegramSettings,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub timeframe: String,
    pub candle_limit: usize,
    pub loop_interval: Duration,
    pub watchdog_threshold: Duration,
    pub entry: EntryConfig,
    pub exit: ExitConfig,
    pub state_file: PathBuf,
    /// Plain-text copy of the log; `None` logs to the console only
    pub log_file: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub retry: RetryPolicy,
}

impl BotConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        Settings::load(path)?.validate()
    }

    /// Human readable settings, secrets redacted
    pub fn summary(&self) -> String {
        let storage = match &self.redis_url {
            Some(_) => "redis".to_string(),
            None => self.state_file.display().to_string(),
        };

        format!(
            "symbol={} ({}/{}), timeframe={}, candles={}, loop={:?}, watchdog={:?}\n\
             entry: second>={:.2}%, combined>={:.2}%, four-candle>={:.2}%\n\
             exit: stop={:.3}%, trailing share={:.2}\n\
             state={}, retries={} x {:?}, telegram={}",
            self.symbol,
            self.base_asset,
            self.quote_asset,
            self.timeframe,
            self.candle_limit,
            self.loop_interval,
            self.watchdog_threshold,
            self.entry.min_second_pct,
            self.entry.combined_pct,
            self.entry.four_candle_total_pct,
            self.exit.max_loss_fraction * 100.0,
            self.exit.trailing_share,
            storage,
            self.retry.max_attempts,
            self.retry.backoff,
            if self.telegram.is_configured() { "on" } else { "off" },
        )
    }
}
