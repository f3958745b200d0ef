// Order execution and market data seams
pub mod executor;
pub mod position_manager;

pub use executor::{BuyOutcome, Executor, SellOutcome};
pub use position_manager::{Position, PositionManager};

use crate::models::{Candle, FillResult};
use crate::Result;

/// Source of candles and prices for one exchange
#[allow(async_fn_in_trait)]
pub trait MarketData {
    /// Most recent `count` closed candles, oldest first
    ///
    /// Fails with `BotError::DataUnavailable` once retries are exhausted.
    async fn get_candles(&self, symbol: &str, interval: &str, count: usize) -> Result<Vec<Candle>>;

    /// Latest trade price
    async fn get_price(&self, symbol: &str) -> Result<f64>;
}

/// Balance queries and full-balance market orders
#[allow(async_fn_in_trait)]
pub trait ExecutionGateway {
    /// Free balance of `asset`
    async fn get_balance(&self, asset: &str) -> Result<f64>;

    /// Market buy spending the available quote balance
    ///
    /// `Ok(None)` when the balance is too small to place an order.
    async fn market_buy_using_available_quote(&self, symbol: &str) -> Result<Option<FillResult>>;

    /// Market sell of the whole base balance
    ///
    /// `Ok(None)` when the balance is too small to place an order.
    async fn market_sell_all_base(&self, symbol: &str) -> Result<Option<FillResult>>;
}
