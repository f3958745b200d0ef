use super::{ExecutionGateway, MarketData};
use crate::models::FillResult;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum BuyOutcome {
    /// Order filled; `price` is the realised average (or the observed
    /// pre-order price when the exchange gave no fill detail)
    Filled {
        fill: FillResult,
        price: f64,
        quote_balance: f64,
    },
    /// No quote balance, nothing attempted
    NoBalance,
    /// Balance present but too small to place an order
    NotPlaced,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SellOutcome {
    Filled { fill: FillResult, base_balance: f64 },
    /// Exchange reports zero base holdings, nothing attempted
    NoHoldings,
    /// Balance present but below the minimum tradable quantity
    NotPlaced { base_balance: f64 },
}

/// Turns entry/exit decisions into exchange orders
///
/// Checks balances before ordering and never touches the position itself;
/// the caller applies the outcome only after a call has returned successfully.
pub struct Executor {
    symbol: String,
    base_asset: String,
    quote_asset: String,
}

impl Executor {
    pub fn new(
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Spend the whole quote balance on the base asset
    pub async fn buy<M: MarketData, G: ExecutionGateway>(
        &self,
        market: &M,
        gateway: &G,
    ) -> Result<BuyOutcome> {
        let quote_balance = gateway.get_balance(&self.quote_asset).await?;
        tracing::info!("{} balance: {:.2}", self.quote_asset, quote_balance);

        if quote_balance <= 0.0 {
            return Ok(BuyOutcome::NoBalance);
        }

        let observed_price = market.get_price(&self.symbol).await?;

        match gateway.market_buy_using_available_quote(&self.symbol).await? {
            Some(fill) => {
                let price = fill.price_or(observed_price);
                if fill.average_price().is_none() {
                    tracing::warn!(
                        "Buy order {} reported no fills, using observed price {:.4}",
                        fill.order_id,
                        observed_price
                    );
                }
                Ok(BuyOutcome::Filled {
                    fill,
                    price,
                    quote_balance,
                })
            }
            None => Ok(BuyOutcome::NotPlaced),
        }
    }

    /// Sell the whole base balance
    pub async fn sell_all<G: ExecutionGateway>(&self, gateway: &G) -> Result<SellOutcome> {
        let base_balance = gateway.get_balance(&self.base_asset).await?;
        tracing::info!("{} balance: {:.6}", self.base_asset, base_balance);

        if base_balance <= 0.0 {
            return Ok(SellOutcome::NoHoldings);
        }

        match gateway.market_sell_all_base(&self.symbol).await? {
            Some(fill) => Ok(SellOutcome::Filled { fill, base_balance }),
            None => Ok(SellOutcome::NotPlaced { base_balance }),
        }
    }
}
