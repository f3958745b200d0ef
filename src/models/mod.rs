use serde::{Deserialize, Serialize};

/// Closed OHLCV candle
///
/// Times are exchange milliseconds. Only fully closed intervals are ever
/// handed to the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl Candle {
    /// Percentage change from open to close
    ///
    /// Returns `None` when the open price cannot be divided by (zero, negative
    /// or non-finite), so callers treat the candle as "no signal".
    pub fn change_pct(&self) -> Option<f64> {
        if !self.open.is_finite() || self.open <= 0.0 || !self.close.is_finite() {
            return None;
        }
        Some((self.close - self.open) / self.open * 100.0)
    }

    /// Candle has closed at `now_ms`
    pub fn is_closed_at(&self, now_ms: i64) -> bool {
        self.close_time < now_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Single partial execution of a market order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
    pub commission: f64,
    pub commission_asset: String,
}

/// Result of a filled market order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub order_id: i64,
    pub side: OrderSide,
    pub executed_qty: f64,
    pub fills: Vec<Fill>,
}

impl FillResult {
    /// Quantity-weighted average price across all fills
    ///
    /// `None` when the exchange reported no usable fill detail.
    pub fn average_price(&self) -> Option<f64> {
        let total_qty: f64 = self.fills.iter().map(|f| f.qty).sum();
        if total_qty <= 0.0 {
            return None;
        }
        let total_cost: f64 = self.fills.iter().map(|f| f.price * f.qty).sum();
        Some(total_cost / total_qty)
    }

    /// Average fill price, or `fallback` if there is no fill detail
    pub fn price_or(&self, fallback: f64) -> f64 {
        self.average_price().unwrap_or(fallback)
    }

    pub fn total_commission(&self) -> f64 {
        self.fills.iter().map(|f| f.commission).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 10.0,
            close_time: 179_999,
        }
    }

    fn fill(price: f64, qty: f64) -> Fill {
        Fill {
            price,
            qty,
            commission: 0.001,
            commission_asset: "SOL".to_string(),
        }
    }

    #[test]
    fn test_change_pct() {
        let change = candle(100.0, 100.5).change_pct().unwrap();
        assert!((change - 0.5).abs() < 1e-9);

        let change = candle(100.0, 99.0).change_pct().unwrap();
        assert!((change + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_pct_guards_bad_open() {
        assert_eq!(candle(0.0, 1.0).change_pct(), None);
        assert_eq!(candle(-5.0, 1.0).change_pct(), None);
        assert_eq!(candle(f64::NAN, 1.0).change_pct(), None);
    }

    #[test]
    fn test_is_closed_at() {
        let c = candle(1.0, 1.0);
        assert!(c.is_closed_at(180_000));
        assert!(!c.is_closed_at(179_999));
    }

    #[test]
    fn test_average_price_is_quantity_weighted() {
        let result = FillResult {
            order_id: 1,
            side: OrderSide::Buy,
            executed_qty: 4.0,
            fills: vec![fill(100.0, 1.0), fill(104.0, 3.0)],
        };
        assert!((result.average_price().unwrap() - 103.0).abs() < 1e-9);
        assert!((result.total_commission() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_price_falls_back_without_fills() {
        let result = FillResult {
            order_id: 2,
            side: OrderSide::Sell,
            executed_qty: 1.0,
            fills: vec![],
        };
        assert_eq!(result.average_price(), None);
        assert_eq!(result.price_or(42.5), 42.5);
    }
}
