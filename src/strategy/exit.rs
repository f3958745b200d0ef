use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit thresholds, as fractions (0.005 = 0.5%)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Hard stop: maximum loss relative to entry
    pub max_loss_fraction: f64,
    /// Trailing take-profit: share of peak profit that may be given back
    pub trailing_share: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            max_loss_fraction: 0.005,
            trailing_share: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    None,
    StopLoss,
    TrailingTakeProfit,
}

impl ExitReason {
    /// Short human label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::None => "exit",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TrailingTakeProfit => "trailing TP",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ExitReason::None => "NONE",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TrailingTakeProfit => "TRAILING_TP",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitSignal {
    pub should_exit: bool,
    pub reason: ExitReason,
}

impl ExitSignal {
    pub fn hold() -> Self {
        Self {
            should_exit: false,
            reason: ExitReason::None,
        }
    }

    fn exit(reason: ExitReason) -> Self {
        Self {
            should_exit: true,
            reason,
        }
    }
}

/// Decide whether an open position should be closed
///
/// Stop-loss is checked first and fires whether or not the trade was ever
/// profitable. Trailing take-profit is only considered once the peak is above
/// entry, and fires when the share of peak profit given back reaches
/// `trailing_share`. The current profit does not need to be positive.
pub fn evaluate_exit(
    current_price: f64,
    entry_price: f64,
    peak_price: f64,
    config: &ExitConfig,
) -> ExitSignal {
    if !entry_price.is_finite() || entry_price <= 0.0 || !current_price.is_finite() {
        return ExitSignal::hold();
    }

    let profit_now = (current_price - entry_price) / entry_price;
    let profit_peak = (peak_price - entry_price) / entry_price;

    tracing::debug!(
        "Price check: current={:.4}, entry={:.4}, peak={:.4}, profit_now={:.2}%, profit_peak={:.2}%",
        current_price,
        entry_price,
        peak_price,
        profit_now * 100.0,
        profit_peak * 100.0
    );

    // Compared in price space so the floor itself is inclusive
    let stop_price = entry_price * (1.0 - config.max_loss_fraction);
    if current_price <= stop_price {
        tracing::warn!(
            "STOP LOSS triggered: profit_now={:.2}% <= -{:.2}%",
            profit_now * 100.0,
            config.max_loss_fraction * 100.0
        );
        return ExitSignal::exit(ExitReason::StopLoss);
    }

    if profit_peak > 0.0 {
        let relative_drawdown = (profit_peak - profit_now) / profit_peak;

        if relative_drawdown >= config.trailing_share {
            tracing::warn!(
                "TRAILING_TP triggered: relative_drawdown={:.2}%, profit_peak={:.2}%, profit_now={:.2}%, peak_price={:.4}, current_price={:.4}",
                relative_drawdown * 100.0,
                profit_peak * 100.0,
                profit_now * 100.0,
                peak_price,
                current_price
            );
            return ExitSignal::exit(ExitReason::TrailingTakeProfit);
        }
    }

    ExitSignal::hold()
}
