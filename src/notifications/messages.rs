use crate::strategy::{EntrySignal, ExitReason};
use chrono::{DateTime, Utc};
use std::fmt::Display;

const BOT_NAME: &str = "SolSpotBot";

pub fn started(symbol: &str, first_run_sell_done: bool) -> String {
    format!(
        "{} started\nFIRST_RUN_SELL_DONE={}\nSymbol={}",
        BOT_NAME, first_run_sell_done, symbol
    )
}

pub fn stopped(symbol: &str, holding: bool) -> String {
    format!("{} stopped\nSymbol={}\nHolding={}", BOT_NAME, symbol, holding)
}

pub fn startup_sell(
    base_asset: &str,
    quote_asset: &str,
    price: f64,
    qty: f64,
    commission: f64,
) -> String {
    format!(
        "Startup SELL executed\nSold all {} to {}\nPrice={:.4}, qty={:.6}, commission={:.6}",
        base_asset, quote_asset, price, qty, commission
    )
}

pub fn buy(symbol: &str, price: f64, qty: f64, signal: &EntrySignal, at: DateTime<Utc>) -> String {
    let rule = signal.rule.map(|r| r.describe()).unwrap_or("entry signal");
    let reason = match signal.changes {
        Some((r1, r2)) => format!("{} r1={:.2}%, r2={:.2}%", rule, r1, r2),
        None => rule.to_string(),
    };

    format!(
        "BUY executed {}\nPrice={:.4}\nQty={:.6}\nReason: {}\nTime={}",
        symbol,
        price,
        qty,
        reason,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Completed round trip, for the SELL message
#[derive(Debug, Clone, PartialEq)]
pub struct SellReport<'a> {
    pub symbol: &'a str,
    pub reason: ExitReason,
    pub entry_price: f64,
    pub exit_price: f64,
    pub peak_price: f64,
    pub qty: f64,
}

impl SellReport<'_> {
    pub fn pnl_pct(&self) -> f64 {
        pct_from_entry(self.exit_price, self.entry_price)
    }

    pub fn max_profit_pct(&self) -> f64 {
        pct_from_entry(self.peak_price, self.entry_price)
    }
}

fn pct_from_entry(price: f64, entry: f64) -> f64 {
    if entry > 0.0 {
        (price - entry) / entry * 100.0
    } else {
        0.0
    }
}

pub fn sell(report: &SellReport<'_>) -> String {
    let mut lines = vec![
        format!("SELL ({}) {}", report.reason.label(), report.symbol),
        format!("Entry={:.4}", report.entry_price),
        format!("Exit={:.4}", report.exit_price),
        format!("Qty={:.6}", report.qty),
        format!("PnL={:+.2}%", report.pnl_pct()),
    ];

    let max_profit = report.max_profit_pct();
    if max_profit != 0.0 {
        lines.push(format!("Max profit during trade={:.2}%", max_profit));
    }
    lines.push(format!("Reason={}", report.reason));

    lines.join("\n")
}

pub fn desync(base_asset: &str, symbol: &str, entry_price: f64) -> String {
    format!(
        "Sell signal but {} balance is 0 - possible desync of holding flag\nSymbol={}\nEntry={:.4}\nPosition reset to FLAT",
        base_asset, symbol, entry_price
    )
}

/// Exit signal with a balance too small to sell; sent once per stuck position
pub fn sell_not_placed(
    base_asset: &str,
    symbol: &str,
    base_balance: f64,
    reason: ExitReason,
) -> String {
    format!(
        "Sell signal ({}) but {:.6} {} is below the tradable minimum\nSymbol={}\nPosition stays open, check the account",
        reason.label(),
        base_balance,
        base_asset,
        symbol
    )
}

pub fn watchdog(idle_minutes: u64) -> String {
    format!(
        "WATCHDOG: no activity for {} minutes. Please check the bot / connection.",
        idle_minutes
    )
}

pub fn error(err: &dyn Display) -> String {
    format!("ERROR in {}\n{}", BOT_NAME, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::EntryRule;
    use chrono::TimeZone;

    #[test]
    fn test_buy_message() {
        let signal = EntrySignal::enter(EntryRule::TwoCandle, Some((0.18, 0.25)));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 0).unwrap();
        let text = buy("SOLUSDC", 145.5, 3.2, &signal, at);

        assert_eq!(
            text,
            "BUY executed SOLUSDC\nPrice=145.5000\nQty=3.200000\n\
             Reason: 2 green candles r1=0.18%, r2=0.25%\nTime=2024-05-01 12:03:00 UTC"
        );
    }

    #[test]
    fn test_sell_not_placed_message() {
        let text = sell_not_placed("SOL", "SOLUSDC", 0.0004, ExitReason::StopLoss);

        assert!(text.starts_with("Sell signal (stop-loss) but 0.000400 SOL"));
        assert!(text.contains("Symbol=SOLUSDC"));
    }

    #[test]
    fn test_sell_message() {
        let report = SellReport {
            symbol: "SOLUSDC",
            reason: ExitReason::TrailingTakeProfit,
            entry_price: 100.0,
            exit_price: 108.0,
            peak_price: 110.0,
            qty: 2.0,
        };
        let text = sell(&report);

        assert!(text.starts_with("SELL (trailing TP) SOLUSDC\n"));
        assert!(text.contains("PnL=+8.00%"));
        assert!(text.contains("Max profit during trade=10.00%"));
        assert!(text.ends_with("Reason=TRAILING_TP"));
    }

    #[test]
    fn test_sell_loss_is_signed() {
        let report = SellReport {
            symbol: "SOLUSDC",
            reason: ExitReason::StopLoss,
            entry_price: 100.0,
            exit_price: 99.5,
            peak_price: 100.0,
            qty: 1.0,
        };
        let text = sell(&report);

        assert!(text.contains("PnL=-0.50%"));
        assert!(!text.contains("Max profit"));
    }

    #[test]
    fn test_operational_messages() {
        assert_eq!(
            started("SOLUSDC", false),
            "SolSpotBot started\nFIRST_RUN_SELL_DONE=false\nSymbol=SOLUSDC"
        );
        assert!(watchdog(15).starts_with("WATCHDOG: no activity for 15 minutes"));
        assert_eq!(error(&"boom"), "ERROR in SolSpotBot\nboom");
        assert!(desync("SOL", "SOLUSDC", 50.0).contains("SOL balance is 0"));
    }
}
