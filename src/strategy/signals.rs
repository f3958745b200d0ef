use crate::models::Candle;
use serde::{Deserialize, Serialize};

/// Thresholds for the momentum entry rules, all in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Two-candle rule: minimum change of the most recent candle
    pub min_second_pct: f64,
    /// Two-candle rule: minimum sum of both changes
    pub combined_pct: f64,
    /// Four-candle rule: minimum sum of the four changes
    pub four_candle_total_pct: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            min_second_pct: 0.20,
            combined_pct: 0.35,
            four_candle_total_pct: 0.70,
        }
    }
}

/// Percentage changes of the last `n` candles, oldest first
///
/// `None` if the window is shorter than `n` or any candle has an unusable
/// open price.
pub fn last_changes(candles: &[Candle], n: usize) -> Option<Vec<f64>> {
    if candles.len() < n {
        return None;
    }
    candles[candles.len() - n..]
        .iter()
        .map(Candle::change_pct)
        .collect()
}

/// Green means strictly positive change. Zero counts as red.
pub fn is_green(change_pct: f64) -> bool {
    change_pct > 0.0
}

/// Changes `(r1, r2)` of the two most recent candles, for reporting
pub fn candle_changes(candles: &[Candle]) -> Option<(f64, f64)> {
    let changes = last_changes(candles, 2)?;
    Some((changes[0], changes[1]))
}

/// Two-candle rule
///
/// Both candles green, the latest at least `min_second_pct` and the pair
/// together at least `combined_pct`.
pub fn two_candle_rule(candles: &[Candle], config: &EntryConfig) -> bool {
    let Some(changes) = last_changes(candles, 2) else {
        return false;
    };
    let (r1, r2) = (changes[0], changes[1]);

    is_green(r1) && is_green(r2) && r2 >= config.min_second_pct && r1 + r2 >= config.combined_pct
}

/// Four-candle rule
///
/// Total move of the last four candles at least `four_candle_total_pct`, at
/// most one red candle, and the last two not both red.
pub fn four_candle_rule(candles: &[Candle], config: &EntryConfig) -> bool {
    let Some(changes) = last_changes(candles, 4) else {
        return false;
    };

    let total: f64 = changes.iter().sum();
    let red_count = changes.iter().filter(|&&c| !is_green(c)).count();
    let last_two_red = !is_green(changes[2]) && !is_green(changes[3]);

    total >= config.four_candle_total_pct && red_count <= 1 && !last_two_red
}

/// Check that open times are strictly increasing
pub fn validate_window_order(candles: &[Candle]) -> anyhow::Result<()> {
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            anyhow::bail!(
                "Candles are not strictly increasing: {} followed by {}",
                pair[0].open_time,
                pair[1].open_time
            );
        }
    }
    Ok(())
}
