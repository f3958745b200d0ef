// Decision engine: pure entry/exit evaluation
pub mod exit;
pub mod momentum;
pub mod signals;

pub use exit::{evaluate_exit, ExitConfig, ExitReason, ExitSignal};
pub use momentum::MomentumStrategy;
pub use signals::EntryConfig;

use crate::models::Candle;

/// Which entry rule produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRule {
    TwoCandle,
    FourCandle,
}

impl EntryRule {
    pub fn describe(&self) -> &'static str {
        match self {
            EntryRule::TwoCandle => "2 green candles",
            EntryRule::FourCandle => "4-candle momentum",
        }
    }
}

/// Outcome of an entry evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub enter: bool,
    pub rule: Option<EntryRule>,
    /// Changes (r1, r2) of the two most recent candles, in percent
    pub changes: Option<(f64, f64)>,
}

impl EntrySignal {
    pub fn enter(rule: EntryRule, changes: Option<(f64, f64)>) -> Self {
        Self {
            enter: true,
            rule: Some(rule),
            changes,
        }
    }

    pub fn none(changes: Option<(f64, f64)>) -> Self {
        Self {
            enter: false,
            rule: None,
            changes,
        }
    }
}

/// Base trait for entry strategies
///
/// Implementations must be pure: the same window always yields the same
/// signal, with no I/O and no hidden state.
pub trait Strategy: Send + Sync {
    /// Evaluate a window of closed candles, oldest first
    fn evaluate(&self, candles: &[Candle]) -> EntrySignal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
