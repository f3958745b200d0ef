use super::{
    signals::{candle_changes, four_candle_rule, two_candle_rule, EntryConfig},
    EntryRule, EntrySignal, Strategy,
};
use crate::models::Candle;

/// Short-term candle momentum entry
///
/// Two independent rules, either one is enough:
/// - two-candle: last two candles green with a strong enough close
/// - four-candle: strong total move over four candles with at most one red
#[derive(Debug, Clone, Default)]
pub struct MomentumStrategy {
    config: EntryConfig,
}

impl MomentumStrategy {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }
}

impl Strategy for MomentumStrategy {
    fn evaluate(&self, candles: &[Candle]) -> EntrySignal {
        let changes = candle_changes(candles);

        if two_candle_rule(candles, &self.config) {
            tracing::info!(
                "BUY SIGNAL (two-candle): both green, second >= {:.2}%, sum >= {:.2}%",
                self.config.min_second_pct,
                self.config.combined_pct
            );
            return EntrySignal::enter(EntryRule::TwoCandle, changes);
        }

        if four_candle_rule(candles, &self.config) {
            tracing::info!(
                "BUY SIGNAL (four-candle): total >= {:.2}%, at most 1 red, last two not both red",
                self.config.four_candle_total_pct
            );
            return EntrySignal::enter(EntryRule::FourCandle, changes);
        }

        EntrySignal::none(changes)
    }

    fn name(&self) -> &str {
        "MomentumStrategy"
    }

    fn min_candles_required(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::signals::tests::window;

    #[test]
    fn test_strategy_name() {
        let strategy = MomentumStrategy::default();
        assert_eq!(strategy.name(), "MomentumStrategy");
        assert_eq!(strategy.min_candles_required(), 2);
    }

    #[test]
    fn test_four_candle_window_enters() {
        let strategy = MomentumStrategy::default();
        let candles = window(&[(100.0, 100.5), (100.5, 101.0), (101.0, 100.8), (100.8, 101.3)]);

        let signal = strategy.evaluate(&candles);
        assert!(signal.enter);
        // last candle is +0.496% but the one before is red, so only rule B applies
        assert_eq!(signal.rule, Some(EntryRule::FourCandle));
    }

    #[test]
    fn test_two_candle_rule_takes_precedence_in_report() {
        let strategy = MomentumStrategy::default();
        let candles = window(&[(100.0, 100.3), (100.3, 100.6), (100.6, 100.9), (100.9, 101.2)]);

        let signal = strategy.evaluate(&candles);
        assert!(signal.enter);
        assert_eq!(signal.rule, Some(EntryRule::TwoCandle));
    }

    #[test]
    fn test_short_window_only_uses_two_candle_rule() {
        let strategy = MomentumStrategy::default();

        let candles = window(&[(100.0, 100.3), (100.3, 100.6)]);
        assert!(strategy.evaluate(&candles).enter);

        let candles = window(&[(100.0, 101.0), (101.0, 100.9), (100.9, 101.0)]);
        assert!(!strategy.evaluate(&candles).enter);
    }

    #[test]
    fn test_no_signal_on_flat_market() {
        let strategy = MomentumStrategy::default();
        let candles = window(&[(100.0, 100.0); 6]);

        let signal = strategy.evaluate(&candles);
        assert!(!signal.enter);
        assert_eq!(signal.rule, None);
        assert_eq!(signal.changes, Some((0.0, 0.0)));
    }

    #[test]
    fn test_empty_and_single_windows() {
        let strategy = MomentumStrategy::default();
        assert!(!strategy.evaluate(&[]).enter);
        assert!(!strategy.evaluate(&window(&[(100.0, 105.0)])).enter);
    }

    #[test]
    fn test_custom_thresholds() {
        let strategy = MomentumStrategy::new(EntryConfig {
            min_second_pct: 1.0,
            combined_pct: 1.5,
            four_candle_total_pct: 5.0,
        });
        let candles = window(&[(100.0, 100.3), (100.3, 100.6), (100.6, 100.9), (100.9, 101.2)]);
        assert!(!strategy.evaluate(&candles).enter);
    }
}
