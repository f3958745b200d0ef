use crate::persistence::Snapshot;

/// Position in the traded pair
///
/// Full-balance sizing means there is never more than one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Flat,
    Open { entry_price: f64, peak_price: f64 },
}

impl Position {
    pub fn is_open(&self) -> bool {
        matches!(self, Position::Open { .. })
    }

    pub fn entry_price(&self) -> Option<f64> {
        match self {
            Position::Open { entry_price, .. } => Some(*entry_price),
            Position::Flat => None,
        }
    }

    pub fn peak_price(&self) -> Option<f64> {
        match self {
            Position::Open { peak_price, .. } => Some(*peak_price),
            Position::Flat => None,
        }
    }
}

/// Position state machine: FLAT -> OPEN -> FLAT
///
/// Owns the position and the one-time startup liquidation flag, which
/// together make up the persisted snapshot. Every mutating method that
/// returns `true` (or succeeds) must be followed by a save.
#[derive(Debug, Clone)]
pub struct PositionManager {
    position: Position,
    first_run_sell_done: bool,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            position: Position::Flat,
            first_run_sell_done: false,
        }
    }

    /// Restore from a persisted snapshot
    ///
    /// A snapshot claiming a position without a usable entry price is loaded
    /// as FLAT; a peak below entry is raised to entry.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let position = if snapshot.holding {
            if snapshot.buy_price.is_finite() && snapshot.buy_price > 0.0 {
                Position::Open {
                    entry_price: snapshot.buy_price,
                    peak_price: snapshot.peak_price.max(snapshot.buy_price),
                }
            } else {
                tracing::warn!(
                    "Snapshot says holding but buy_price={} is unusable, starting FLAT",
                    snapshot.buy_price
                );
                Position::Flat
            }
        } else {
            Position::Flat
        };

        Self {
            position,
            first_run_sell_done: snapshot.first_run_sell_done,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        match self.position {
            Position::Open {
                entry_price,
                peak_price,
            } => Snapshot {
                holding: true,
                buy_price: entry_price,
                peak_price,
                first_run_sell_done: self.first_run_sell_done,
            },
            Position::Flat => Snapshot {
                holding: false,
                buy_price: 0.0,
                peak_price: 0.0,
                first_run_sell_done: self.first_run_sell_done,
            },
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_open(&self) -> bool {
        self.position.is_open()
    }

    pub fn first_run_sell_done(&self) -> bool {
        self.first_run_sell_done
    }

    pub fn mark_first_run_sell_done(&mut self) {
        self.first_run_sell_done = true;
    }

    /// FLAT -> OPEN at the realised fill price
    pub fn open(&mut self, fill_price: f64) -> anyhow::Result<()> {
        if self.position.is_open() {
            anyhow::bail!("Already have an open position");
        }
        if !fill_price.is_finite() || fill_price <= 0.0 {
            anyhow::bail!("Invalid fill price {}", fill_price);
        }

        self.position = Position::Open {
            entry_price: fill_price,
            peak_price: fill_price,
        };
        Ok(())
    }

    /// Record an observed price while OPEN
    ///
    /// Returns `true` only when the peak actually moved up.
    pub fn observe_price(&mut self, price: f64) -> bool {
        match &mut self.position {
            Position::Open { peak_price, .. } if price.is_finite() && price > *peak_price => {
                *peak_price = price;
                true
            }
            _ => false,
        }
    }

    /// OPEN -> FLAT after a filled sell
    ///
    /// Returns the closed position so callers can report on it.
    pub fn close(&mut self) -> anyhow::Result<Position> {
        if !self.position.is_open() {
            anyhow::bail!("No open position to close");
        }
        Ok(std::mem::replace(&mut self.position, Position::Flat))
    }

    /// Reset to FLAT without an order
    ///
    /// Used when the exchange contradicts the believed position (desync) and
    /// after a startup liquidation.
    pub fn force_flat(&mut self) -> Position {
        std::mem::replace(&mut self.position, Position::Flat)
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sets_entry_and_peak() {
        let mut pm = PositionManager::new();
        pm.open(101.25).unwrap();

        assert_eq!(
            pm.position(),
            Position::Open {
                entry_price: 101.25,
                peak_price: 101.25
            }
        );
    }

    #[test]
    fn test_cannot_open_twice() {
        let mut pm = PositionManager::new();
        pm.open(100.0).unwrap();
        assert!(pm.open(105.0).is_err());
        assert_eq!(pm.position().entry_price(), Some(100.0));
    }

    #[test]
    fn test_rejects_bad_fill_price() {
        let mut pm = PositionManager::new();
        assert!(pm.open(0.0).is_err());
        assert!(pm.open(f64::NAN).is_err());
        assert!(!pm.is_open());
    }

    #[test]
    fn test_peak_only_moves_up() {
        let mut pm = PositionManager::new();
        pm.open(100.0).unwrap();

        assert!(!pm.observe_price(99.0));
        assert!(!pm.observe_price(100.0));
        assert!(pm.observe_price(103.0));
        assert!(!pm.observe_price(101.0));
        assert_eq!(pm.position().peak_price(), Some(103.0));
    }

    #[test]
    fn test_peak_update_is_idempotent() {
        let mut pm = PositionManager::new();
        pm.open(100.0).unwrap();

        assert!(pm.observe_price(104.5));
        assert!(!pm.observe_price(104.5));
        assert_eq!(pm.position().peak_price(), Some(104.5));
    }

    #[test]
    fn test_observe_while_flat_is_noop() {
        let mut pm = PositionManager::new();
        assert!(!pm.observe_price(100.0));
        assert_eq!(pm.position(), Position::Flat);
    }

    #[test]
    fn test_close_resets() {
        let mut pm = PositionManager::new();
        pm.open(100.0).unwrap();
        pm.observe_price(110.0);

        let closed = pm.close().unwrap();
        assert_eq!(closed.peak_price(), Some(110.0));
        assert_eq!(pm.position(), Position::Flat);
        assert!(pm.close().is_err());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_flag() {
        let mut pm = PositionManager::new();
        pm.mark_first_run_sell_done();
        pm.open(50.0).unwrap();
        pm.observe_price(51.0);

        let restored = PositionManager::from_snapshot(&pm.snapshot());
        assert_eq!(restored.position(), pm.position());
        assert!(restored.first_run_sell_done());

        pm.force_flat();
        let snapshot = pm.snapshot();
        assert!(!snapshot.holding);
        assert_eq!(snapshot.buy_price, 0.0);
        assert_eq!(snapshot.peak_price, 0.0);
        assert!(snapshot.first_run_sell_done);
    }

    #[test]
    fn test_from_snapshot_sanitises() {
        let bad = Snapshot {
            holding: true,
            buy_price: 0.0,
            peak_price: 0.0,
            first_run_sell_done: true,
        };
        assert_eq!(PositionManager::from_snapshot(&bad).position(), Position::Flat);

        let low_peak = Snapshot {
            holding: true,
            buy_price: 100.0,
            peak_price: 0.0,
            first_run_sell_done: true,
        };
        assert_eq!(
            PositionManager::from_snapshot(&low_peak).position().peak_price(),
            Some(100.0)
        );
    }
}
