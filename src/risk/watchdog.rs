use std::time::Duration;
use tokio::time::Instant;

/// Liveness watchdog for the polling loop
///
/// Activity is recorded after each successful market-data fetch. `check` is
/// evaluated inline on every tick and asks for exactly one alert per
/// inactivity episode; the latch clears on the next recorded activity.
#[derive(Debug, Clone)]
pub struct Watchdog {
    threshold: Duration,
    last_activity: Instant,
    alert_sent: bool,
}

impl Watchdog {
    pub fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_activity: now,
            alert_sent: false,
        }
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.alert_sent = false;
    }

    /// Returns the inactive duration if an alert must be sent now
    pub fn check(&mut self, now: Instant) -> Option<Duration> {
        let inactive = now.saturating_duration_since(self.last_activity);

        if inactive >= self.threshold && !self.alert_sent {
            self.alert_sent = true;
            return Some(inactive);
        }

        None
    }

    pub fn alert_sent(&self) -> bool {
        self.alert_sent
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_quiet_before_threshold() {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(15 * MINUTE, start);

        assert_eq!(watchdog.check(start + 14 * MINUTE), None);
        assert!(!watchdog.alert_sent());
    }

    #[test]
    fn test_alerts_once_per_episode() {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(15 * MINUTE, start);

        assert_eq!(watchdog.check(start + 15 * MINUTE), Some(15 * MINUTE));
        assert_eq!(watchdog.check(start + 20 * MINUTE), None);
        assert_eq!(watchdog.check(start + 60 * MINUTE), None);
        assert!(watchdog.alert_sent());
    }

    #[test]
    fn test_activity_clears_latch() {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(15 * MINUTE, start);

        assert!(watchdog.check(start + 16 * MINUTE).is_some());

        watchdog.record_activity(start + 17 * MINUTE);
        assert!(!watchdog.alert_sent());
        assert_eq!(watchdog.check(start + 20 * MINUTE), None);

        // second episode
        assert_eq!(watchdog.check(start + 32 * MINUTE), Some(15 * MINUTE));
    }
}
