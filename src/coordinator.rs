use std::time::{Duration, Instant};

use tracing::info;

/// Throttling and single-flight state for remote refreshes.
///
/// A forced refresh relays an SMS to the physical unit, so the rate at
/// which the host asks for updates must be decoupled from the rate at
/// which we actually go to the network. This ledger is the only place
/// that decision is made. The in-flight flag guards against reentrant
/// calls (a slow poll still running when the next tick fires); the client
/// owning this ledger serializes true concurrency through `&mut self`.
#[derive(Debug, Default)]
pub(crate) struct RefreshLedger {
    in_progress: bool,
    last_attempt: Option<Instant>,
    last_complete: Option<Instant>,
}

impl RefreshLedger {
    /// Decide whether a refresh may run now. Records the attempt either
    /// way. `force` bypasses the throttle window but never the in-flight
    /// guard.
    pub fn begin(&mut self, now: Instant, force: bool, interval: Duration) -> bool {
        self.last_attempt = Some(now);

        if self.in_progress {
            info!("refresh already in progress, skipping");
            return false;
        }

        if !force
            && let Some(done) = self.last_complete
        {
            let since = now.duration_since(done);
            if since < interval {
                info!(
                    elapsed_secs = since.as_secs(),
                    interval_secs = interval.as_secs(),
                    "still within refresh interval, not fetching new data"
                );
                return false;
            }
        }

        self.in_progress = true;
        true
    }

    /// Mark the in-flight refresh finished. The completion timestamp is
    /// only recorded when the poll actually delivered fresh state.
    pub fn finish(&mut self, success: bool, now: Instant) {
        self.in_progress = false;
        if success {
            self.last_complete = Some(now);
        }
    }

    pub fn last_complete(&self) -> Option<Instant> {
        self.last_complete
    }

    /// Forget all history, e.g. after reconfiguration: the next update
    /// request goes straight through.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const INTERVAL: Duration = Duration::from_secs(12 * 3600);

    #[test]
    fn first_refresh_goes_through() {
        let mut ledger = RefreshLedger::default();
        assert!(ledger.begin(Instant::now(), false, INTERVAL));
    }

    #[test]
    fn reentrant_call_is_refused() {
        let mut ledger = RefreshLedger::default();
        let t0 = Instant::now();
        assert!(ledger.begin(t0, false, INTERVAL));
        assert!(!ledger.begin(t0, false, INTERVAL));
        // Forcing does not bypass the in-flight guard.
        assert!(!ledger.begin(t0, true, INTERVAL));
        ledger.finish(true, t0);
    }

    #[test]
    fn throttle_window_measured_from_completion() {
        let mut ledger = RefreshLedger::default();
        let t0 = Instant::now();
        assert!(ledger.begin(t0, false, INTERVAL));
        ledger.finish(true, t0);

        assert!(!ledger.begin(t0 + HOUR, false, INTERVAL));
        assert!(ledger.begin(t0 + 13 * HOUR, false, INTERVAL));
        ledger.finish(true, t0 + 13 * HOUR);
    }

    #[test]
    fn force_bypasses_throttle() {
        let mut ledger = RefreshLedger::default();
        let t0 = Instant::now();
        assert!(ledger.begin(t0, false, INTERVAL));
        ledger.finish(true, t0);

        assert!(ledger.begin(t0 + HOUR, true, INTERVAL));
        ledger.finish(true, t0 + HOUR);
    }

    #[test]
    fn failed_refresh_does_not_start_throttle_window() {
        let mut ledger = RefreshLedger::default();
        let t0 = Instant::now();
        assert!(ledger.begin(t0, false, INTERVAL));
        ledger.finish(false, t0);
        assert!(ledger.last_complete().is_none());

        // Next non-forced attempt is allowed immediately.
        assert!(ledger.begin(t0 + Duration::from_secs(1), false, INTERVAL));
    }

    #[test]
    fn reset_clears_history() {
        let mut ledger = RefreshLedger::default();
        let t0 = Instant::now();
        assert!(ledger.begin(t0, false, INTERVAL));
        ledger.finish(true, t0);
        ledger.reset();
        assert!(ledger.last_complete().is_none());
        assert!(ledger.begin(t0 + Duration::from_secs(1), false, INTERVAL));
    }
}
