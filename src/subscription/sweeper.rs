use crate::clock::SharedClock;
use crate::subscription::SubscriptionRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Background eviction of subscriptions past their deadline
pub struct ExpirationSweeper {
    registry: Arc<SubscriptionRegistry>,
    clock: SharedClock,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(registry: Arc<SubscriptionRegistry>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            registry,
            clock,
            interval,
        }
    }

    /// One sweep; returns how many subscriptions were removed.
    ///
    /// Candidates are read under a shared lock, and each removal takes the
    /// write lock for that entry alone after re-checking its deadline.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let removed = self
            .registry
            .expiration_candidates()
            .into_iter()
            .filter(|(_, deadline)| *deadline <= now)
            .filter(|(id, _)| self.registry.remove_if_expired(id, now))
            .count();

        if removed > 0 {
            info!(removed = removed, remaining = self.registry.len(), "Expired subscriptions swept");
        }
        removed
    }

    /// Sweep every interval until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting expiration sweeper");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(self.clock.now());
                }
            }
        }

        debug!("Expiration sweeper stopped");
    }
}
