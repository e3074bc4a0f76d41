//! §4.3 Health Monitor: a periodic sweep that nudges unhealthy-but-retryable
//! monitored items back towards `Good` without waiting for the next reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::manager::SubscriptionManager;
use crate::session::{source_debug, source_warn};
use crate::wire::WireSession;

/// Periodic health sweep over all subscriptions owned by a [`SubscriptionManager`].
/// One instance is spawned per live session generation by the Client Source (§4.7);
/// `shutdown()` is observed between ticks and never interrupts an in-flight
/// `apply_changes` call.
pub struct HealthMonitor {
    subscriptions: Arc<SubscriptionManager>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(subscriptions: Arc<SubscriptionManager>, interval: Duration) -> Self {
        Self {
            subscriptions,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run the periodic sweep until `shutdown` is observed. Intended to be spawned
    /// as its own task and joined by the Client Source on shutdown (§5 SUPPLEMENT).
    pub async fn run(&self, session_gen: u64, session: Arc<dyn WireSession>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            self.tick(session_gen, session.as_ref()).await;
        }
    }

    /// Run one sweep immediately, without waiting for the next tick. Exposed so
    /// callers (and tests) can force a check outside the periodic `run` loop.
    pub async fn tick(&self, session_gen: u64, session: &dyn WireSession) {
        for handle in self.subscriptions.subscriptions().iter() {
            let before = handle.unhealthy_retryable_count();
            if before == 0 {
                continue;
            }
            if let Err(status) = session.apply_changes(handle.subscription_id).await {
                source_warn!(
                    session_gen,
                    "apply_changes failed for subscription {}: {status}",
                    handle.subscription_id
                );
                continue;
            }
            let after = handle.unhealthy_retryable_count();
            if after == 0 {
                source_debug!(
                    session_gen,
                    "subscription {} fully healed ({before} item(s) recovered)",
                    handle.subscription_id
                );
            } else {
                source_debug!(
                    session_gen,
                    "subscription {} partially healed ({} of {before} item(s) recovered)",
                    handle.subscription_id,
                    before - after
                );
            }
        }
    }
}
