//! Backoff sequence and state machine shared by the Reconnect Driver (§4.1, §9).
//!
//! If the embedding wire stack offers its own `SessionReconnectHandler`-equivalent
//! (the real `opcua` crate does not expose one directly at this crate's trait
//! boundary), it is used via [`crate::wire::ReconnectDriver`] instead; this module
//! is the fallback described in §9: "a small state machine with states
//! `{Ready, Triggered, Reconnecting, Done}` and exponential backoff 5->10->20->40->60
//! seconds."

use std::time::Duration;

/// 5s -> 10s -> 20s -> 40s -> 60s cap, per §4.1/§9.
pub struct ExponentialBackoff {
    current: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            current: initial,
            cap,
        }
    }

    /// Advance to, and return, the next delay. The first call after construction
    /// returns `initial`.
    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self, initial: Duration) {
        self.current = initial;
    }
}

/// State of one in-flight reconnect attempt, per §9's design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No reconnect in progress; keep-alive failures may trigger one.
    Ready,
    /// A keep-alive failure has been observed and a reconnect has been handed off,
    /// but the driver has not started running yet.
    Triggered,
    /// The driver is actively retrying with backoff.
    Reconnecting,
    /// The driver has finished (successfully or not); `ReconnectionCompleted` has
    /// been published and the state machine returns to `Ready` on the next
    /// keep-alive.
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_matches_design() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(60));
        let seq: Vec<u64> = (0..6).map(|_| backoff.next().as_secs()).collect();
        assert_eq!(seq, vec![5, 10, 20, 40, 60, 60]);
    }
}
