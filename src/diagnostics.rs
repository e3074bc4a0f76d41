//! §6 Diagnostics surface — a read-only snapshot of counters and flags.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use opcua::types::NodeId;
use parking_lot::Mutex;

/// Point-in-time snapshot returned by [`DiagnosticsRegistry::snapshot`].
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    pub session_id: Option<NodeId>,
    pub subscription_count: u32,
    pub monitored_item_count: u32,
    pub total_reconnection_attempts: u64,
    pub successful_reconnections: u64,
    pub failed_reconnections: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub pending_write_count: u32,
    pub dropped_write_count: u32,
}

/// Live counters backing the [`Diagnostics`] snapshot. Every field is either an
/// atomic or behind a small lock so readers never block on, or observe, a
/// mid-mutation state from the components that update them.
#[derive(Default)]
pub struct DiagnosticsRegistry {
    is_connected: AtomicBool,
    is_reconnecting: AtomicBool,
    session_id: Mutex<Option<NodeId>>,
    subscription_count: AtomicU32,
    monitored_item_count: AtomicU32,
    total_reconnection_attempts: AtomicU64,
    successful_reconnections: AtomicU64,
    failed_reconnections: AtomicU64,
    last_connected_at: Mutex<Option<DateTime<Utc>>>,
    pending_write_count: AtomicU32,
    dropped_write_count: AtomicU32,
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, session_id: Option<NodeId>) {
        self.is_connected.store(true, Ordering::Relaxed);
        self.is_reconnecting.store(false, Ordering::Relaxed);
        *self.session_id.lock() = session_id;
        *self.last_connected_at.lock() = Some(Utc::now());
    }

    pub fn set_disconnected(&self) {
        self.is_connected.store(false, Ordering::Relaxed);
        *self.session_id.lock() = None;
    }

    pub fn set_reconnecting(&self, reconnecting: bool) {
        self.is_reconnecting.store(reconnecting, Ordering::Relaxed);
    }

    pub fn record_reconnection_attempt(&self) {
        self.total_reconnection_attempts
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection_success(&self) {
        self.successful_reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection_failure(&self) {
        self.failed_reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_subscription_counts(&self, subscriptions: u32, monitored_items: u32) {
        self.subscription_count.store(subscriptions, Ordering::Relaxed);
        self.monitored_item_count
            .store(monitored_items, Ordering::Relaxed);
    }

    pub fn set_write_counts(&self, pending: u32, dropped: u32) {
        self.pending_write_count.store(pending, Ordering::Relaxed);
        self.dropped_write_count.store(dropped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            is_connected: self.is_connected.load(Ordering::Relaxed),
            is_reconnecting: self.is_reconnecting.load(Ordering::Relaxed),
            session_id: self.session_id.lock().clone(),
            subscription_count: self.subscription_count.load(Ordering::Relaxed),
            monitored_item_count: self.monitored_item_count.load(Ordering::Relaxed),
            total_reconnection_attempts: self.total_reconnection_attempts.load(Ordering::Relaxed),
            successful_reconnections: self.successful_reconnections.load(Ordering::Relaxed),
            failed_reconnections: self.failed_reconnections.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.lock(),
            pending_write_count: self.pending_write_count.load(Ordering::Relaxed),
            dropped_write_count: self.dropped_write_count.load(Ordering::Relaxed),
        }
    }
}
