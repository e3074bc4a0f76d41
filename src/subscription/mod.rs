//! §4.2 Subscription Manager and §4.3 Health Monitor.

pub mod health;
pub mod manager;

pub use health::HealthMonitor;
pub use manager::{
    MonitoredItemSpec, SubscriptionHandle, SubscriptionManager, SubscriptionNotificationSink,
};
