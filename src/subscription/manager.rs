//! §4.2 Subscription Manager: batching monitored items into subscriptions and
//! dispatching data-change notifications onto the object graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use opcua::types::{
    AttributeId, DataChangeFilter, MonitoredItemCreateRequest, MonitoringMode, MonitoringParameters,
    NodeId, ReadValueId,
};
use parking_lot::Mutex;

use crate::codec::to_property_value;
use crate::error::is_permanent_item_failure;
use crate::subject::model::{PropertyHandle, PropertyKind, SubjectUpdater};
use crate::value::PropertyValue;
use crate::wire::{SubscriptionCreateOutcome, SubscriptionSpec, WireSession};

/// One prepared monitored item: the server leaf to watch plus the local property it
/// feeds, handed to [`SubscriptionManager::attach_batch`] by the Subject Loader and
/// Structural Change Processor.
#[derive(Clone)]
pub struct MonitoredItemSpec {
    pub node_id: NodeId,
    pub property: PropertyHandle,
}

/// A live subscription: its server-assigned id, the client-handle -> property
/// bindings currently mapped onto it, and the last known bad status per client
/// handle, used by the [`super::health::HealthMonitor`] (§4.3).
pub struct SubscriptionHandle {
    pub subscription_id: u32,
    bindings: Mutex<HashMap<u32, PropertyHandle>>,
    item_status: Mutex<HashMap<u32, opcua::types::StatusCode>>,
}

impl SubscriptionHandle {
    fn binding_for(&self, client_handle: u32) -> Option<PropertyHandle> {
        self.bindings.lock().get(&client_handle).cloned()
    }

    fn unbind(&self, client_handle: u32) {
        self.bindings.lock().remove(&client_handle);
        self.item_status.lock().remove(&client_handle);
    }

    /// Record the status carried on a data-change notification for one client
    /// handle; a `Good` status clears any previously recorded failure (§4.3
    /// "Unhealthy" is defined in terms of the item's current status).
    pub fn record_item_status(&self, client_handle: u32, status: opcua::types::StatusCode) {
        if status.is_good() {
            self.item_status.lock().remove(&client_handle);
        } else {
            self.item_status.lock().insert(client_handle, status);
        }
    }

    /// Number of monitored items currently bound to this subscription, per §6
    /// `MonitoredItemCount`.
    pub fn item_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Count of bound items currently unhealthy and retryable, per §4.3.
    pub fn unhealthy_retryable_count(&self) -> usize {
        self.item_status
            .lock()
            .values()
            .filter(|status| !is_permanent_item_failure(**status))
            .count()
    }
}

/// Fires on every subscription's fast data-change callback. A real implementation
/// would plug in to the wire stack's publish loop (the teacher's
/// `OnSubscriptionNotification`); this crate's trait boundary (§6 SUPPLEMENT) keeps
/// that off-stage, so this sink exists only to satisfy
/// `create_subscription`'s callback parameter at the call site in
/// [`crate::wire::opcua_backend`] and does no dispatch itself — dispatch for data
/// already delivered through the wire stack's own channel happens in
/// [`SubscriptionManager::dispatch_batch`], called by whatever glue code owns that
/// channel.
#[derive(Default, Clone)]
pub struct SubscriptionNotificationSink;

impl SubscriptionNotificationSink {
    pub fn new() -> Self {
        Self
    }
}

struct PoolEntry(Vec<(PropertyHandle, PropertyValue, chrono::DateTime<Utc>, chrono::DateTime<Utc>)>);

/// Owns the current immutable list of subscriptions and dispatches data-change
/// batches onto the [`SubjectUpdater`], per §4.2.
pub struct SubscriptionManager {
    subscriptions: ArcSwap<Vec<Arc<SubscriptionHandle>>>,
    updater: Arc<dyn SubjectUpdater>,
    next_client_handle: AtomicU32,
    publishing_interval: Duration,
    lifetime_count: u32,
    max_keep_alive_count: u32,
    max_notifications_per_publish: u32,
    priority: u8,
    max_items_per_subscription: usize,
    buffer_pool: Mutex<Vec<PoolEntry>>,
}

impl SubscriptionManager {
    pub fn new(
        updater: Arc<dyn SubjectUpdater>,
        max_items_per_subscription: usize,
        publishing_interval: Duration,
    ) -> Self {
        Self {
            subscriptions: ArcSwap::from_pointee(Vec::new()),
            updater,
            next_client_handle: AtomicU32::new(1),
            publishing_interval,
            lifetime_count: 2400,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            priority: 0,
            max_items_per_subscription,
            buffer_pool: Mutex::new(Vec::new()),
        }
    }

    /// Lock-free snapshot of the current subscription list (§4.2 contract).
    pub fn subscriptions(&self) -> Arc<Vec<Arc<SubscriptionHandle>>> {
        self.subscriptions.load_full()
    }

    /// Partition `items` into batches of `max_items_per_subscription`, create one
    /// subscription per batch, and atomically swap in the extended subscription list.
    pub async fn attach_batch(
        &self,
        items: Vec<MonitoredItemSpec>,
        session: &dyn WireSession,
    ) -> Vec<Arc<SubscriptionHandle>> {
        let mut created = Vec::new();
        for chunk in items.chunks(self.max_items_per_subscription.max(1)) {
            if let Some(handle) = self.create_one_subscription(chunk, session).await {
                created.push(handle);
            }
        }

        if !created.is_empty() {
            let mut next: Vec<Arc<SubscriptionHandle>> = (*self.subscriptions.load_full()).clone();
            next.extend(created.iter().cloned());
            self.subscriptions.store(Arc::new(next));
        }

        created
    }

    async fn create_one_subscription(
        &self,
        chunk: &[MonitoredItemSpec],
        session: &dyn WireSession,
    ) -> Option<Arc<SubscriptionHandle>> {
        let mut client_handles = Vec::with_capacity(chunk.len());
        let mut requests = Vec::with_capacity(chunk.len());
        for spec in chunk {
            let client_handle = self.next_client_handle.fetch_add(1, Ordering::Relaxed);
            client_handles.push((client_handle, spec.property.clone()));
            requests.push(MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: spec.node_id.clone(),
                    attribute_id: AttributeId::Value as u32,
                    ..Default::default()
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle,
                    sampling_interval: -1.0,
                    filter: DataChangeFilter::default().into(),
                    queue_size: 1,
                    discard_oldest: true,
                },
            });
        }

        let spec = SubscriptionSpec {
            publishing_interval: self.publishing_interval,
            lifetime_count: self.lifetime_count,
            max_keep_alive_count: self.max_keep_alive_count,
            max_notifications_per_publish: self.max_notifications_per_publish,
            priority: self.priority,
            items: requests,
        };

        let SubscriptionCreateOutcome {
            subscription_id,
            item_results,
        } = match session.create_subscription_with_items(spec).await {
            Ok(outcome) => outcome,
            Err(status) => {
                log::warn!("failed to create subscription: {status}");
                return None;
            }
        };

        let mut bindings = HashMap::new();
        let mut bad_item_ids = Vec::new();
        for ((client_handle, property), result) in client_handles.into_iter().zip(item_results.iter())
        {
            if result.status_code.is_good() {
                bindings.insert(client_handle, property);
            } else {
                if result.monitored_item_id != 0 {
                    bad_item_ids.push(result.monitored_item_id);
                }
                if is_permanent_item_failure(result.status_code) {
                    log::debug!(
                        "monitored item for {} failed permanently: {}",
                        property.browse_name(),
                        result.status_code
                    );
                } else {
                    log::debug!(
                        "monitored item for {} not created: {}",
                        property.browse_name(),
                        result.status_code
                    );
                }
            }
        }

        if !bad_item_ids.is_empty() {
            let _ = session
                .delete_monitored_items(subscription_id, &bad_item_ids)
                .await;
        }
        let _ = session.apply_changes(subscription_id).await;

        if bindings.is_empty() {
            let _ = session.delete_subscription(subscription_id).await;
            return None;
        }

        Some(Arc::new(SubscriptionHandle {
            subscription_id,
            bindings: Mutex::new(bindings),
            item_status: Mutex::new(HashMap::new()),
        }))
    }

    /// After a reconnect transferred subscriptions to a new session, atomically
    /// replace the subscription list (§4.2 `adopt_transferred`). The server-side
    /// subscription identities are unchanged by a transfer, so bindings are kept
    /// as-is.
    pub fn adopt_transferred(&self, subscriptions: Vec<Arc<SubscriptionHandle>>) {
        self.subscriptions.store(Arc::new(subscriptions));
    }

    /// Detach every monitored item bound to a property under `subject_ids`,
    /// per §4.2 `remove_items_for_subject`.
    pub async fn remove_items_for_properties(
        &self,
        properties: &[PropertyHandle],
        session: &dyn WireSession,
    ) {
        let handles = self.subscriptions.load_full();
        for handle in handles.iter() {
            let mut client_handles_to_drop = Vec::new();
            {
                let bindings = handle.bindings.lock();
                for (client_handle, bound) in bindings.iter() {
                    if properties
                        .iter()
                        .any(|p| Arc::ptr_eq(p, bound))
                    {
                        client_handles_to_drop.push(*client_handle);
                    }
                }
            }
            if client_handles_to_drop.is_empty() {
                continue;
            }
            for client_handle in &client_handles_to_drop {
                handle.unbind(*client_handle);
            }
            let _ = session.apply_changes(handle.subscription_id).await;
        }
    }

    /// Dispatch one subscription's ordered batch of (client handle, data value) as
    /// carried on a `MonitoredItemNotification`, per §4.2's data-change steps 1-4.
    /// The embedded status on each `DataValue` is also fed to the bound
    /// [`SubscriptionHandle`] so the [`super::health::HealthMonitor`] can classify
    /// unhealthy items without a separate polling call (§4.3).
    pub fn dispatch_batch(
        &self,
        subscription_id: u32,
        notifications: Vec<(u32, opcua::types::DataValue)>,
    ) {
        let handles = self.subscriptions.load_full();
        let Some(handle) = handles.iter().find(|h| h.subscription_id == subscription_id) else {
            return;
        };

        let mut buffer = self.buffer_pool.lock().pop().unwrap_or_else(|| PoolEntry(Vec::new()));
        let recv_ts = Utc::now();

        for (client_handle, data_value) in notifications {
            let status = data_value.status.unwrap_or(opcua::types::StatusCode::Good);
            handle.record_item_status(client_handle, status);

            let Some(property) = handle.binding_for(client_handle) else {
                continue;
            };
            if !status.is_good() {
                continue;
            }
            let Some(wire_value) = data_value.value else {
                continue;
            };
            let target_type = match property.kind() {
                PropertyKind::Scalar(t) => t,
                PropertyKind::AttributeOf { target_type, .. } => target_type,
                _ => continue,
            };
            let source_ts = data_value
                .source_timestamp
                .map(crate::value::to_chrono)
                .unwrap_or(recv_ts);
            match to_property_value(&wire_value, &target_type) {
                Ok(converted) => {
                    buffer.0.push((property, converted, source_ts, recv_ts));
                }
                Err(status) => {
                    log::debug!("data-change codec error: {status}");
                }
            }
        }

        if !buffer.0.is_empty() {
            self.updater.enqueue_or_apply(std::mem::take(&mut buffer.0));
        }

        buffer.0.clear();
        self.buffer_pool.lock().push(buffer);
    }
}
