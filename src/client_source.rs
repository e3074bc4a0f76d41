//! §4.7 Client Source — the root orchestrator tying the Session Manager,
//! Subscription Manager, Health Monitor, Subject Loader and Write Queue together
//! into the reconnect-forever lifecycle loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use opcua::types::{
    AttributeId, NodeId, ObjectId, ReadValueId, TimestampsToReturn,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::to_property_value;
use crate::config::ClientCoreConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsRegistry};
use crate::error::{classify_write_status, CoreError, FailureClass};
use crate::session::manager::{SessionChangeEvent, SessionManager};
use crate::subject::model::{PropertyHandle, PropertyKind, Subject, SubjectUpdater};
use crate::subject::SubjectLoader;
use crate::subscription::health::HealthMonitor;
use crate::subscription::manager::SubscriptionManager;
use crate::value::PropertyValue;
use crate::wire::WireSession;
use crate::write_queue::WriteQueue;

/// Background task driving the session lifecycle loop described in §4.7.
pub struct ClientSource {
    config: ClientCoreConfig,
    session_manager: Arc<SessionManager>,
    subscriptions: Arc<SubscriptionManager>,
    diagnostics: Arc<DiagnosticsRegistry>,
    write_queue: Arc<WriteQueue>,
    write_flush: Semaphore,
    loader: Arc<SubjectLoader>,
    updater: Arc<dyn SubjectUpdater>,
    root_subject: Arc<dyn Subject>,
    cancel: CancellationToken,
    health_shutdown: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ClientCoreConfig,
        session_manager: Arc<SessionManager>,
        subscriptions: Arc<SubscriptionManager>,
        diagnostics: Arc<DiagnosticsRegistry>,
        write_queue: Arc<WriteQueue>,
        loader: Arc<SubjectLoader>,
        updater: Arc<dyn SubjectUpdater>,
        root_subject: Arc<dyn Subject>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session_manager,
            subscriptions,
            diagnostics,
            write_queue,
            write_flush: Semaphore::new(1),
            loader,
            updater,
            root_subject,
            cancel: CancellationToken::new(),
            health_shutdown: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.snapshot()
    }

    /// Spawn the reconnect-forever loop as its own task (§5 SUPPLEMENT: task
    /// handles), storing the handle so [`ClientSource::shutdown`] can join it.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        self.tasks.lock().push(handle);
    }

    async fn run(self: Arc<Self>) {
        while !self.cancel.is_cancelled() {
            let session = match self
                .session_manager
                .create_session(&self.config.server_url, self.config.session_timeout)
                .await
            {
                Ok(session) => session,
                Err(err) => {
                    log::warn!("create_session failed, retrying: {err}");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.reconnect_delay) => continue,
                        _ = self.cancel.cancelled() => break,
                    }
                }
            };

            self.serve_session(session).await;
        }
    }

    /// Serve one session generation: load subjects, attach subscriptions, spawn
    /// the Health Monitor, flush pending writes, then wait for the next session
    /// lifecycle event. A session replacement (`is_new`, e.g. the Reconnect
    /// Driver handed back a brand new session rather than recovering the old
    /// one's transport) re-enters this same routine on the new session rather
    /// than unwinding to `run`'s `create_session` path, which would otherwise
    /// open a second, redundant session.
    fn serve_session<'a>(
        self: &'a Arc<Self>,
        session: Arc<dyn WireSession>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let root_node = self.resolve_root_node(session.as_ref()).await;

            let items = self
                .loader
                .load(session.as_ref(), root_node, self.root_subject.clone())
                .await;

            self.read_initial_values(session.as_ref(), &items).await;

            self.subscriptions.attach_batch(items, session.as_ref()).await;
            let current_subscriptions = self.subscriptions.subscriptions();
            self.diagnostics.set_subscription_counts(
                current_subscriptions.len() as u32,
                current_subscriptions
                    .iter()
                    .map(|s| s.item_count() as u32)
                    .sum(),
            );

            let health_monitor = HealthMonitor::new(
                Arc::clone(&self.subscriptions),
                self.config.subscription_health_check_interval,
            );
            self.health_shutdown.store(false, Ordering::Relaxed);
            let health_shutdown_flag = health_monitor.shutdown_flag();
            let generation = self.session_manager.generation();
            let health_session = session.clone();
            let health_handle = tokio::spawn(async move {
                health_monitor.run(generation, health_session).await;
            });
            self.tasks.lock().push(health_handle);

            self.flush_write_queue(session.as_ref()).await;

            let mut events = self.session_manager.subscribe();
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        health_shutdown_flag.store(true, Ordering::Relaxed);
                        return;
                    }
                    event = events.recv() => {
                        match event {
                            Ok(SessionChangeEvent::SessionChanged { session: None, .. }) => {
                                health_shutdown_flag.store(true, Ordering::Relaxed);
                                return;
                            }
                            Ok(SessionChangeEvent::SessionChanged { session: Some(new_session), is_new, .. }) => {
                                if is_new {
                                    health_shutdown_flag.store(true, Ordering::Relaxed);
                                    return self.serve_session(new_session).await;
                                }
                            }
                            Ok(_) => continue,
                            Err(_) => continue,
                        }
                    }
                }
            }
        })
    }

    async fn resolve_root_node(&self, session: &dyn WireSession) -> NodeId {
        let objects_folder = NodeId::from(ObjectId::ObjectsFolder);
        let Some(root_name) = &self.config.root_name else {
            return objects_folder;
        };
        let children = crate::browse::browse_children(session, &objects_folder).await;
        children
            .into_iter()
            .find(|child| &child.browse_name == root_name)
            .map(|child| child.node_id)
            .unwrap_or(objects_folder)
    }

    async fn read_initial_values(
        &self,
        session: &dyn WireSession,
        items: &[crate::subscription::manager::MonitoredItemSpec],
    ) {
        if items.is_empty() {
            return;
        }
        let reads: Vec<ReadValueId> = items
            .iter()
            .map(|item| ReadValueId {
                node_id: item.node_id.clone(),
                attribute_id: AttributeId::Value as u32,
                ..Default::default()
            })
            .collect();

        let values = match session.read(&reads, TimestampsToReturn::Source).await {
            Ok(values) => values,
            Err(status) => {
                log::warn!("initial read failed: {status}");
                return;
            }
        };

        let recv_ts = Utc::now();
        let mut batch = Vec::with_capacity(items.len());
        for (item, data_value) in items.iter().zip(values.into_iter()) {
            let Some(status) = data_value.status else { continue };
            if !status.is_good() {
                continue;
            }
            let Some(wire_value) = data_value.value else { continue };
            let target_type = match item.property.kind() {
                PropertyKind::Scalar(t) => t,
                PropertyKind::AttributeOf { target_type, .. } => target_type,
                _ => continue,
            };
            if let Ok(converted) = to_property_value(&wire_value, &target_type) {
                let source_ts = data_value.source_timestamp.map(crate::value::to_chrono).unwrap_or(recv_ts);
                batch.push((item.property.clone(), converted, source_ts, recv_ts));
            }
        }
        if !batch.is_empty() {
            self.updater.enqueue_or_apply(batch);
        }
    }

    /// §4.7 write path: `write_to_source(changes)`.
    pub async fn write_to_source(
        &self,
        changes: Vec<(PropertyHandle, PropertyValue)>,
    ) -> Result<(), CoreError> {
        let Some(session) = self.session_manager.current() else {
            self.enqueue(changes);
            return Ok(());
        };

        let _permit = self.write_flush.acquire().await.expect("semaphore not closed");

        let now = Utc::now();
        let mut all_changes = self.write_queue.dequeue_all();
        all_changes.extend(changes.into_iter().map(|(property, value)| {
            crate::write_queue::WriteQueueEntry {
                property,
                value,
                source_timestamp: now,
            }
        }));

        self.flush_entries(session.as_ref(), all_changes).await
    }

    async fn flush_write_queue(&self, session: &dyn WireSession) {
        let _permit = self.write_flush.acquire().await.expect("semaphore not closed");
        let queued = self.write_queue.dequeue_all();
        if queued.is_empty() {
            return;
        }
        let _ = self.flush_entries(session, queued).await;
    }

    async fn flush_entries(
        &self,
        session: &dyn WireSession,
        entries: Vec<crate::write_queue::WriteQueueEntry>,
    ) -> Result<(), CoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let writes: Vec<opcua::types::WriteValue> = entries
            .iter()
            .filter_map(|entry| {
                entry.property.opc_variable_key().map(|node_id| opcua::types::WriteValue {
                    node_id,
                    attribute_id: AttributeId::Value as u32,
                    index_range: Default::default(),
                    value: crate::codec::to_node_value(&entry.value),
                })
            })
            .collect();

        let results = match session.write(&writes).await {
            Ok(results) => results,
            Err(_) => {
                // Whole-request failure: treat every entry as transient and re-enqueue.
                let total = entries.len();
                self.write_queue.enqueue_batch(entries);
                self.diagnostics
                    .set_write_counts(self.write_queue.pending_count() as u32, self.write_queue.dropped_count() as u32);
                return Err(CoreError::Write {
                    transient: total,
                    permanent: 0,
                    total,
                });
            }
        };

        let mut transient_entries = Vec::new();
        let mut permanent = 0usize;
        for (entry, status) in entries.into_iter().zip(results.into_iter()) {
            if status.is_good() {
                continue;
            }
            match classify_write_status(status) {
                FailureClass::Transient => transient_entries.push(entry),
                FailureClass::Permanent => permanent += 1,
            }
        }

        let transient = transient_entries.len();
        let total = transient + permanent;
        if !transient_entries.is_empty() {
            self.write_queue.enqueue_batch(transient_entries);
        }
        self.diagnostics
            .set_write_counts(self.write_queue.pending_count() as u32, self.write_queue.dropped_count() as u32);

        if total == 0 {
            Ok(())
        } else {
            Err(CoreError::Write {
                transient,
                permanent,
                total,
            })
        }
    }

    fn enqueue(&self, changes: Vec<(PropertyHandle, PropertyValue)>) {
        let now = Utc::now();
        let entries = changes
            .into_iter()
            .map(|(property, value)| crate::write_queue::WriteQueueEntry {
                property,
                value,
                source_timestamp: now,
            })
            .collect();
        self.write_queue.enqueue_batch(entries);
        self.diagnostics
            .set_write_counts(self.write_queue.pending_count() as u32, self.write_queue.dropped_count() as u32);
    }

    /// Cancel the shared token, stop the Health Monitor loop, and await all
    /// spawned tasks bounded by `session_disposal_timeout` (§5 SUPPLEMENT).
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.health_shutdown.store(true, Ordering::Relaxed);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            let _ = tokio::time::timeout(self.config.session_disposal_timeout, handle).await;
        }

        self.session_manager.close().await;
    }
}
