//! The narrow boundary this crate needs from an OPC UA wire stack.
//!
//! Per §1/§6 of the design, secure-channel negotiation, binary encoding and the raw
//! service calls are an external collaborator. [`WireClient`] and [`WireSession`]
//! describe exactly the operations the core drives; [`opcua_backend`] is the one
//! production implementation, built on the real `opcua` crate (`features = ["client"]`).

pub mod opcua_backend;

use std::time::Duration;

use async_trait::async_trait;
use opcua::types::{
    AddNodesItem, BrowseDescription, BrowseResult, DataValue, DeleteNodesItem,
    EndpointDescription, MonitoredItemCreateRequest, MonitoredItemCreateResult, NodeId,
    StatusCode, TimestampsToReturn, WriteValue,
};

/// A prepared request to create one subscription's worth of monitored items.
pub struct SubscriptionSpec {
    pub publishing_interval: Duration,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
    pub items: Vec<MonitoredItemCreateRequest>,
}

/// Outcome of creating one subscription and its monitored items.
pub struct SubscriptionCreateOutcome {
    pub subscription_id: u32,
    pub item_results: Vec<MonitoredItemCreateResult>,
}

/// A single live OPC UA session, narrowed to the services the core needs.
///
/// Implementors must be cheap to clone/share (the real backend wraps
/// `Arc<opcua::client::Session>`) since the core holds a session behind an
/// atomic slot (§5) and many components read it concurrently.
#[async_trait]
pub trait WireSession: Send + Sync {
    /// Forward browse, see §4.9.
    async fn browse(
        &self,
        nodes: &[BrowseDescription],
        max_references_per_node: u32,
    ) -> Result<Vec<BrowseResult>, StatusCode>;

    /// Attribute read, see §4.7 initial read and §4.8.
    async fn read(
        &self,
        nodes: &[opcua::types::ReadValueId],
        timestamps_to_return: TimestampsToReturn,
    ) -> Result<Vec<DataValue>, StatusCode>;

    /// Attribute write, see §4.7 write path.
    async fn write(&self, nodes: &[WriteValue]) -> Result<Vec<StatusCode>, StatusCode>;

    /// §4.5 remote node management.
    async fn add_nodes(
        &self,
        nodes: &[AddNodesItem],
    ) -> Result<Vec<opcua::types::AddNodesResult>, StatusCode>;

    /// §4.5 remote node management.
    async fn delete_nodes(
        &self,
        nodes: &[DeleteNodesItem],
        delete_target_references: bool,
    ) -> Result<Vec<StatusCode>, StatusCode>;

    /// Create one subscription and attempt to create all its monitored items in one
    /// batch, per §4.2.
    async fn create_subscription_with_items(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<SubscriptionCreateOutcome, StatusCode>;

    /// Re-apply pending monitored item changes on an existing subscription (§4.3).
    async fn apply_changes(&self, subscription_id: u32) -> Result<(), StatusCode>;

    /// Remove monitored items from a subscription, per §4.2/§4.5.
    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        item_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode>;

    /// Remove a whole subscription, used when a reconnect could not transfer it.
    async fn delete_subscription(&self, subscription_id: u32) -> Result<(), StatusCode>;

    /// Attempt to transfer all subscriptions on this session handle to a new session
    /// that the stack just established (reconnect). See §4.1.
    async fn transfer_subscriptions(
        &self,
        subscription_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode>;

    /// Server-assigned session id, for diagnostics.
    fn session_id(&self) -> NodeId;

    /// Close the session with a bounded timeout. Best-effort (§7).
    async fn close(&self, timeout: Duration) -> Result<(), StatusCode>;
}

/// Produces and re-produces [`WireSession`]s, standing in for the real
/// `opcua::client::Client`.
#[async_trait]
pub trait WireClient: Send + Sync {
    async fn get_server_endpoints(
        &self,
        server_url: &str,
    ) -> Result<Vec<EndpointDescription>, StatusCode>;

    async fn create_session(
        &self,
        endpoint: &EndpointDescription,
        session_timeout: Duration,
    ) -> Result<std::sync::Arc<dyn WireSession>, StatusCode>;
}

/// A stack-provided (or default, see [`crate::wire::opcua_backend::DefaultReconnectDriver`])
/// cooperative reconnect driver, per §4.1/§9.
#[async_trait]
pub trait ReconnectDriver: Send + Sync {
    /// Attempt to recover the connection. Returns `Some(session)` on success — either
    /// the same session with the transport recovered, or a new session with
    /// subscriptions transferred by the stack — or `None` if recovery failed entirely.
    async fn run(
        &self,
        old_session: std::sync::Arc<dyn WireSession>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Option<std::sync::Arc<dyn WireSession>>;
}
