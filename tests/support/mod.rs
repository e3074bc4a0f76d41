//! Shared fakes for the scenario tests: a `WireSession` over an in-memory node
//! table instead of a real server, and a minimal subject-graph implementation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opcua::types::{
    AddNodesItem, AddNodesResult, BrowseDescription, BrowseResult, DataValue, DeleteNodesItem,
    Identifier, MonitoredItemCreateResult, NodeId, ReadValueId, ReferenceDescription, StatusCode,
    TimestampsToReturn, Variant, WriteValue,
};
use opcua_subject_sync::error::CoreError;
use opcua_subject_sync::subject::model::{
    Property, PropertyKind, Subject, SubjectId, SubjectUpdater,
};
use opcua_subject_sync::value::{PropertyValue, TargetType};
use opcua_subject_sync::wire::{SubscriptionCreateOutcome, SubscriptionSpec, WireSession};
use parking_lot::Mutex;

pub fn node(id: u32) -> NodeId {
    NodeId::new(1, Identifier::Numeric(id))
}

#[derive(Clone)]
pub struct FakeChild {
    pub browse_name: &'static str,
    pub node_id: NodeId,
    pub is_variable: bool,
}

/// A fake `WireSession` over a fixed browse/value table, with a subscription id
/// counter and a record of what was written, so tests can assert on it.
pub struct FakeSession {
    children: HashMap<NodeId, Vec<FakeChild>>,
    values: Mutex<HashMap<NodeId, Variant>>,
    next_subscription_id: Mutex<u32>,
    pub writes: Mutex<Vec<WriteValue>>,
    pub write_fails_with: Mutex<Option<StatusCode>>,
    pub fail_node_ids: Mutex<Vec<NodeId>>,
    pub add_nodes_result: Mutex<Option<(NodeId, StatusCode)>>,
    pub added_nodes: Mutex<Vec<AddNodesItem>>,
    pub deleted_nodes: Mutex<Vec<DeleteNodesItem>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            values: Mutex::new(HashMap::new()),
            next_subscription_id: Mutex::new(1),
            writes: Mutex::new(Vec::new()),
            write_fails_with: Mutex::new(None),
            fail_node_ids: Mutex::new(Vec::new()),
            add_nodes_result: Mutex::new(None),
            added_nodes: Mutex::new(Vec::new()),
            deleted_nodes: Mutex::new(Vec::new()),
        }
    }

    /// Configure the result `add_nodes` hands back for every request in the next
    /// call, per §4.5 S5 (remote create).
    pub fn with_add_nodes_result(self, node_id: NodeId, status: StatusCode) -> Self {
        *self.add_nodes_result.lock() = Some((node_id, status));
        self
    }

    pub fn with_children(mut self, parent: NodeId, children: Vec<FakeChild>) -> Self {
        self.children.insert(parent, children);
        self
    }

    pub fn with_value(self, node_id: NodeId, value: Variant) -> Self {
        self.values.lock().insert(node_id, value);
        self
    }

    pub fn set_value(&self, node_id: NodeId, value: Variant) {
        self.values.lock().insert(node_id, value);
    }
}

#[async_trait]
impl WireSession for FakeSession {
    async fn browse(
        &self,
        nodes: &[BrowseDescription],
        _max_references_per_node: u32,
    ) -> Result<Vec<BrowseResult>, StatusCode> {
        let mut out = Vec::new();
        for description in nodes {
            let refs = self
                .children
                .get(&description.node_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|child| ReferenceDescription {
                    node_id: child.node_id.clone().into(),
                    browse_name: opcua::types::QualifiedName::new(0, child.browse_name),
                    node_class: if child.is_variable {
                        opcua::types::NodeClass::Variable
                    } else {
                        opcua::types::NodeClass::Object
                    },
                    ..Default::default()
                })
                .collect::<Vec<_>>();
            out.push(BrowseResult {
                status_code: StatusCode::Good,
                continuation_point: None,
                references: Some(refs),
            });
        }
        Ok(out)
    }

    async fn read(
        &self,
        nodes: &[ReadValueId],
        _timestamps_to_return: TimestampsToReturn,
    ) -> Result<Vec<DataValue>, StatusCode> {
        let values = self.values.lock();
        Ok(nodes
            .iter()
            .map(|node| {
                let bad = self.fail_node_ids.lock().contains(&node.node_id);
                if bad {
                    DataValue {
                        status: Some(StatusCode::BadNodeIdUnknown),
                        ..Default::default()
                    }
                } else {
                    DataValue {
                        value: values.get(&node.node_id).cloned(),
                        status: Some(StatusCode::Good),
                        source_timestamp: Some(opcua::types::DateTime::now()),
                        ..Default::default()
                    }
                }
            })
            .collect())
    }

    async fn write(&self, nodes: &[WriteValue]) -> Result<Vec<StatusCode>, StatusCode> {
        self.writes.lock().extend(nodes.iter().cloned());
        if let Some(status) = *self.write_fails_with.lock() {
            return Ok(nodes.iter().map(|_| status).collect());
        }
        Ok(nodes.iter().map(|_| StatusCode::Good).collect())
    }

    async fn add_nodes(
        &self,
        nodes: &[AddNodesItem],
    ) -> Result<Vec<AddNodesResult>, StatusCode> {
        self.added_nodes.lock().extend(nodes.iter().cloned());
        let configured = *self.add_nodes_result.lock();
        Ok(nodes
            .iter()
            .map(|_| match configured {
                Some((node_id, status)) => AddNodesResult {
                    status_code: status,
                    added_node_id: node_id.clone(),
                },
                None => AddNodesResult {
                    status_code: StatusCode::BadNodeIdUnknown,
                    added_node_id: NodeId::null(),
                },
            })
            .collect())
    }

    async fn delete_nodes(
        &self,
        nodes: &[DeleteNodesItem],
        _delete_target_references: bool,
    ) -> Result<Vec<StatusCode>, StatusCode> {
        self.deleted_nodes.lock().extend(nodes.iter().cloned());
        Ok(nodes.iter().map(|_| StatusCode::Good).collect())
    }

    async fn create_subscription_with_items(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<SubscriptionCreateOutcome, StatusCode> {
        let mut next = self.next_subscription_id.lock();
        let subscription_id = *next;
        *next += 1;

        let item_results = spec
            .items
            .iter()
            .map(|item| {
                let bad = self
                    .fail_node_ids
                    .lock()
                    .contains(&item.item_to_monitor.node_id);
                MonitoredItemCreateResult {
                    status_code: if bad {
                        StatusCode::BadNodeIdUnknown
                    } else {
                        StatusCode::Good
                    },
                    monitored_item_id: item.requested_parameters.client_handle,
                    revised_sampling_interval: 0.0,
                    revised_queue_size: 1,
                    filter_result: None,
                }
            })
            .collect();

        Ok(SubscriptionCreateOutcome {
            subscription_id,
            item_results,
        })
    }

    async fn apply_changes(&self, _subscription_id: u32) -> Result<(), StatusCode> {
        Ok(())
    }

    async fn delete_monitored_items(
        &self,
        _subscription_id: u32,
        item_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        Ok(item_ids.iter().map(|_| StatusCode::Good).collect())
    }

    async fn delete_subscription(&self, _subscription_id: u32) -> Result<(), StatusCode> {
        Ok(())
    }

    async fn transfer_subscriptions(
        &self,
        subscription_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        Ok(subscription_ids.iter().map(|_| StatusCode::Good).collect())
    }

    fn session_id(&self) -> NodeId {
        node(1)
    }

    async fn close(&self, _timeout: std::time::Duration) -> Result<(), StatusCode> {
        Ok(())
    }
}

/// A single scalar property on [`FakeSubject`].
pub struct FakeProperty {
    pub browse_name: String,
    pub target_type: TargetType,
    pub key: Mutex<Option<NodeId>>,
    pub value: Mutex<PropertyValue>,
}

impl FakeProperty {
    pub fn new(browse_name: impl Into<String>, target_type: TargetType, initial: Variant) -> Arc<Self> {
        Arc::new(Self {
            browse_name: browse_name.into(),
            value: Mutex::new(PropertyValue::new(target_type.clone(), initial)),
            target_type,
            key: Mutex::new(None),
        })
    }
}

impl Property for FakeProperty {
    fn browse_name(&self) -> String {
        self.browse_name.clone()
    }

    fn kind(&self) -> PropertyKind {
        PropertyKind::Scalar(self.target_type.clone())
    }

    fn opc_variable_key(&self) -> Option<NodeId> {
        self.key.lock().clone()
    }

    fn set_opc_variable_key(&self, node_id: NodeId) {
        *self.key.lock() = Some(node_id);
    }

    fn set_from_source(
        &self,
        _source_ts: DateTime<Utc>,
        _recv_ts: DateTime<Utc>,
        value: PropertyValue,
    ) -> Result<(), CoreError> {
        *self.value.lock() = value;
        Ok(())
    }

    fn current_value(&self) -> PropertyValue {
        self.value.lock().clone()
    }
}

/// A flat subject with a fixed set of properties, no nesting — enough for the
/// loader/subscription scenario tests.
pub struct FakeSubject {
    pub id: SubjectId,
    pub properties: Vec<Arc<FakeProperty>>,
}

impl Subject for FakeSubject {
    fn id(&self) -> SubjectId {
        self.id
    }

    fn properties(&self) -> Vec<Arc<dyn Property>> {
        self.properties
            .iter()
            .map(|p| p.clone() as Arc<dyn Property>)
            .collect()
    }

    fn referenced_subject(&self, _property: &Arc<dyn Property>) -> Option<Arc<dyn Subject>> {
        None
    }

    fn collection_items(&self, _property: &Arc<dyn Property>) -> Vec<Arc<dyn Subject>> {
        Vec::new()
    }

    fn dictionary_items(&self, _property: &Arc<dyn Property>) -> Vec<(String, Arc<dyn Subject>)> {
        Vec::new()
    }
}

pub struct FakePathProvider {
    pub properties: Vec<Arc<FakeProperty>>,
}

impl opcua_subject_sync::subject::model::SourcePathProvider for FakePathProvider {
    fn resolve(
        &self,
        _subject: &Arc<dyn Subject>,
        browse_name: &str,
    ) -> Option<Arc<dyn Property>> {
        self.properties
            .iter()
            .find(|p| p.browse_name == browse_name)
            .map(|p| p.clone() as Arc<dyn Property>)
    }

    fn add_dynamic_property(
        &self,
        _subject: &Arc<dyn Subject>,
        _browse_name: &str,
        _target_type: TargetType,
    ) -> Option<Arc<dyn Property>> {
        None
    }
}

pub struct FakeFactory;

impl opcua_subject_sync::subject::model::SubjectFactory for FakeFactory {
    fn create(&self, _type_hint: &str) -> Arc<dyn Subject> {
        Arc::new(FakeSubject {
            id: 0,
            properties: Vec::new(),
        })
    }
}

/// Applies batches synchronously and records every update, for assertions.
#[derive(Default)]
pub struct RecordingUpdater {
    pub applied: Mutex<Vec<(String, Variant)>>,
}

impl SubjectUpdater for RecordingUpdater {
    fn enqueue_or_apply(
        &self,
        batch: Vec<(Arc<dyn Property>, PropertyValue, DateTime<Utc>, DateTime<Utc>)>,
    ) {
        let mut applied = self.applied.lock();
        for (property, value, source_ts, recv_ts) in batch {
            let _ = property.set_from_source(source_ts, recv_ts, value.clone());
            applied.push((property.browse_name(), value.value));
        }
    }
}
