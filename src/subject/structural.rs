//! §4.5 Structural Change Processor: reacts to subjects being added to or removed
//! from the local graph after the initial load.

use std::sync::Arc;

use opcua::types::{
    AddNodesItem, AttributeId, ExpandedNodeId, NodeClass, NodeId, ObjectAttributes,
    ObjectTypeId, QualifiedName, ReferenceTypeId, StatusCode, WriteValue,
};

use super::model::{PropertyKind, Subject, SubjectId};
use super::registry::SubjectRegistry;
use crate::browse::browse_children;
use crate::codec::to_node_value;
use crate::recently_deleted::RecentlyDeletedRegistry;
use crate::subject::loader::SubjectLoader;
use crate::subscription::manager::SubscriptionManager;
use crate::wire::WireSession;

/// Drives subject add/remove reactions, per §4.5. `enable_remote_node_management`
/// gates the optional `AddNodes`/`DeleteNodes` path (the "two incompatible
/// structural-change-processor drafts" resolved by this switch, per §9).
pub struct StructuralChangeProcessor {
    registry: Arc<SubjectRegistry>,
    loader: Arc<SubjectLoader>,
    subscriptions: Arc<SubscriptionManager>,
    recently_deleted: Arc<RecentlyDeletedRegistry>,
    enable_remote_node_management: bool,
    warned_remote_unsupported: std::sync::atomic::AtomicBool,
}

impl StructuralChangeProcessor {
    pub fn new(
        registry: Arc<SubjectRegistry>,
        loader: Arc<SubjectLoader>,
        subscriptions: Arc<SubscriptionManager>,
        recently_deleted: Arc<RecentlyDeletedRegistry>,
        enable_remote_node_management: bool,
    ) -> Self {
        Self {
            registry,
            loader,
            subscriptions,
            recently_deleted,
            enable_remote_node_management,
            warned_remote_unsupported: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// A subject was added under `parent_node` as `browse_name` (§4.5 "on add").
    /// Shared subjects (already tracked elsewhere) just bump a reference count;
    /// otherwise the child is located (or, optionally, created remotely) and
    /// loaded.
    pub async fn on_subject_added(
        &self,
        subject_id: SubjectId,
        parent_node: &NodeId,
        browse_name: &str,
        subject: Arc<dyn Subject>,
        session: &dyn WireSession,
    ) {
        if self.registry.is_registered(subject_id) {
            self.registry.register(subject_id, parent_node.clone(), Vec::new());
            return;
        }

        if self.recently_deleted.was_recently_deleted(parent_node) {
            log::debug!("skipping resync of recently-deleted node {parent_node}");
            return;
        }

        let existing = browse_children(session, parent_node)
            .await
            .into_iter()
            .find(|child| child.browse_name == browse_name);

        let node_id = match existing {
            Some(child) => child.node_id,
            None if self.enable_remote_node_management => {
                match self.add_remote_node(parent_node, browse_name, session).await {
                    Some(node_id) => node_id,
                    None => return,
                }
            }
            None => {
                log::debug!("no server node found for new subject at {browse_name}, and remote node management is disabled");
                return;
            }
        };

        let items = self.loader.load(session, node_id.clone(), subject.clone()).await;
        self.registry.register(subject_id, node_id, items.clone());
        self.subscriptions.attach_batch(items, session).await;

        if self.enable_remote_node_management {
            self.write_initial_values(&subject, session).await;
        }
    }

    /// A subject was removed from the local graph (§4.5 "on remove"). Detaches its
    /// monitored items through the Subscription Manager — the sole owner of
    /// monitored-item state — and, if remote node management is enabled, deletes
    /// the server-side node.
    pub async fn on_subject_removed(&self, subject_id: SubjectId, session: &dyn WireSession) {
        let Some((node_id, items)) = self.registry.unregister(subject_id) else {
            return;
        };

        let properties: Vec<_> = items.into_iter().map(|item| item.property).collect();
        self.subscriptions
            .remove_items_for_properties(&properties, session)
            .await;
        self.recently_deleted.mark_deleted(node_id.clone());

        if self.enable_remote_node_management {
            let item = opcua::types::DeleteNodesItem {
                node_id,
                delete_target_references: true,
            };
            if let Err(status) = session.delete_nodes(&[item], true).await {
                log::debug!("remote DeleteNodes failed (best-effort): {status}");
            }
        }
    }

    async fn add_remote_node(
        &self,
        parent_node: &NodeId,
        browse_name: &str,
        session: &dyn WireSession,
    ) -> Option<NodeId> {
        let item = AddNodesItem {
            parent_node_id: ExpandedNodeId::from(parent_node.clone()),
            reference_type_id: ReferenceTypeId::HasComponent.into(),
            requested_new_node_id: ExpandedNodeId::null(),
            browse_name: QualifiedName::new(0, browse_name),
            node_class: NodeClass::Object,
            node_attributes: opcua::types::ExtensionObject::from_message(ObjectAttributes::default()),
            type_definition: ExpandedNodeId::from(NodeId::from(ObjectTypeId::BaseObjectType)),
        };

        match session.add_nodes(&[item]).await {
            Ok(results) => {
                let result = results.into_iter().next()?;
                if result.status_code.is_good() {
                    Some(result.added_node_id)
                } else if matches!(
                    result.status_code,
                    StatusCode::BadNotSupported | StatusCode::BadServiceUnsupported
                ) {
                    self.warn_remote_unsupported_once();
                    None
                } else {
                    log::debug!("AddNodes for {browse_name} failed: {}", result.status_code);
                    None
                }
            }
            Err(status) => {
                if matches!(status, StatusCode::BadNotSupported | StatusCode::BadServiceUnsupported) {
                    self.warn_remote_unsupported_once();
                } else {
                    log::debug!("AddNodes for {browse_name} failed: {status}");
                }
                None
            }
        }
    }

    fn warn_remote_unsupported_once(&self) {
        if !self.warned_remote_unsupported.swap(true, std::sync::atomic::Ordering::Relaxed) {
            log::warn!("server does not support AddNodes/DeleteNodes; falling back to value-only sync");
        }
    }

    async fn write_initial_values(&self, subject: &Arc<dyn Subject>, session: &dyn WireSession) {
        let mut writes = Vec::new();
        for property in subject.properties() {
            if !matches!(property.kind(), PropertyKind::Scalar(_) | PropertyKind::AttributeOf { .. }) {
                continue;
            }
            let Some(node_id) = property.opc_variable_key() else {
                continue;
            };
            let data_value = to_node_value(&property.current_value());
            writes.push(WriteValue {
                node_id,
                attribute_id: AttributeId::Value as u32,
                index_range: Default::default(),
                value: data_value,
            });
        }
        if !writes.is_empty() {
            if let Err(status) = session.write(&writes).await {
                log::debug!("initial value write for new remote node failed: {status}");
            }
        }
    }
}
