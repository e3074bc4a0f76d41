//! §4.4 Subject Loader: recursively walks a server subtree, binding or creating
//! local properties, and accumulates the monitored items to attach.

use std::sync::Arc;

use opcua::types::{AttributeId, DataTypeId, NodeId, ReadValueId, TimestampsToReturn, Variant};

use super::model::{PropertyHandle, PropertyKind, SourcePathProvider, Subject, SubjectFactory};
use crate::browse::browse_children;
use crate::subscription::manager::MonitoredItemSpec;
use crate::type_resolver::infer_variable_type;
use crate::value::TargetType;
use crate::wire::WireSession;

/// Recursively loads a server subtree onto a local subject tree, per §4.4. Does not
/// attach subscriptions itself; the accumulated [`MonitoredItemSpec`] batch is
/// handed to the Subscription Manager by the caller.
pub struct SubjectLoader {
    path_provider: Arc<dyn SourcePathProvider>,
    factory: Arc<dyn SubjectFactory>,
    should_add_dynamic_properties: bool,
}

impl SubjectLoader {
    pub fn new(
        path_provider: Arc<dyn SourcePathProvider>,
        factory: Arc<dyn SubjectFactory>,
        should_add_dynamic_properties: bool,
    ) -> Self {
        Self {
            path_provider,
            factory,
            should_add_dynamic_properties,
        }
    }

    pub async fn load(
        &self,
        session: &dyn WireSession,
        root_node: NodeId,
        root_subject: Arc<dyn Subject>,
    ) -> Vec<MonitoredItemSpec> {
        let mut items = Vec::new();
        self.load_into(session, &root_node, &root_subject, &mut items).await;
        items
    }

    fn load_into<'a>(
        &'a self,
        session: &'a dyn WireSession,
        node: &'a NodeId,
        subject: &'a Arc<dyn Subject>,
        items: &'a mut Vec<MonitoredItemSpec>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            for child in browse_children(session, node).await {
                let property = match self.path_provider.resolve(subject, &child.browse_name) {
                    Some(existing) => Some(existing),
                    None if self.should_add_dynamic_properties && child.is_variable => {
                        match self.infer_type_for_node(session, &child.node_id).await {
                            Some(target_type) => self.path_provider.add_dynamic_property(
                                subject,
                                &child.browse_name,
                                target_type,
                            ),
                            None => {
                                log::debug!(
                                    "could not infer a type for unannotated variable {}",
                                    child.browse_name
                                );
                                None
                            }
                        }
                    }
                    None => None,
                };
                let Some(property) = property else { continue };

                match property.kind() {
                    PropertyKind::SubjectReference => {
                        let nested = subject
                            .referenced_subject(&property)
                            .unwrap_or_else(|| self.factory.create(&child.browse_name));
                        self.load_into(session, &child.node_id, &nested, items).await;
                    }
                    PropertyKind::OrderedCollection => {
                        for element in browse_children(session, &child.node_id).await {
                            let item_subject = self.factory.create(&element.browse_name);
                            self.load_into(session, &element.node_id, &item_subject, items)
                                .await;
                        }
                    }
                    PropertyKind::KeyedDictionary => {
                        for entry in browse_children(session, &child.node_id).await {
                            let entry_subject = self.factory.create(&entry.browse_name);
                            self.load_into(session, &entry.node_id, &entry_subject, items)
                                .await;
                        }
                    }
                    PropertyKind::Scalar(_) | PropertyKind::AttributeOf { .. } => {
                        property.set_opc_variable_key(child.node_id.clone());
                        items.push(MonitoredItemSpec {
                            node_id: child.node_id.clone(),
                            property: property.clone(),
                        });
                    }
                }
            }
        })
    }

    /// Read `DataType` and `ValueRank` for a variable node and infer its target
    /// type, per §4.10. Used when adding a previously-unknown dynamic property.
    async fn infer_type_for_node(
        &self,
        session: &dyn WireSession,
        node_id: &NodeId,
    ) -> Option<TargetType> {
        let reads = [
            ReadValueId {
                node_id: node_id.clone(),
                attribute_id: AttributeId::DataType as u32,
                ..Default::default()
            },
            ReadValueId {
                node_id: node_id.clone(),
                attribute_id: AttributeId::ValueRank as u32,
                ..Default::default()
            },
        ];
        let values = session.read(&reads, TimestampsToReturn::Neither).await.ok()?;
        let [data_type_value, value_rank_value]: [opcua::types::DataValue; 2] =
            values.try_into().ok()?;

        let data_type_node = match data_type_value.value {
            Some(Variant::NodeId(ref n)) => n.as_ref().clone(),
            _ => return None,
        };
        let data_type: DataTypeId = data_type_node.try_into().ok()?;
        let value_rank = match value_rank_value.value {
            Some(Variant::Int32(rank)) => rank,
            _ => -1,
        };
        infer_variable_type(data_type, value_rank)
    }
}
