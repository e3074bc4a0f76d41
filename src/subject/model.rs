//! The narrow interface this crate needs from the object-graph / property-tracking
//! substrate (§1: explicitly an external collaborator). Property metadata, change
//! events and parent/child relationships all live on the other side of these traits;
//! the core only needs to walk, read and write through them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opcua::types::NodeId;

use crate::error::CoreError;
use crate::value::{PropertyValue, TargetType};

/// Stable identity for a [`Subject`] within the embedding object graph, independent
/// of any particular server NodeId (a subject may be unbound, or rebound across
/// reconnects). Assigned by the embedding substrate.
pub type SubjectId = u64;

/// Opaque reference to a [`Property`], cheap to copy and hash — this is the payload
/// carried on a [`crate::subscription::manager::MonitoredItemSpec`] handle (§3).
pub type PropertyHandle = Arc<dyn Property>;

/// What a property on a [`Subject`] models, per §4.4.
pub enum PropertyKind {
    /// A leaf attribute whose `Value` is monitored directly.
    Scalar(TargetType),
    /// A reference to one nested [`Subject`].
    SubjectReference,
    /// An ordered collection of nested subjects, indexed `prop[index]` in browse
    /// names (§4.5).
    OrderedCollection,
    /// A keyed dictionary of nested subjects, browsed by key (§4.4 step 5).
    KeyedDictionary,
    /// An attribute of another property on the same subject; composes its browse
    /// name as `{parent_property}__{attribute_segment}` (§4.4). Still a scalar leaf
    /// on the wire, hence the same `TargetType` payload as [`PropertyKind::Scalar`].
    AttributeOf {
        parent_property: String,
        attribute_segment: String,
        target_type: TargetType,
    },
}

/// A property on a [`Subject`], standing in for a tracked field of the local object
/// graph.
pub trait Property: Send + Sync {
    /// Browse name this property corresponds to on the server.
    fn browse_name(&self) -> String;

    fn kind(&self) -> PropertyKind;

    /// The server NodeId previously stashed via [`Property::set_opc_variable_key`],
    /// or `None` if this property has not yet been bound to a server leaf.
    fn opc_variable_key(&self) -> Option<NodeId>;

    /// Stash the server NodeId for this leaf in the property's auxiliary storage
    /// slot (§6), keyed by `OpcVariableKey`.
    fn set_opc_variable_key(&self, node_id: NodeId);

    /// Apply a server-pushed value. Implementations are expected to be fast and
    /// infallible in the common case; errors are logged and skipped by the caller
    /// (§4.2 step 3), never propagated further.
    fn set_from_source(
        &self,
        source_ts: DateTime<Utc>,
        recv_ts: DateTime<Utc>,
        value: PropertyValue,
    ) -> Result<(), CoreError>;

    /// Current local value, used when flushing a write to the server (§4.7).
    fn current_value(&self) -> PropertyValue;
}

/// A tracked object in the in-process graph (§3 "Local Subject"). May be nested via
/// references, ordered collections or keyed dictionaries.
pub trait Subject: Send + Sync {
    fn id(&self) -> SubjectId;

    /// All properties declared on this subject, in a stable order.
    fn properties(&self) -> Vec<PropertyHandle>;

    /// A nested subject reachable through a [`PropertyKind::SubjectReference`]
    /// property, if one is currently attached.
    fn referenced_subject(&self, property: &PropertyHandle) -> Option<Arc<dyn Subject>>;

    /// Subjects currently installed in a [`PropertyKind::OrderedCollection`], in
    /// browse order.
    fn collection_items(&self, property: &PropertyHandle) -> Vec<Arc<dyn Subject>>;

    /// Subjects currently installed in a [`PropertyKind::KeyedDictionary`], keyed by
    /// browse name.
    fn dictionary_items(&self, property: &PropertyHandle) -> Vec<(String, Arc<dyn Subject>)>;
}

/// Resolves a server browse name to a local property on a subject, or adds a new
/// dynamic property when none exists and the embedding graph allows it (§4.4 step
/// 2).
pub trait SourcePathProvider: Send + Sync {
    fn resolve(&self, subject: &Arc<dyn Subject>, browse_name: &str) -> Option<PropertyHandle>;

    /// Add a new scalar property inferred from a server variable node's
    /// `DataType`/`ValueRank`. Returns `None` if the embedding graph does not
    /// support adding properties at runtime.
    fn add_dynamic_property(
        &self,
        subject: &Arc<dyn Subject>,
        browse_name: &str,
        target_type: TargetType,
    ) -> Option<PropertyHandle>;
}

/// Creates new local subjects, used when the Subject Loader or Structural Change
/// Processor discover a server-side child with no local counterpart (§4.4 step 3,
/// §4.5).
pub trait SubjectFactory: Send + Sync {
    fn create(&self, type_hint: &str) -> Arc<dyn Subject>;
}

/// Single-writer discipline over the object graph (§4.2, §5). The Subscription
/// Manager and the initial-read path in the Client Source both go through this to
/// apply server-pushed values.
pub trait SubjectUpdater: Send + Sync {
    /// Apply a batch of converted values to their properties, in order. Per-entry
    /// errors from [`Property::set_from_source`] are logged and skipped; the batch
    /// is not aborted.
    fn enqueue_or_apply(&self, batch: Vec<(PropertyHandle, PropertyValue, DateTime<Utc>, DateTime<Utc>)>);
}
