//! Typed property values and the target-type tags the [`crate::codec`] and
//! [`crate::type_resolver`] use to convert between the wire and the local graph.

use chrono::{DateTime, Utc};
use opcua::types::{DateTime as OpcDateTime, NodeId, Variant};

/// A target-language type for a property, inferred by the [`crate::type_resolver`]
/// from a variable node's `DataType` + `ValueRank` (§4.10), or already known because
/// the property existed before the load ran.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    /// OPC UA has no native `Decimal`; wire representation is always `Double`
    /// (§4.8), with the documented precision loss.
    Decimal,
    String,
    ByteString,
    Guid,
    DateTime,
    NodeId,
    LocalizedText,
    QualifiedName,
    /// Enumeration values are carried as `i32` on the wire.
    Enumeration,
    Array(Box<TargetType>),
}

/// A value already converted to (or about to be converted from) the target type,
/// carried alongside the wire-side timestamps.
#[derive(Debug, Clone)]
pub struct PropertyValue {
    pub target_type: TargetType,
    pub value: Variant,
}

impl PropertyValue {
    pub fn new(target_type: TargetType, value: Variant) -> Self {
        Self { target_type, value }
    }
}

/// Converts an OPC UA wire timestamp to the local graph's timestamp representation.
/// The local graph is an external collaborator (§1); this is the one conversion point
/// the core needs, so it lives here rather than being duplicated across callers.
pub fn to_chrono(ts: OpcDateTime) -> DateTime<Utc> {
    ts.as_chrono()
}

/// The server NodeId of the leaf a property was bound to, see §4.4 step 6 and the
/// `OpcVariableKey` auxiliary storage slot (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpcVariableKey(pub NodeId);
