//! §4.8 Value Codec — conversion between wire values and typed property values.

use opcua::types::{
    ByteString, DataValue, Guid, LocalizedText, NodeId, QualifiedName, StatusCode, UAString,
    Variant,
};

use crate::value::{PropertyValue, TargetType};

/// Coerce a wire [`Variant`] into a [`PropertyValue`] of the given target type.
///
/// Numeric widening/narrowing (notably `Double <-> Decimal`, since OPC UA has no
/// native `Decimal`) and array pass-through are handled element-wise. Unknown or
/// incompatible combinations return `BadTypeMismatch` rather than panicking — codec
/// failures are a per-item Data-change apply error (§7), never fatal.
pub fn to_property_value(
    wire_value: &Variant,
    target_type: &TargetType,
) -> Result<PropertyValue, StatusCode> {
    let converted = convert_variant(wire_value, target_type)?;
    Ok(PropertyValue::new(target_type.clone(), converted))
}

/// Inverse of [`to_property_value`]. `Decimal` is always down-cast to `Double` for
/// wire compatibility (§4.8); this is a lossy, one-way step and the precision loss
/// is documented, not hidden.
pub fn to_node_value(property_value: &PropertyValue) -> DataValue {
    let variant = match &property_value.target_type {
        TargetType::Decimal => match &property_value.value {
            Variant::Double(d) => Variant::Double(*d),
            other => other.clone(),
        },
        _ => property_value.value.clone(),
    };
    DataValue {
        value: Some(variant),
        status: Some(StatusCode::Good),
        source_timestamp: Some(opcua::types::DateTime::now()),
        ..Default::default()
    }
}

fn convert_variant(wire_value: &Variant, target_type: &TargetType) -> Result<Variant, StatusCode> {
    match (target_type, wire_value) {
        (TargetType::Array(inner), Variant::Array(arr)) => {
            let mut converted = Vec::with_capacity(arr.values.len());
            for v in &arr.values {
                converted.push(convert_variant(v, inner)?);
            }
            Ok(Variant::from(converted))
        }
        (TargetType::Boolean, Variant::Boolean(v)) => Ok(Variant::Boolean(*v)),
        (TargetType::SByte, Variant::SByte(v)) => Ok(Variant::SByte(*v)),
        (TargetType::Byte, Variant::Byte(v)) => Ok(Variant::Byte(*v)),
        (TargetType::Int16, Variant::Int16(v)) => Ok(Variant::Int16(*v)),
        (TargetType::UInt16, Variant::UInt16(v)) => Ok(Variant::UInt16(*v)),
        (TargetType::Int32, Variant::Int32(v)) => Ok(Variant::Int32(*v)),
        (TargetType::UInt32, Variant::UInt32(v)) => Ok(Variant::UInt32(*v)),
        (TargetType::Int64, Variant::Int64(v)) => Ok(Variant::Int64(*v)),
        (TargetType::UInt64, Variant::UInt64(v)) => Ok(Variant::UInt64(*v)),
        (TargetType::Float, Variant::Float(v)) => Ok(Variant::Float(*v)),
        (TargetType::Double, Variant::Double(v)) => Ok(Variant::Double(*v)),
        // Decimal round-trips through Double, with documented precision loss.
        (TargetType::Decimal, Variant::Double(v)) => Ok(Variant::Double(*v)),
        (TargetType::Decimal, Variant::Int64(v)) => Ok(Variant::Double(*v as f64)),
        (TargetType::String, Variant::String(v)) => Ok(Variant::String(v.clone())),
        (TargetType::ByteString, Variant::ByteString(v)) => Ok(Variant::ByteString(v.clone())),
        (TargetType::Guid, Variant::Guid(v)) => Ok(Variant::Guid(v.clone())),
        (TargetType::DateTime, Variant::DateTime(v)) => Ok(Variant::DateTime(v.clone())),
        (TargetType::NodeId, Variant::NodeId(v)) => Ok(Variant::NodeId(v.clone())),
        (TargetType::LocalizedText, Variant::LocalizedText(v)) => {
            Ok(Variant::LocalizedText(v.clone()))
        }
        (TargetType::QualifiedName, Variant::QualifiedName(v)) => {
            Ok(Variant::QualifiedName(v.clone()))
        }
        (TargetType::Enumeration, Variant::Int32(v)) => Ok(Variant::Int32(*v)),
        // Numeric widening: the server sent a narrower or wider type than expected.
        (TargetType::Double, Variant::Float(v)) => Ok(Variant::Double(*v as f64)),
        (TargetType::Int64, Variant::Int32(v)) => Ok(Variant::Int64(*v as i64)),
        (TargetType::UInt64, Variant::UInt32(v)) => Ok(Variant::UInt64(*v as u64)),
        _ => Err(StatusCode::BadTypeMismatch),
    }
}

/// Wrap a plain string as a [`LocalizedText`] with no locale, for writing scalar
/// localized-text properties created during §4.5 remote node management.
pub fn wrap_localized_text(text: impl Into<UAString>) -> LocalizedText {
    LocalizedText::new("", text)
}

/// Unwrap a [`QualifiedName`] to its plain name, discarding the namespace index.
pub fn unwrap_qualified_name(name: &QualifiedName) -> String {
    name.name.as_ref().to_string()
}

/// Round-trip helper used by the type-inference property tests (§8 item 8):
/// converts a node-side byte string back to a [`ByteString`] value for comparison.
pub fn as_byte_string(value: &Variant) -> Option<&ByteString> {
    match value {
        Variant::ByteString(b) => Some(b),
        _ => None,
    }
}

/// Unwrap a plain [`NodeId`] from a wire-side variant, used by the Subject Loader
/// when a browse result needs the resolved target NodeId rather than a value.
pub fn node_id_of(value: &Variant) -> Option<NodeId> {
    match value {
        Variant::NodeId(n) => Some((**n).clone()),
        _ => None,
    }
}
