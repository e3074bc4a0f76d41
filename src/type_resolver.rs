//! §4.10 Type Resolver — infers a target-language type for an unknown variable node
//! from its `DataType` + `ValueRank`, and classifies unknown object nodes as
//! "dynamic subject" or "dynamic subject array".

use opcua::types::DataTypeId;

use crate::value::TargetType;

/// What kind of thing an unannotated object node should become locally, per
/// §4.10: an object with at least one variable child becomes a dynamic subject; an
/// object with none (a pure container) becomes a dynamic subject array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredObjectKind {
    DynamicSubject,
    DynamicSubjectArray,
}

/// Map a well-known built-in `DataTypeId` to a [`TargetType`]. Returns `None` for
/// data types this resolver doesn't recognize (structured/custom types are expected
/// to be registered explicitly rather than inferred).
pub fn builtin_target_type(data_type: DataTypeId) -> Option<TargetType> {
    Some(match data_type {
        DataTypeId::Boolean => TargetType::Boolean,
        DataTypeId::SByte => TargetType::SByte,
        DataTypeId::Byte => TargetType::Byte,
        DataTypeId::Int16 => TargetType::Int16,
        DataTypeId::UInt16 => TargetType::UInt16,
        DataTypeId::Int32 => TargetType::Int32,
        DataTypeId::UInt32 => TargetType::UInt32,
        DataTypeId::Int64 => TargetType::Int64,
        DataTypeId::UInt64 => TargetType::UInt64,
        DataTypeId::Float => TargetType::Float,
        DataTypeId::Double => TargetType::Double,
        DataTypeId::String => TargetType::String,
        DataTypeId::ByteString => TargetType::ByteString,
        DataTypeId::Guid => TargetType::Guid,
        DataTypeId::DateTime => TargetType::DateTime,
        DataTypeId::NodeId => TargetType::NodeId,
        DataTypeId::LocalizedText => TargetType::LocalizedText,
        DataTypeId::QualifiedName => TargetType::QualifiedName,
        DataTypeId::Enumeration => TargetType::Enumeration,
        _ => return None,
    })
}

/// Infer the target type for a variable node from its `DataType` and `ValueRank`.
/// `value_rank >= 0` means the variable is array-valued (§4.10); a scalar
/// (`ValueRank == -1`, `ScalarDimensions`) passes the base type through unchanged.
pub fn infer_variable_type(data_type: DataTypeId, value_rank: i32) -> Option<TargetType> {
    let base = builtin_target_type(data_type)?;
    if value_rank >= 0 {
        Some(TargetType::Array(Box::new(base)))
    } else {
        Some(base)
    }
}

/// Classify an object node given whether any of its (already browsed) children is a
/// Variable node.
pub fn infer_object_kind(has_variable_child: bool) -> InferredObjectKind {
    if has_variable_child {
        InferredObjectKind::DynamicSubject
    } else {
        InferredObjectKind::DynamicSubjectArray
    }
}
