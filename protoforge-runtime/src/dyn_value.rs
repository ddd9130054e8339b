use std::collections::BTreeMap;

/// A schema-erased view of a message's field values.
///
/// Generated messages expose a `to_dyn_value` method that walks their fields and builds one of
/// these, giving callers a uniform tree they can inspect, log, or re-serialize to a text format
/// without linking against the message's concrete type. It mirrors what a dynamically typed
/// host language sees when it turns a message into a plain dict: scalars as themselves, `bytes`
/// kept as raw bytes rather than decoded text, repeated fields as `List`, maps and nested
/// messages as `Map`/`Struct`.
#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    /// A field that was not set and carries proto3's implicit default.
    Null,
    Bool(bool),
    /// Any signed integral field (`int32`, `int64`, `sint32`, `sint64`, `sfixed32`, `sfixed64`).
    Int(i64),
    /// Any unsigned integral field (`uint32`, `uint64`, `fixed32`, `fixed64`), and enum numeric
    /// values.
    UInt(u64),
    /// `float` or `double`.
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    /// A repeated field.
    List(Vec<DynValue>),
    /// A map field. Keys are rendered through the same scalar variants as a plain field of the
    /// key's type would use (`String` for string keys, `Int`/`UInt` for integral keys).
    Map(BTreeMap<DynValueKey, DynValue>),
    /// A nested message field, keyed by its schema field name.
    Struct(BTreeMap<String, DynValue>),
}

/// A map key rendered as a [`DynValue`] scalar. Proto3 permits integral, `bool`, and `string`
/// map keys; floating-point keys are not allowed by the schema and never occur here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DynValueKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
}

impl DynValue {
    /// Returns `true` if this is [`DynValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, DynValue::Null)
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, DynValue>> {
        match self {
            DynValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynValue]> {
        match self {
            DynValue::List(values) => Some(values),
            _ => None,
        }
    }
}
