//! Schema-specific [`Bindings`](crate::template::Bindings) for the runtime template: translates
//! each `FOREACH_*` / `IF_*` tag the template uses into model lookups, and builds the inline
//! substitution values a template line can reference.

use std::collections::HashSet;

use crate::error::BuildError;
use crate::fully_qualified_name::FullyQualifiedName;
use crate::ident::{to_snake, to_upper_camel};
use crate::model::{DataType, FieldGroupInfo, FieldInfo, GlobalAlias, GlobalAliasTarget, MessageInfo, ModuleCollection};
use crate::template::{Bindings, Environment};

/// A key present in a template [`Environment`], used instead of bare string literals so a typo in
/// a binding name is caught by the compiler rather than surfacing as a runtime `UnknownBinding`.
macro_rules! keys {
    ($($name:ident => $key:literal),* $(,)?) => {
        $(pub(crate) const $name: &str = $key;)*
    };
}

keys! {
    MODULE_NAME => "MODULE_NAME",
    ENUM_NAME => "ENUM_NAME",
    ENUM_NAME_ESCAPED => "ENUM_NAME_ESCAPED",
    ENUM_TYPE_IDENT => "ENUM_TYPE_IDENT",
    ENUM_MEMBER_NAME => "ENUM_MEMBER_NAME",
    ENUM_MEMBER_VALUE => "ENUM_MEMBER_VALUE",
    MESSAGE_NAME => "MESSAGE_NAME",
    MESSAGE_NAME_ESCAPED => "MESSAGE_NAME_ESCAPED",
    MESSAGE_TYPE_IDENT => "MESSAGE_TYPE_IDENT",
    FIELD_GROUP_NAME => "FIELD_GROUP_NAME",
    FIELD_GROUP_DEFAULT => "FIELD_GROUP_DEFAULT",
    FIELD_GROUP_TYPE_IDENT => "FIELD_GROUP_TYPE_IDENT",
    FIELD_NUMBER => "FIELD_NUMBER",
    FIELD_IS_OPTIONAL => "FIELD_IS_OPTIONAL",
    FIELD_DATA_TYPE => "FIELD_DATA_TYPE",
    FIELD_RUST_TYPE => "FIELD_RUST_TYPE",
    FIELD_VARIANT_IDENT => "FIELD_VARIANT_IDENT",
    FIELD_ENUM_TYPE_IDENT => "FIELD_ENUM_TYPE_IDENT",
    FIELD_SUBMESSAGE_TYPE_IDENT => "FIELD_SUBMESSAGE_TYPE_IDENT",
    FIELD_KEY_DATA_TYPE => "FIELD_KEY_DATA_TYPE",
    FIELD_VALUE_DATA_TYPE => "FIELD_VALUE_DATA_TYPE",
    FIELD_GROUP_RUST_TYPE => "FIELD_GROUP_RUST_TYPE",
    FIELD_DEFAULT => "FIELD_DEFAULT",
    FIELD_ENCODE_STMT => "FIELD_ENCODE_STMT",
    FIELD_MERGE_ARM_BODY => "FIELD_MERGE_ARM_BODY",
    FIELD_LEN_EXPR => "FIELD_LEN_EXPR",
    FIELD_GROUP_DYN_VALUE_EXPR => "FIELD_GROUP_DYN_VALUE_EXPR",
    FIELD_GROUP_DEBUG_EXPR => "FIELD_GROUP_DEBUG_EXPR",
    FIELD_WIRE_TYPE_CHECK_EXPR => "FIELD_WIRE_TYPE_CHECK_EXPR",
    FIELD_EXPECTED_WIRE_TYPE_EXPR => "FIELD_EXPECTED_WIRE_TYPE_EXPR",
    ALIAS_MODULE_NAME => "ALIAS_MODULE_NAME",
    FIELD_GROUP_NAME_LITERAL => "FIELD_GROUP_NAME_LITERAL",
}

pub(crate) struct ModelBindings<'a> {
    collection: &'a ModuleCollection,
}

impl<'a> ModelBindings<'a> {
    pub(crate) fn new(collection: &'a ModuleCollection) -> Self {
        Self { collection }
    }

    fn current_message(&self, env: &Environment) -> Result<&'a MessageInfo, BuildError> {
        let module_name = env.get(MODULE_NAME).expect("MODULE_NAME bound before entering a message scope");
        let message_name = env.get(MESSAGE_NAME).expect("MESSAGE_NAME bound before entering a field scope");
        self.collection
            .modules
            .iter()
            .find(|(m, _)| m.to_string() == *module_name)
            .and_then(|(_, info)| info.messages.values().find(|m| &m.rust_name == message_name))
            .ok_or_else(|| BuildError::UnknownBinding {
                template: "runtime".to_string(),
                name: format!("message {message_name} in module {module_name}"),
            })
    }

    fn current_field_group(&self, env: &Environment, message: &'a MessageInfo) -> Result<FieldGroupInfo, BuildError> {
        let group_name = env
            .get(FIELD_GROUP_NAME)
            .expect("FIELD_GROUP_NAME bound before entering a field scope");
        field_groups(message)
            .into_iter()
            .find(|g| &g.rust_name == group_name)
            .ok_or_else(|| BuildError::UnknownBinding {
                template: "runtime".to_string(),
                name: format!("field group {group_name}"),
            })
    }

    fn current_field(&self, env: &Environment, message: &'a MessageInfo) -> Result<FieldInfo, BuildError> {
        let number: i32 = env
            .get(FIELD_NUMBER)
            .expect("FIELD_NUMBER bound before testing a field predicate")
            .parse()
            .expect("FIELD_NUMBER binding is always a valid i32 literal");
        all_fields(message)
            .into_iter()
            .find(|f| f.number == number)
            .ok_or_else(|| BuildError::UnknownBinding {
                template: "runtime".to_string(),
                name: format!("field number {number}"),
            })
    }
}

/// Every field group a message declares, ordered by the minimum field number among its members —
/// plain (single-member) fields are represented as a synthetic one-field group sharing the
/// field's own name, matching how the stub and runtime templates treat "group" uniformly.
fn field_groups(message: &MessageInfo) -> Vec<FieldGroupInfo> {
    let mut groups: Vec<FieldGroupInfo> = message
        .fields
        .iter()
        .map(|f| FieldGroupInfo {
            rust_name: f.rust_name.clone(),
            schema_name: f.schema_name.clone(),
            min_number: f.number,
            members: vec![f.clone()],
        })
        .chain(message.field_groups.iter().cloned())
        .collect();
    groups.sort_by_key(|g| g.min_number);
    groups
}

fn all_fields(message: &MessageInfo) -> Vec<FieldInfo> {
    field_groups(message).into_iter().flat_map(|g| g.members).collect()
}

fn data_type_tag(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Bool => "BOOL",
        DataType::Int32 => "INT32",
        DataType::Int64 => "INT64",
        DataType::Uint32 => "UINT32",
        DataType::Uint64 => "UINT64",
        DataType::Sint32 => "SINT32",
        DataType::Sint64 => "SINT64",
        DataType::Fixed32 => "FIXED32",
        DataType::Fixed64 => "FIXED64",
        DataType::Sfixed32 => "SFIXED32",
        DataType::Sfixed64 => "SFIXED64",
        DataType::Float => "FLOAT",
        DataType::Double => "DOUBLE",
        DataType::String => "STRING",
        DataType::Bytes => "BYTES",
        DataType::Enum(_) => "ENUM",
        DataType::Message(_) => "MESSAGE",
        DataType::Map(_, _) => "MAP",
    }
}

/// The Rust type a field's value is stored as, ignoring `repeated`/`optional`/map wrapping (the
/// template applies those itself via the `IF_MESSAGE_FIELD_TYPE_*` predicates).
fn scalar_rust_type(collection: &ModuleCollection, data_type: &DataType) -> String {
    scalar_rust_type_boxed(collection, data_type, false)
}

/// Like [`scalar_rust_type`], but wraps a message type in `Box<...>` when `boxed` is set — used
/// for fields that [`crate::message_graph`] determined close a recursive reference cycle, since
/// Rust (unlike the host runtime this spec was distilled from) needs an indirection to give such a
/// type a finite size.
fn scalar_rust_type_boxed(collection: &ModuleCollection, data_type: &DataType, boxed: bool) -> String {
    match data_type {
        DataType::Bool => "bool".to_string(),
        DataType::Int32 | DataType::Sint32 | DataType::Sfixed32 => "i32".to_string(),
        DataType::Int64 | DataType::Sint64 | DataType::Sfixed64 => "i64".to_string(),
        DataType::Uint32 | DataType::Fixed32 => "u32".to_string(),
        DataType::Uint64 | DataType::Fixed64 => "u64".to_string(),
        DataType::Float => "f32".to_string(),
        DataType::Double => "f64".to_string(),
        DataType::String => "::std::string::String".to_string(),
        DataType::Bytes => "::std::vec::Vec<u8>".to_string(),
        DataType::Enum(name) => collection
            .enum_info(name)
            .map(|e| e.rust_name.clone())
            .unwrap_or_else(|| "i32".to_string()),
        DataType::Message(name) => {
            let ident = collection
                .message(name)
                .map(|m| m.rust_name.clone())
                .unwrap_or_else(|| name.as_ref().to_string());
            if boxed {
                format!("::std::boxed::Box<{ident}>")
            } else {
                ident
            }
        }
        DataType::Map(key, value) => format!(
            "::std::collections::BTreeMap<{}, {}>",
            scalar_rust_type(collection, key),
            scalar_rust_type(collection, value)
        ),
    }
}

/// Default-value expression for a field group (spec §4.4): `None` for a real (multi-member) oneof
/// or a proto3-optional singleton, an empty collection if the group is uniformly repeated,
/// otherwise the zero value of the first member's type.
fn default_value_expr(collection: &ModuleCollection, group: &FieldGroupInfo) -> String {
    if group.members.len() > 1 || group.members.iter().any(|f| f.optional) {
        return "::std::option::Option::None".to_string();
    }
    let all_repeated = group.members.iter().all(|f| f.repeated);
    if all_repeated {
        return if matches!(group.members.first().map(|f| &f.data_type), Some(DataType::Map(_, _))) {
            "::std::collections::BTreeMap::new()".to_string()
        } else {
            "::std::vec::Vec::new()".to_string()
        };
    }
    let first = &group.members[0];
    match &first.data_type {
        DataType::Enum(name) => collection
            .enum_info(name)
            .and_then(|e| e.members.iter().find(|m| m.number == 0))
            .map(|m| format!("{}::{}", collection.enum_info(name).unwrap().rust_name, m.rust_name))
            .unwrap_or_else(|| "0".to_string()),
        DataType::Message(_) if first.boxed => "::std::boxed::Box::new(::std::default::Default::default())".to_string(),
        DataType::Message(_) => "::std::default::Default::default()".to_string(),
        DataType::String => "::std::string::String::new()".to_string(),
        DataType::Bytes => "::std::vec::Vec::new()".to_string(),
        DataType::Float | DataType::Double => "0.0".to_string(),
        DataType::Bool => "false".to_string(),
        _ => "0".to_string(),
    }
}

/// The Rust type of a field group's generated struct slot: `Option<{group_type_ident}>` for a real
/// oneof, otherwise the single member's type wrapped per its `repeated`/map/`optional` shape.
fn field_group_rust_type(collection: &ModuleCollection, group: &FieldGroupInfo, group_type_ident: &str) -> String {
    if group.members.len() > 1 {
        return format!("::std::option::Option<{group_type_ident}>");
    }
    let field = &group.members[0];
    if let DataType::Map(_, _) = &field.data_type {
        return scalar_rust_type_boxed(collection, &field.data_type, false);
    }
    let scalar = scalar_rust_type_boxed(collection, &field.data_type, field.boxed);
    if field.repeated {
        format!("::std::vec::Vec<{scalar}>")
    } else if field.optional {
        format!("::std::option::Option<{scalar}>")
    } else {
        scalar
    }
}

/// Default-value expression for a single field, in isolation from whatever group it belongs to.
/// Used for a oneof member's reset-on-clear value, where [`default_value_expr`]'s group-level
/// "all members share a default" logic doesn't apply.
fn field_default_expr(collection: &ModuleCollection, field: &FieldInfo) -> String {
    default_value_expr(
        collection,
        &FieldGroupInfo {
            rust_name: field.rust_name.clone(),
            schema_name: field.schema_name.clone(),
            min_number: field.number,
            members: vec![field.clone()],
        },
    )
}

/// The `protoforge-runtime` codec submodule that encodes/decodes this field's wire representation.
/// Enums ride the `int32` codec (they're varint-encoded); everything else matches
/// [`DataType::type_key`] exactly, since the runtime's module names were chosen to match.
fn scalar_codec_mod(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Enum(_) => "int32",
        other => other.type_key(),
    }
}

/// An expression encoding `v` (a `&FIELD_RUST_TYPE`) under `tag` into `buf`. Valid wherever a
/// single field value (not a whole repeated/map collection) is in scope as `v`.
fn encode_with_ref(field: &FieldInfo) -> String {
    let number = field.number;
    match &field.data_type {
        DataType::Enum(_) => format!("protoforge_runtime::encoding::int32::encode({number}, &(*v as i32), buf)"),
        DataType::Message(_) => format!("protoforge_runtime::encoding::message::encode({number}, v, buf)"),
        DataType::Map(_, _) => unreachable!("map fields are never oneof/singleton members"),
        other => format!("protoforge_runtime::encoding::{}::encode({number}, v, buf)", scalar_codec_mod(other)),
    }
}

/// An expression merging one occurrence of this field from `buf` into `v` (a `&mut
/// FIELD_RUST_TYPE`), given `wire_type` and `ctx` in scope. Evaluates to `Result<(), DecodeError>`.
///
/// An enum field's value may be correctly wire-typed (`Varint`) yet carry a numeric value with no
/// matching member. `ignore_incorrect_types` and `retain_unknown_fields` (or, inside the message's
/// own trait `merge_field`, the always-tolerant shadow bindings the template installs there) are
/// consulted the same way the top-level wire-type mismatch is: discard when tolerant, moving the
/// original bytes into `self.unknown_fields` when also retaining; hard error otherwise.
fn merge_with_ref(collection: &ModuleCollection, field: &FieldInfo, field_label: &str) -> String {
    match &field.data_type {
        DataType::Enum(name) => {
            let enum_ident = collection.enum_info(name).map(|e| e.rust_name.clone()).unwrap_or_else(|| "i32".to_string());
            format!(
                "{{ let mut raw = 0i32; protoforge_runtime::encoding::int32::merge(wire_type, &mut raw, buf, ctx.clone())?; \
                 match {enum_ident}::from_i32(raw) {{ \
                 ::std::option::Option::Some(value) => {{ *v = value; ::std::result::Result::Ok(()) }} \
                 ::std::option::Option::None if ignore_incorrect_types => {{ \
                 if retain_unknown_fields {{ \
                 let mut unknown_payload = ::std::vec::Vec::new(); \
                 protoforge_runtime::encoding::encode_varint(raw as u64, &mut unknown_payload); \
                 let mut unknown_slice: &[u8] = &unknown_payload; \
                 protoforge_runtime::Message::merge_field(&mut self.unknown_fields, tag, wire_type, &mut unknown_slice, ctx.clone())?; \
                 }} \
                 ::std::result::Result::Ok(()) \
                 }} \
                 ::std::option::Option::None => ::std::result::Result::Err(protoforge_runtime::DecodeError::UnknownEnumValue {{ field: \"{field_label}\", value: raw }}), \
                 }} }}"
            )
        }
        DataType::Message(_) => "protoforge_runtime::encoding::message::merge(wire_type, v, buf, ctx)".to_string(),
        DataType::Map(_, _) => unreachable!("map fields are never oneof/singleton members"),
        other => format!("protoforge_runtime::encoding::{}::merge(wire_type, v, buf, ctx)", scalar_codec_mod(other)),
    }
}

/// An expression for the encoded length of `v` (a `&FIELD_RUST_TYPE`) under `tag`.
fn len_with_ref(field: &FieldInfo) -> String {
    let number = field.number;
    match &field.data_type {
        DataType::Enum(_) => format!("protoforge_runtime::encoding::int32::encoded_len({number}, &(*v as i32))"),
        DataType::Message(_) => format!("protoforge_runtime::encoding::message::encoded_len({number}, v)"),
        DataType::Map(_, _) => unreachable!("map fields are never oneof/singleton members"),
        other => format!("protoforge_runtime::encoding::{}::encoded_len({number}, v)", scalar_codec_mod(other)),
    }
}

/// A complete statement encoding one field of a message into `buf`, dispatched on its shape:
/// a oneof member (bare expression, wrapped by the template's own `match` arm over the group's
/// enum), a repeated field, a map field, an optional singleton, or a plain field that's skipped
/// when equal to its zero value.
fn field_encode_stmt(collection: &ModuleCollection, group: &FieldGroupInfo, field: &FieldInfo) -> String {
    if group.members.len() > 1 {
        return format!("{};", encode_with_ref(field));
    }
    if field.repeated {
        if let DataType::Enum(_) = &field.data_type {
            return format!(
                "for v in &self.{name} {{ {stmt}; }}",
                name = group.rust_name,
                stmt = encode_with_ref(field)
            );
        }
        return format!(
            "protoforge_runtime::encoding::{}::encode_repeated({}, &self.{}, buf);",
            scalar_codec_mod(&field.data_type),
            field.number,
            group.rust_name
        );
    }
    if let DataType::Map(key, value) = &field.data_type {
        return format!(
            "protoforge_runtime::encoding::btree_map::encode({key_enc}, {key_len}, {val_enc}, {val_len}, {number}, &self.{name}, buf);",
            key_enc = codec_fn_path(collection, key, "encode"),
            key_len = codec_fn_path(collection, key, "encoded_len"),
            val_enc = codec_fn_path(collection, value, "encode"),
            val_len = codec_fn_path(collection, value, "encoded_len"),
            number = field.number,
            name = group.rust_name,
        );
    }
    if field.optional {
        return format!(
            "if let ::std::option::Option::Some(v) = self.{name}.as_ref() {{ {stmt}; }}",
            name = group.rust_name,
            stmt = encode_with_ref(field)
        );
    }
    format!(
        "if self.{name} != {default} {{ let v = &self.{name}; {stmt}; }}",
        name = group.rust_name,
        default = field_default_expr(collection, field),
        stmt = encode_with_ref(field)
    )
}

/// The body of a `match tag { FIELD_NUMBER => { ... } }` arm in `merge_field`, for one field.
/// Ends in an expression of type `Result<(), DecodeError>` (no trailing semicolon).
fn field_merge_arm_body(collection: &ModuleCollection, group: &FieldGroupInfo, field: &FieldInfo, group_type_ident: &str) -> String {
    if group.members.len() > 1 {
        return format!(
            "let mut value: {ty} = {default}; let v = &mut value; {merge}?; self.{group} = ::std::option::Option::Some({group_type_ident}::{variant}(value)); ::std::result::Result::Ok(())",
            ty = scalar_rust_type_boxed(collection, &field.data_type, field.boxed),
            default = field_default_expr(collection, field),
            merge = merge_with_ref(collection, field, &field.schema_name),
            group = group.rust_name,
            variant = to_upper_camel(&field.schema_name),
        );
    }
    if field.repeated {
        if let DataType::Enum(name) = &field.data_type {
            let enum_ident = collection.enum_info(name).map(|e| e.rust_name.clone()).unwrap_or_else(|| "i32".to_string());
            // An unrecognized value among a repeated/packed occurrence is discarded from the list
            // when tolerant, matching the singleton case's discard behavior; unlike the singleton
            // case it is not individually retained into `unknown_fields`, since a packed varint run
            // has no per-value tag to re-key it under once the values have been split apart.
            return format!(
                "let mut raw: ::std::vec::Vec<i32> = ::std::vec::Vec::new(); \
                 protoforge_runtime::encoding::int32::merge_repeated(wire_type, &mut raw, buf, ctx.clone())?; \
                 for value in raw {{ \
                 match {enum_ident}::from_i32(value) {{ \
                 ::std::option::Option::Some(e) => self.{name}.push(e), \
                 ::std::option::Option::None if ignore_incorrect_types => {{}} \
                 ::std::option::Option::None => return ::std::result::Result::Err(protoforge_runtime::DecodeError::UnknownEnumValue {{ field: \"{label}\", value }}), \
                 }} }} ::std::result::Result::Ok(())",
                name = group.rust_name,
                label = field.schema_name,
            );
        }
        return format!(
            "protoforge_runtime::encoding::{}::merge_repeated(wire_type, &mut self.{}, buf, ctx)",
            scalar_codec_mod(&field.data_type),
            group.rust_name
        );
    }
    if let DataType::Map(key, value) = &field.data_type {
        return format!(
            "protoforge_runtime::encoding::check_wire_type(protoforge_runtime::encoding::WireType::LengthDelimited, wire_type)\
             .and_then(|()| protoforge_runtime::encoding::btree_map::merge({key_merge}, {val_merge}, &mut self.{name}, buf, ctx))",
            key_merge = codec_fn_path(collection, key, "merge"),
            val_merge = codec_fn_path(collection, value, "merge"),
            name = group.rust_name,
        );
    }
    if field.optional {
        return format!(
            "let mut value = self.{name}.take().unwrap_or_default(); let v = &mut value; {merge}?; self.{name} = ::std::option::Option::Some(value); ::std::result::Result::Ok(())",
            name = group.rust_name,
            merge = merge_with_ref(collection, field, &field.schema_name)
        );
    }
    format!("let v = &mut self.{}; {}", group.rust_name, merge_with_ref(collection, field, &field.schema_name))
}

/// An expression for this field's contribution to the message's `encoded_len`.
fn field_len_expr(collection: &ModuleCollection, group: &FieldGroupInfo, field: &FieldInfo) -> String {
    if group.members.len() > 1 {
        return len_with_ref(field);
    }
    if field.repeated {
        if let DataType::Enum(_) = &field.data_type {
            return format!(
                "self.{name}.iter().map(|v| {len}).sum::<usize>()",
                name = group.rust_name,
                len = len_with_ref(field)
            );
        }
        return format!(
            "protoforge_runtime::encoding::{}::encoded_len_repeated({}, &self.{})",
            scalar_codec_mod(&field.data_type),
            field.number,
            group.rust_name
        );
    }
    if let DataType::Map(key, value) = &field.data_type {
        return format!(
            "protoforge_runtime::encoding::btree_map::encoded_len({key_len}, {val_len}, {number}, &self.{name})",
            key_len = codec_fn_path(collection, key, "encoded_len"),
            val_len = codec_fn_path(collection, value, "encoded_len"),
            number = field.number,
            name = group.rust_name,
        );
    }
    if field.optional {
        return format!(
            "self.{name}.as_ref().map(|v| {len}).unwrap_or(0)",
            name = group.rust_name,
            len = len_with_ref(field)
        );
    }
    format!(
        "if self.{name} != {default} {{ let v = &self.{name}; {len} }} else {{ 0 }}",
        name = group.rust_name,
        default = field_default_expr(collection, field),
        len = len_with_ref(field)
    )
}

/// Whether `message` can derive `Eq`/`Hash`: false if any field, transitively through submessage
/// fields it owns by value, is a `float`/`double`. IEEE-754 floats have no total equality (`NaN !=
/// NaN`), so deriving `Eq`/`Hash` over one would violate `Eq`'s reflexivity contract. A submessage
/// reached only through a `boxed` (cycle-breaking) field is still walked — the box is an
/// indirection, not an opt-out — so `visited` guards against the reference cycle itself, not the
/// boxing.
fn message_supports_eq_hash(collection: &ModuleCollection, message: &MessageInfo) -> bool {
    let mut visited = HashSet::new();
    message_supports_eq_hash_inner(collection, message, &mut visited)
}

fn message_supports_eq_hash_inner(collection: &ModuleCollection, message: &MessageInfo, visited: &mut HashSet<FullyQualifiedName>) -> bool {
    if !visited.insert(message.fq_name.clone()) {
        return true;
    }
    for field in all_fields(message) {
        if !data_type_supports_eq_hash(collection, &field.data_type, visited) {
            return false;
        }
    }
    true
}

fn data_type_supports_eq_hash(collection: &ModuleCollection, data_type: &DataType, visited: &mut HashSet<FullyQualifiedName>) -> bool {
    match data_type {
        DataType::Float | DataType::Double => false,
        DataType::Message(name) => collection
            .message(name)
            .map(|m| message_supports_eq_hash_inner(collection, m, visited))
            .unwrap_or(true),
        DataType::Map(key, value) => {
            data_type_supports_eq_hash(collection, key, visited) && data_type_supports_eq_hash(collection, value, visited)
        }
        _ => true,
    }
}

/// A `protoforge_runtime::DynValue` expression for the scalar value bound to `var` (a reference).
/// Enums render through `DynValue::UInt`, matching the distilled spec's "enums render as their
/// integer" rule; submessages recurse via their own `to_dyn_value`.
fn dyn_value_scalar_expr(data_type: &DataType, var: &str) -> String {
    match data_type {
        DataType::Bool => format!("protoforge_runtime::DynValue::Bool(*{var})"),
        DataType::Int32 | DataType::Int64 | DataType::Sint32 | DataType::Sint64 | DataType::Sfixed32 | DataType::Sfixed64 => {
            format!("protoforge_runtime::DynValue::Int(*{var} as i64)")
        }
        DataType::Uint32 | DataType::Uint64 | DataType::Fixed32 | DataType::Fixed64 => {
            format!("protoforge_runtime::DynValue::UInt(*{var} as u64)")
        }
        DataType::Float | DataType::Double => format!("protoforge_runtime::DynValue::Float(*{var} as f64)"),
        DataType::String => format!("protoforge_runtime::DynValue::String({var}.clone())"),
        DataType::Bytes => format!("protoforge_runtime::DynValue::Bytes({var}.clone())"),
        DataType::Enum(_) => format!("protoforge_runtime::DynValue::UInt(*{var} as i32 as u64)"),
        DataType::Message(_) => format!("{var}.to_dyn_value()"),
        DataType::Map(_, _) => unreachable!("map values are converted via dyn_value_map_expr"),
    }
}

/// A `protoforge_runtime::DynValueKey` expression for a map key bound to `var`. Proto3 only
/// permits integral, `bool`, or `string` map keys.
fn dyn_value_key_expr(data_type: &DataType, var: &str) -> String {
    match data_type {
        DataType::Bool => format!("protoforge_runtime::DynValueKey::Bool(*{var})"),
        DataType::String => format!("protoforge_runtime::DynValueKey::String({var}.clone())"),
        DataType::Int32 | DataType::Int64 | DataType::Sint32 | DataType::Sint64 | DataType::Sfixed32 | DataType::Sfixed64 => {
            format!("protoforge_runtime::DynValueKey::Int(*{var} as i64)")
        }
        _ => format!("protoforge_runtime::DynValueKey::UInt(*{var} as u64)"),
    }
}

/// A full `protoforge_runtime::DynValue` expression for one field group's current value,
/// dispatched on shape: a real oneof renders the active variant's value (or `Null` when unset), a
/// repeated field renders `DynValue::List`, a map renders `DynValue::Map`, an optional singleton
/// renders the value or `Null`, and a plain field renders its value directly.
fn field_group_dyn_value_expr(group: &FieldGroupInfo, group_type_ident: &str) -> String {
    let name = &group.rust_name;
    if group.members.len() > 1 {
        let arms: Vec<String> = group
            .members
            .iter()
            .map(|f| {
                format!(
                    "{group_type_ident}::{variant}(v) => {expr},",
                    variant = to_upper_camel(&f.schema_name),
                    expr = dyn_value_scalar_expr(&f.data_type, "v")
                )
            })
            .collect();
        return format!(
            "match &self.{name} {{ ::std::option::Option::Some(value) => match value {{ {} }}, ::std::option::Option::None => protoforge_runtime::DynValue::Null }}",
            arms.join(" ")
        );
    }
    let field = &group.members[0];
    if field.repeated {
        return format!(
            "protoforge_runtime::DynValue::List(self.{name}.iter().map(|v| {}).collect())",
            dyn_value_scalar_expr(&field.data_type, "v")
        );
    }
    if let DataType::Map(key, value) = &field.data_type {
        return format!(
            "protoforge_runtime::DynValue::Map(self.{name}.iter().map(|(k, v)| ({}, {})).collect())",
            dyn_value_key_expr(key, "k"),
            dyn_value_scalar_expr(value, "v")
        );
    }
    if field.optional {
        return format!(
            "match self.{name}.as_ref() {{ ::std::option::Option::Some(v) => {}, ::std::option::Option::None => protoforge_runtime::DynValue::Null }}",
            dyn_value_scalar_expr(&field.data_type, "v")
        );
    }
    format!("{{ let v = &self.{name}; {} }}", dyn_value_scalar_expr(&field.data_type, "v"))
}

/// An expression usable as the second argument to `debug_struct(...).field("name", EXPR)` for this
/// group. A direct, non-oneof `bytes` field (singular, optional, or repeated) renders through
/// `protoforge_runtime::truncated` so a large blob doesn't flood the output; everything else,
/// including oneof members, renders as plain `&self.{name}`.
fn field_group_debug_expr(group: &FieldGroupInfo) -> String {
    let name = &group.rust_name;
    if group.members.len() > 1 {
        return format!("&self.{name}");
    }
    let field = &group.members[0];
    if !matches!(field.data_type, DataType::Bytes) {
        return format!("&self.{name}");
    }
    if field.repeated {
        format!("&self.{name}.iter().map(|v| protoforge_runtime::truncated(v)).collect::<::std::vec::Vec<_>>()")
    } else if field.optional {
        format!("&self.{name}.as_ref().map(|v| protoforge_runtime::truncated(v))")
    } else {
        format!("&protoforge_runtime::truncated(&self.{name})")
    }
}

/// The `protoforge_runtime::encoding::WireType` variant a field's tag is expected to carry on the
/// wire, ignoring `repeated` packing (callers needing the packed alternative add it themselves).
fn field_wire_type_name(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Bool
        | DataType::Int32
        | DataType::Int64
        | DataType::Uint32
        | DataType::Uint64
        | DataType::Sint32
        | DataType::Sint64
        | DataType::Enum(_) => "Varint",
        DataType::Fixed64 | DataType::Sfixed64 | DataType::Double => "SixtyFourBit",
        DataType::Fixed32 | DataType::Sfixed32 | DataType::Float => "ThirtyTwoBit",
        DataType::String | DataType::Bytes | DataType::Message(_) | DataType::Map(_, _) => "LengthDelimited",
    }
}

/// A `protoforge_runtime::encoding::WireType` value expression for the wire type this field's tag
/// is declared to carry — the one reported in a recovered [`protoforge_runtime::DecodeError::UnexpectedWireType`].
fn field_expected_wire_type_expr(field: &FieldInfo) -> String {
    format!("protoforge_runtime::encoding::WireType::{}", field_wire_type_name(&field.data_type))
}

/// A boolean expression, true when `wire_type` (in scope) is one this field's tag may legally
/// carry. A repeated scalar field may arrive either unpacked (its own wire type, one value per
/// tag occurrence) or packed (`LengthDelimited`, many values under one tag); every other shape
/// has exactly one legal wire type. Used by the tolerant merge dispatch to decide, before
/// delegating to the ordinary codec, whether a mismatch is a recoverable wrong-shape field or a
/// genuine decode error — the decision has to be made up front, since once a length-delimited
/// payload starts being consumed a later error inside it is no longer safe to paper over with
/// `skip_field`.
fn field_wire_type_check_expr(field: &FieldInfo) -> String {
    let primary = field_wire_type_name(&field.data_type);
    if field.repeated && field.data_type.is_packable() {
        format!("matches!(wire_type, protoforge_runtime::encoding::WireType::{primary} | protoforge_runtime::encoding::WireType::LengthDelimited)")
    } else {
        format!("wire_type == protoforge_runtime::encoding::WireType::{primary}")
    }
}

/// A free function path usable as a `KE`/`KL`/`VE`/`VL`/`KM`/`VM` argument to
/// `protoforge_runtime::encoding::btree_map`'s generic map codec, for a map key or value type.
/// Map entries are always decoded strictly, so no `ignore_incorrect_types` wiring is needed here.
fn codec_fn_path(collection: &ModuleCollection, data_type: &DataType, op: &str) -> String {
    match data_type {
        DataType::Enum(name) => {
            let enum_ident = collection.enum_info(name).map(|e| e.rust_name.clone()).unwrap_or_else(|| "i32".to_string());
            // A map key/value codec function must be generic in its buffer type to unify with
            // whichever `Buf`/`BufMut` the surrounding `btree_map::{encode,merge,encoded_len}`
            // call was instantiated with; a block whose tail expression is a nested generic `fn`
            // item gives an inline, uniquely-named adapter without widening this function's
            // return type to "arbitrary expression".
            match op {
                "encode" => format!(
                    "{{ fn __adapt<B: protoforge_runtime::bytes::BufMut>(tag: u32, v: &{enum_ident}, buf: &mut B) {{ \
                     protoforge_runtime::encoding::int32::encode(tag, &(*v as i32), buf) }} __adapt }}"
                ),
                "encoded_len" => format!(
                    "{{ fn __adapt(tag: u32, v: &{enum_ident}) -> usize {{ protoforge_runtime::encoding::int32::encoded_len(tag, &(*v as i32)) }} __adapt }}"
                ),
                _ => format!(
                    "{{ fn __adapt<B: protoforge_runtime::bytes::Buf>(wire_type: protoforge_runtime::encoding::WireType, v: &mut {enum_ident}, buf: &mut B, ctx: protoforge_runtime::encoding::DecodeContext) -> ::std::result::Result<(), protoforge_runtime::DecodeError> {{ \
                     let mut raw = 0i32; protoforge_runtime::encoding::int32::merge(wire_type, &mut raw, buf, ctx)?; \
                     *v = {enum_ident}::from_i32(raw).unwrap_or_default(); ::std::result::Result::Ok(()) }} __adapt }}"
                ),
            }
        }
        other => format!("protoforge_runtime::encoding::{}::{op}", scalar_codec_mod(other)),
    }
}

impl<'a> Bindings for ModelBindings<'a> {
    fn foreach(&self, tag: &str, env: &Environment) -> Result<Vec<Environment>, BuildError> {
        match tag {
            "MODULE" => Ok(self
                .collection
                .modules
                .keys()
                .map(|module| {
                    let mut sub = env.clone();
                    sub.insert(MODULE_NAME.to_string(), module.to_string());
                    sub
                })
                .collect()),

            "ENUM" => {
                let module_name = env.get(MODULE_NAME).expect("MODULE_NAME bound");
                let names: Vec<String> = self
                    .collection
                    .modules
                    .iter()
                    .find(|(m, _)| m.to_string() == *module_name)
                    .map(|(_, info)| info.enums.values().map(|e| e.rust_name.clone()).collect())
                    .unwrap_or_default();
                Ok(names
                    .into_iter()
                    .map(|name| {
                        let mut sub = env.clone();
                        sub.insert(ENUM_NAME.to_string(), name.clone());
                        sub.insert(ENUM_NAME_ESCAPED.to_string(), name.clone());
                        sub.insert(ENUM_TYPE_IDENT.to_string(), name);
                        sub
                    })
                    .collect())
            }

            "GLOBAL_ENUM_ALIAS" => Ok(self
                .collection
                .global_aliases()
                .into_iter()
                .filter_map(|(name, alias)| match alias {
                    GlobalAlias::Unique(GlobalAliasTarget::Enum(fq)) => {
                        let module = self.collection.owning_module.get(&fq)?.to_string();
                        Some((name, module))
                    }
                    _ => None,
                })
                .map(|(name, module)| {
                    let mut sub = env.clone();
                    sub.insert(ENUM_NAME.to_string(), name.clone());
                    sub.insert(ENUM_NAME_ESCAPED.to_string(), name.clone());
                    sub.insert(ENUM_TYPE_IDENT.to_string(), name);
                    sub.insert(ALIAS_MODULE_NAME.to_string(), module);
                    sub
                })
                .collect()),

            "ENUM_MEMBER" => {
                let module_name = env.get(MODULE_NAME).expect("MODULE_NAME bound");
                let enum_name = env.get(ENUM_NAME).expect("ENUM_NAME bound");
                let members = self
                    .collection
                    .modules
                    .iter()
                    .find(|(m, _)| m.to_string() == *module_name)
                    .and_then(|(_, info)| info.enums.values().find(|e| &e.rust_name == enum_name))
                    .map(|e| e.members.clone())
                    .unwrap_or_default();
                let mut members = members;
                members.sort_by_key(|m| m.number);
                Ok(members
                    .into_iter()
                    .map(|member| {
                        let mut sub = env.clone();
                        sub.insert(ENUM_MEMBER_NAME.to_string(), member.rust_name);
                        sub.insert(ENUM_MEMBER_VALUE.to_string(), member.number.to_string());
                        sub
                    })
                    .collect())
            }

            "MESSAGE" => {
                let module_name = env.get(MODULE_NAME).expect("MODULE_NAME bound");
                let names: Vec<String> = self
                    .collection
                    .modules
                    .iter()
                    .find(|(m, _)| m.to_string() == *module_name)
                    .map(|(_, info)| info.messages.values().map(|m| m.rust_name.clone()).collect())
                    .unwrap_or_default();
                Ok(names
                    .into_iter()
                    .map(|name| {
                        let mut sub = env.clone();
                        sub.insert(MESSAGE_NAME.to_string(), name.clone());
                        sub.insert(MESSAGE_NAME_ESCAPED.to_string(), name.clone());
                        sub.insert(MESSAGE_TYPE_IDENT.to_string(), name);
                        sub
                    })
                    .collect())
            }

            "GLOBAL_MESSAGE_ALIAS" => Ok(self
                .collection
                .global_aliases()
                .into_iter()
                .filter_map(|(name, alias)| match alias {
                    GlobalAlias::Unique(GlobalAliasTarget::Message(fq)) => {
                        let module = self.collection.owning_module.get(&fq)?.to_string();
                        Some((name, module))
                    }
                    _ => None,
                })
                .map(|(name, module)| {
                    let mut sub = env.clone();
                    sub.insert(MESSAGE_NAME.to_string(), name.clone());
                    sub.insert(MESSAGE_NAME_ESCAPED.to_string(), name.clone());
                    sub.insert(MESSAGE_TYPE_IDENT.to_string(), name);
                    sub.insert(ALIAS_MODULE_NAME.to_string(), module);
                    sub
                })
                .collect()),

            "MESSAGE_FIELD_GROUP" => {
                let message = self.current_message(env)?;
                let message_ident = env.get(MESSAGE_TYPE_IDENT).expect("MESSAGE_TYPE_IDENT bound").clone();
                Ok(field_groups(message)
                    .into_iter()
                    .map(|group| {
                        let mut sub = env.clone();
                        let group_type_ident = format!("{message_ident}{}", to_upper_camel(&group.rust_name));
                        sub.insert(FIELD_GROUP_NAME.to_string(), group.rust_name.clone());
                        sub.insert(FIELD_GROUP_DEFAULT.to_string(), default_value_expr(self.collection, &group));
                        sub.insert(
                            FIELD_GROUP_RUST_TYPE.to_string(),
                            field_group_rust_type(self.collection, &group, &group_type_ident),
                        );
                        sub.insert(FIELD_GROUP_DYN_VALUE_EXPR.to_string(), field_group_dyn_value_expr(&group, &group_type_ident));
                        sub.insert(FIELD_GROUP_DEBUG_EXPR.to_string(), field_group_debug_expr(&group));
                        sub.insert(FIELD_GROUP_NAME_LITERAL.to_string(), format!("{:?}", group.schema_name));
                        sub.insert(FIELD_GROUP_TYPE_IDENT.to_string(), group_type_ident);
                        sub
                    })
                    .collect())
            }

            "MESSAGE_FIELD_IN_GROUP" => {
                let message = self.current_message(env)?;
                let group = self.current_field_group(env, message)?;
                Ok(group
                    .members
                    .iter()
                    .map(|field| {
                        let mut sub = env.clone();
                        sub.insert(FIELD_NUMBER.to_string(), field.number.to_string());
                        sub.insert(FIELD_IS_OPTIONAL.to_string(), field.optional.to_string());
                        sub.insert(FIELD_DATA_TYPE.to_string(), data_type_tag(&field.data_type).to_string());
                        sub.insert(
                            FIELD_RUST_TYPE.to_string(),
                            scalar_rust_type_boxed(self.collection, &field.data_type, field.boxed),
                        );
                        sub.insert(FIELD_VARIANT_IDENT.to_string(), to_upper_camel(&field.schema_name));
                        sub.insert(FIELD_DEFAULT.to_string(), field_default_expr(self.collection, field));
                        let group_type_ident = env.get(FIELD_GROUP_TYPE_IDENT).expect("FIELD_GROUP_TYPE_IDENT bound").clone();
                        sub.insert(FIELD_ENCODE_STMT.to_string(), field_encode_stmt(self.collection, &group, field));
                        sub.insert(FIELD_MERGE_ARM_BODY.to_string(), field_merge_arm_body(self.collection, &group, field, &group_type_ident));
                        sub.insert(FIELD_LEN_EXPR.to_string(), field_len_expr(self.collection, &group, field));
                        sub.insert(FIELD_WIRE_TYPE_CHECK_EXPR.to_string(), field_wire_type_check_expr(field));
                        sub.insert(FIELD_EXPECTED_WIRE_TYPE_EXPR.to_string(), field_expected_wire_type_expr(field));
                        if let DataType::Enum(name) = &field.data_type {
                            if let Some(info) = self.collection.enum_info(name) {
                                sub.insert(FIELD_ENUM_TYPE_IDENT.to_string(), info.rust_name.clone());
                            }
                        }
                        if let DataType::Message(name) = &field.data_type {
                            if let Some(info) = self.collection.message(name) {
                                sub.insert(FIELD_SUBMESSAGE_TYPE_IDENT.to_string(), info.rust_name.clone());
                            }
                        }
                        if let DataType::Map(key, value) = &field.data_type {
                            sub.insert(FIELD_KEY_DATA_TYPE.to_string(), data_type_tag(key).to_string());
                            sub.insert(FIELD_VALUE_DATA_TYPE.to_string(), data_type_tag(value).to_string());
                        }
                        sub
                    })
                    .collect())
            }

            other => Err(BuildError::UnknownBinding {
                template: "runtime".to_string(),
                name: format!("FOREACH_{other}"),
            }),
        }
    }

    fn eval_if(&self, tag: &str, env: &Environment) -> Result<bool, BuildError> {
        match tag {
            "IF_MESSAGE_FIELD_GROUP_IS_ONEOF" => {
                let message = self.current_message(env)?;
                Ok(self.current_field_group(env, message)?.members.len() > 1)
            }
            "IF_MESSAGE_FIELD_GROUP_IS_NOT_ONEOF" => {
                let message = self.current_message(env)?;
                Ok(self.current_field_group(env, message)?.members.len() == 1)
            }
            "IF_MESSAGE_FIELD_TYPE_REPEATED" => {
                let message = self.current_message(env)?;
                let field = self.current_field(env, message)?;
                Ok(field.repeated && !matches!(field.data_type, DataType::Map(_, _)))
            }
            "IF_MESSAGE_FIELD_TYPE_NOT_REPEATED" => {
                let message = self.current_message(env)?;
                let field = self.current_field(env, message)?;
                Ok(!field.repeated && !matches!(field.data_type, DataType::Map(_, _)))
            }
            "IF_MESSAGE_FIELD_TYPE_MAP" => {
                let message = self.current_message(env)?;
                let field = self.current_field(env, message)?;
                Ok(matches!(field.data_type, DataType::Map(_, _)))
            }
            "IF_MESSAGE_FIELD_IS_OPTIONAL" => {
                let message = self.current_message(env)?;
                Ok(self.current_field(env, message)?.optional)
            }
            "IF_MESSAGE_FIELD_IS_NOT_OPTIONAL" => {
                let message = self.current_message(env)?;
                Ok(!self.current_field(env, message)?.optional)
            }
            "IF_MESSAGE_SUPPORTS_EQ_HASH" => {
                let message = self.current_message(env)?;
                Ok(message_supports_eq_hash(self.collection, message))
            }
            "IF_MESSAGE_DOES_NOT_SUPPORT_EQ_HASH" => {
                let message = self.current_message(env)?;
                Ok(!message_supports_eq_hash(self.collection, message))
            }
            other => Err(BuildError::UnknownBinding {
                template: "runtime".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

/// Escapes a Rust identifier the way the stub and runtime templates expect it, given a schema
/// local name. Exposed for [`crate::stub`], which needs the same transforms outside a template.
pub(crate) fn rust_field_ident(schema_name: &str) -> String {
    to_snake(schema_name)
}

pub(crate) fn rust_type_ident(schema_name: &str) -> String {
    to_upper_camel(schema_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumInfo, EnumMember, ModuleInfo};
    use crate::module::Module;
    use std::collections::BTreeMap;

    fn sample_collection() -> ModuleCollection {
        let module = Module::from_parts(["greet"]);
        let fq_enum = crate::fully_qualified_name::FullyQualifiedName::from(".greet.Mood");
        let mut collection = ModuleCollection::default();
        let info = collection.module_mut(module.clone());
        info.enums.insert(
            fq_enum.clone(),
            EnumInfo {
                fq_name: fq_enum.clone(),
                rust_name: "Mood".to_string(),
                members: vec![
                    EnumMember { rust_name: "Happy".to_string(), number: 1 },
                    EnumMember { rust_name: "Unspecified".to_string(), number: 0 },
                ],
            },
        );
        collection.owning_module.insert(fq_enum, module);
        collection
    }

    #[test]
    fn foreach_module_binds_module_name() {
        let collection = sample_collection();
        let bindings = ModelBindings::new(&collection);
        let envs = bindings.foreach("MODULE", &Environment::new()).unwrap();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].get(MODULE_NAME).unwrap(), "greet");
    }

    #[test]
    fn foreach_enum_member_is_sorted_by_number() {
        let collection = sample_collection();
        let bindings = ModelBindings::new(&collection);
        let mut env = Environment::new();
        env.insert(MODULE_NAME.to_string(), "greet".to_string());
        env.insert(ENUM_NAME.to_string(), "Mood".to_string());
        let envs = bindings.foreach("ENUM_MEMBER", &env).unwrap();
        let values: Vec<&str> = envs.iter().map(|e| e.get(ENUM_MEMBER_VALUE).unwrap().as_str()).collect();
        assert_eq!(values, vec!["0", "1"]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let collection = sample_collection();
        let bindings = ModelBindings::new(&collection);
        let err = bindings.foreach("NOT_A_REAL_TAG", &Environment::new()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownBinding { .. }));
    }
}
