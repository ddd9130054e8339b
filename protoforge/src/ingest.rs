//! Turns a `prost_types::FileDescriptorSet` into a [`ModuleCollection`].
//!
//! This is the compiler's only point of contact with raw descriptors: `.proto` text ingestion via
//! `protoc` happens upstream of us (we receive an already-parsed `CodeGeneratorRequest`), and
//! nothing past this module ever looks at a `prost_types` type again.

use std::collections::{BTreeMap, HashSet};

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};

use crate::error::{Error, RangeError, SchemaError};
use crate::fully_qualified_name::FullyQualifiedName;
use crate::ident::{to_snake, to_upper_camel};
use crate::message_graph::MessageGraph;
use crate::model::{DataType, EnumInfo, EnumMember, FieldGroupInfo, FieldInfo, MessageInfo, ModuleCollection};
use crate::module::Module;
use crate::syntax::Syntax;

/// The highest field number proto3 permits; numbers above this can't be encoded in a tag's
/// 29-bit field-number bitfield.
const MAX_FIELD_NUMBER: i32 = 536_870_911;

/// Field numbers in this range are reserved for internal protobuf implementation use and are
/// never legal in a schema.
const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<i32> = 19_000..=19_999;

/// In-progress marker for module-level import-cycle detection, distinct from the (allowed)
/// reference cycles between message *types* that `MessageGraph` tracks.
#[derive(PartialEq, Eq, Clone, Copy)]
enum VisitState {
    InProgress,
    Done,
}

pub(crate) fn ingest(files: &[FileDescriptorProto]) -> Result<ModuleCollection, Error> {
    for file in files {
        Syntax::parse(file.syntax.as_deref(), file.name())?;
    }

    check_import_cycles(files)?;

    let message_graph = MessageGraph::new(files.iter());
    let mut collection = ModuleCollection::default();
    let mut map_entries: BTreeMap<String, DescriptorProto> = BTreeMap::new();

    // Pass 1: register every message and enum's fully-qualified name and owning module, so
    // cross-message and cross-file type references can resolve regardless of declaration order.
    // Also collects every synthetic map-entry message by its fully-qualified name, since a `map`
    // field's `type_name` points at one of these rather than carrying the key/value types inline.
    for file in files {
        let module = Module::from_protobuf_package_name(file.package());
        for message in &file.message_type {
            register_message(&mut collection, &mut map_entries, &module, file.package(), &[], message)?;
        }
        for e in &file.enum_type {
            register_enum(&mut collection, &module, file.package(), &[], e)?;
        }
    }

    // Pass 2: lower fields now that every type name is resolvable.
    for file in files {
        let module = Module::from_protobuf_package_name(file.package());
        for message in &file.message_type {
            lower_message(&mut collection, &message_graph, &map_entries, &module, file.package(), &[], message)?;
        }
    }

    validate_field_numbers(&collection)?;
    validate_type_references(&collection)?;

    Ok(collection)
}

/// Checks every declared field number against the ranges proto3 allows. `prost_types` descriptor
/// fields are already `i32`, but a `CodeGeneratorRequest` arrives from an external `protoc`
/// process and isn't guaranteed to have been validated against these rules before it reaches us.
fn validate_field_numbers(collection: &ModuleCollection) -> Result<(), RangeError> {
    for module_info in collection.modules.values() {
        for message in module_info.messages.values() {
            let all_fields = message
                .fields
                .iter()
                .chain(message.field_groups.iter().flat_map(|g| g.members.iter()));
            for field in all_fields {
                if field.number < 1 || field.number > MAX_FIELD_NUMBER {
                    return Err(RangeError::FieldNumberOutOfRange {
                        message: message.fq_name.as_ref().to_owned(),
                        number: field.number,
                    });
                }
                if RESERVED_FIELD_NUMBERS.contains(&field.number) {
                    return Err(RangeError::ReservedFieldNumber {
                        message: message.fq_name.as_ref().to_owned(),
                        number: field.number,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Checks that every `Enum`/`Message`-typed field resolved to a type this compilation unit
/// actually has a definition for. Descriptors from a well-formed `protoc` invocation always
/// satisfy this, but a hand-assembled `CodeGeneratorRequest` (as in a `protoc-gen-rust --raw`
/// style direct invocation, or a test fixture) might not include every transitively referenced
/// file.
fn validate_type_references(collection: &ModuleCollection) -> Result<(), SchemaError> {
    for module_info in collection.modules.values() {
        for message in module_info.messages.values() {
            let all_fields = message
                .fields
                .iter()
                .chain(message.field_groups.iter().flat_map(|g| g.members.iter()));
            for field in all_fields {
                check_type_reference(collection, &message.fq_name, &field.data_type)?;
            }
        }
    }
    Ok(())
}

fn check_type_reference(
    collection: &ModuleCollection,
    owner: &FullyQualifiedName,
    data_type: &DataType,
) -> Result<(), SchemaError> {
    match data_type {
        DataType::Message(type_name) => {
            if collection.message(type_name).is_none() {
                return Err(SchemaError::UnresolvedType {
                    name: owner.as_ref().to_owned(),
                    type_name: type_name.as_ref().to_owned(),
                });
            }
        }
        DataType::Enum(type_name) => {
            if collection.enum_info(type_name).is_none() {
                return Err(SchemaError::UnresolvedType {
                    name: owner.as_ref().to_owned(),
                    type_name: type_name.as_ref().to_owned(),
                });
            }
        }
        DataType::Map(key, value) => {
            check_type_reference(collection, owner, key)?;
            check_type_reference(collection, owner, value)?;
        }
        _ => {}
    }
    Ok(())
}

fn check_import_cycles(files: &[FileDescriptorProto]) -> Result<(), SchemaError> {
    let by_name: BTreeMap<&str, &FileDescriptorProto> =
        files.iter().map(|f| (f.name(), f)).collect();
    let mut state: BTreeMap<&str, VisitState> = BTreeMap::new();

    fn visit<'a>(
        name: &'a str,
        by_name: &BTreeMap<&'a str, &'a FileDescriptorProto>,
        state: &mut BTreeMap<&'a str, VisitState>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), SchemaError> {
        match state.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                stack.push(name);
                let start = stack.iter().position(|&n| n == name).unwrap();
                return Err(SchemaError::ImportCycle {
                    cycle: stack[start..].join(" -> "),
                });
            }
            None => {}
        }

        state.insert(name, VisitState::InProgress);
        stack.push(name);

        if let Some(file) = by_name.get(name) {
            for dep in &file.dependency {
                visit(dep, by_name, state, stack)?;
            }
        }

        stack.pop();
        state.insert(name, VisitState::Done);
        Ok(())
    }

    for file in files {
        let mut stack = Vec::new();
        visit(file.name(), &by_name, &mut state, &mut stack)?;
    }
    Ok(())
}

fn register_message(
    collection: &mut ModuleCollection,
    map_entries: &mut BTreeMap<String, DescriptorProto>,
    module: &Module,
    package: &str,
    type_path: &[String],
    message: &DescriptorProto,
) -> Result<(), SchemaError> {
    if !message.extension_range.is_empty() || !message.extension.is_empty() {
        return Err(SchemaError::ExtensionsUnsupported {
            message: message.name().to_owned(),
        });
    }

    let fq_name = FullyQualifiedName::new(package, type_path, message.name());
    collection.owning_module.insert(fq_name.clone(), module.clone());

    let nested_path: Vec<String> = type_path
        .iter()
        .cloned()
        .chain(std::iter::once(message.name().to_owned()))
        .collect();

    for nested in &message.nested_type {
        if is_map_entry(nested) {
            let entry_fq_name = FullyQualifiedName::new(package, &nested_path, nested.name());
            map_entries.insert(entry_fq_name.as_ref().to_owned(), nested.clone());
            continue;
        }
        register_message(collection, map_entries, module, package, &nested_path, nested)?;
    }

    if !message.enum_type.is_empty() {
        return Err(SchemaError::NestedEnumsUnsupported {
            message: message.name().to_owned(),
        });
    }

    Ok(())
}

fn register_enum(
    collection: &mut ModuleCollection,
    module: &Module,
    package: &str,
    type_path: &[String],
    e: &EnumDescriptorProto,
) -> Result<(), SchemaError> {
    let fq_name = FullyQualifiedName::new(package, type_path, e.name());
    collection.owning_module.insert(fq_name.clone(), module.clone());

    let members: Vec<EnumMember> = e
        .value
        .iter()
        .map(|v| EnumMember {
            rust_name: to_upper_camel(v.name()),
            number: v.number(),
        })
        .collect();

    if !members.iter().any(|m| m.number == 0) {
        return Err(SchemaError::EnumMissingZero {
            enum_name: e.name().to_owned(),
        });
    }

    collection.module_mut(module.clone()).enums.insert(
        fq_name.clone(),
        EnumInfo {
            fq_name,
            rust_name: to_upper_camel(e.name()),
            members,
        },
    );
    Ok(())
}

/// Structural map-entry detection: a nested message is a map entry iff it carries the
/// `map_entry` option, which protoc sets for every `map<K, V>` field's implicit `Entry` message.
fn is_map_entry(message: &DescriptorProto) -> bool {
    message.options.as_ref().is_some_and(|o| o.map_entry())
}

fn lower_message(
    collection: &mut ModuleCollection,
    message_graph: &MessageGraph,
    map_entries: &BTreeMap<String, DescriptorProto>,
    module: &Module,
    package: &str,
    type_path: &[String],
    message: &DescriptorProto,
) -> Result<(), SchemaError> {
    let fq_name = FullyQualifiedName::new(package, type_path, message.name());
    let rust_name = to_upper_camel(message.name());

    let mut fields = Vec::new();
    let mut groups: BTreeMap<i32, Vec<&FieldDescriptorProto>> = BTreeMap::new();
    let proto3_optional_oneofs = synthetic_oneof_indices(message);

    for field in &message.field {
        if field.r#type() == Type::Group {
            return Err(SchemaError::GroupsUnsupported {
                file: message.name().to_owned(),
            });
        }

        if let Some(oneof_index) = field.oneof_index {
            if !proto3_optional_oneofs.contains(&oneof_index) {
                groups.entry(oneof_index).or_default().push(field);
                continue;
            }
            // A synthetic one-member oneof: collapses back to a plain optional field.
        }

        fields.push(lower_field(collection, message_graph, map_entries, &fq_name, field, field.proto3_optional())?);
    }

    let mut field_groups = Vec::new();
    for (oneof_index, members) in groups {
        let oneof = &message.oneof_decl[oneof_index as usize];
        let mut lowered_members = Vec::new();
        for field in members {
            lowered_members.push(lower_field(collection, message_graph, map_entries, &fq_name, field, false)?);
        }
        let min_number = lowered_members
            .iter()
            .map(|f| f.number)
            .min()
            .ok_or_else(|| SchemaError::DuplicateName {
                module: module.to_string(),
                name: oneof.name().to_owned(),
            })?;
        field_groups.push(FieldGroupInfo {
            rust_name: to_upper_camel(oneof.name()),
            schema_name: oneof.name().to_owned(),
            min_number,
            members: lowered_members,
        });
    }
    field_groups.sort_by_key(|g| g.min_number);
    fields.sort_by_key(|f: &FieldInfo| f.number);

    check_struct_field_names_distinct(&rust_name, &fields, &field_groups)?;

    let module_info = collection.module_mut(module.clone());
    module_info.messages.insert(
        fq_name.clone(),
        MessageInfo {
            fq_name,
            rust_name,
            fields,
            field_groups,
        },
    );

    let nested_path: Vec<String> = type_path
        .iter()
        .cloned()
        .chain(std::iter::once(message.name().to_owned()))
        .collect();
    for nested in &message.nested_type {
        if is_map_entry(nested) {
            continue;
        }
        lower_message(collection, message_graph, map_entries, module, package, &nested_path, nested)?;
    }

    Ok(())
}

/// Two distinct schema fields (or a field and a oneof) can convert to the same `snake_case`/
/// `UpperCamelCase` Rust identifier (`my_field` vs. `myField`, or a field named `kind` alongside a
/// oneof also named `kind`); protoc guarantees the original names are distinct, but says nothing
/// about their conversions. Caught here rather than left to surface as a generated struct with two
/// fields of the same name, which `rustc` would reject with an error pointing at generated code the
/// caller never wrote.
fn check_struct_field_names_distinct(message: &str, fields: &[FieldInfo], field_groups: &[FieldGroupInfo]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for name in fields.iter().map(|f| &f.rust_name).chain(field_groups.iter().map(|g| &g.rust_name)) {
        if !seen.insert(name) {
            return Err(SchemaError::DuplicateFieldName {
                message: message.to_owned(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Indices of oneofs that are proto3 synthetic-optional wrappers rather than real field groups:
/// every field in the oneof has `proto3_optional` set.
fn synthetic_oneof_indices(message: &DescriptorProto) -> HashSet<i32> {
    message
        .field
        .iter()
        .filter(|f| f.proto3_optional())
        .filter_map(|f| f.oneof_index)
        .collect()
}

fn lower_field(
    collection: &ModuleCollection,
    message_graph: &MessageGraph,
    map_entries: &BTreeMap<String, DescriptorProto>,
    owner_fq_name: &FullyQualifiedName,
    field: &FieldDescriptorProto,
    optional: bool,
) -> Result<FieldInfo, SchemaError> {
    let data_type = resolve_data_type(collection, map_entries, field)?;
    // A map field is declared `repeated` of an entry message at the descriptor level, but lowers
    // to a single `DataType::Map` rather than a `Vec`.
    let repeated = field.label() == Label::Repeated && !matches!(data_type, DataType::Map(_, _));

    let boxed = match &data_type {
        DataType::Message(inner) if !repeated => {
            message_graph.is_recursive(owner_fq_name.as_ref(), inner.as_ref())
        }
        _ => false,
    };

    Ok(FieldInfo {
        rust_name: to_snake(field.name()),
        schema_name: field.name().to_owned(),
        number: field.number(),
        data_type,
        repeated,
        optional,
        boxed,
    })
}

fn resolve_data_type(
    collection: &ModuleCollection,
    map_entries: &BTreeMap<String, DescriptorProto>,
    field: &FieldDescriptorProto,
) -> Result<DataType, SchemaError> {
    use Type::*;
    Ok(match field.r#type() {
        Bool => DataType::Bool,
        Int32 => DataType::Int32,
        Int64 => DataType::Int64,
        Uint32 => DataType::Uint32,
        Uint64 => DataType::Uint64,
        Sint32 => DataType::Sint32,
        Sint64 => DataType::Sint64,
        Fixed32 => DataType::Fixed32,
        Fixed64 => DataType::Fixed64,
        Sfixed32 => DataType::Sfixed32,
        Sfixed64 => DataType::Sfixed64,
        Float => DataType::Float,
        Double => DataType::Double,
        String => DataType::String,
        Bytes => DataType::Bytes,
        Enum => DataType::Enum(FullyQualifiedName::from_type_name(field.type_name())),
        Message => {
            if let Some(entry) = map_entries.get(field.type_name()) {
                resolve_map_entry(collection, map_entries, field, entry)?
            } else {
                DataType::Message(FullyQualifiedName::from_type_name(field.type_name()))
            }
        }
        Group => {
            return Err(SchemaError::GroupsUnsupported {
                file: field.name().to_owned(),
            })
        }
    })
}

/// Resolves a map field's entry message (fields 1 = `key`, 2 = `value`) into `DataType::Map`.
fn resolve_map_entry(
    collection: &ModuleCollection,
    map_entries: &BTreeMap<String, DescriptorProto>,
    field: &FieldDescriptorProto,
    entry: &DescriptorProto,
) -> Result<DataType, SchemaError> {
    let key_field = entry
        .field
        .iter()
        .find(|f| f.number() == 1)
        .ok_or_else(|| malformed_map_entry(field))?;
    let value_field = entry
        .field
        .iter()
        .find(|f| f.number() == 2)
        .ok_or_else(|| malformed_map_entry(field))?;

    let key_type = resolve_data_type(collection, map_entries, key_field)?;
    let value_type = resolve_data_type(collection, map_entries, value_field)?;

    Ok(DataType::Map(Box::new(key_type), Box::new(value_type)))
}

fn malformed_map_entry(field: &FieldDescriptorProto) -> SchemaError {
    SchemaError::MalformedMapEntry {
        field: field.name().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::FileDescriptorProto;

    fn file(name: &str, package: &str, deps: &[&str]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_owned()),
            package: Some(package.to_owned()),
            syntax: Some("proto3".to_owned()),
            dependency: deps.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_proto2_file() {
        let mut f = file("a.proto", "pkg", &[]);
        f.syntax = Some("proto2".to_owned());
        let err = ingest(&[f]).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnsupportedSyntax { .. })));
    }

    #[test]
    fn detects_import_cycle() {
        let a = file("a.proto", "pkg", &["b.proto"]);
        let b = file("b.proto", "pkg", &["a.proto"]);
        let err = ingest(&[a, b]).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::ImportCycle { .. })));
    }

    #[test]
    fn rejects_field_number_out_of_range() {
        let msg = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("x".to_owned()),
                number: Some(536_870_912),
                r#type: Some(Type::Int32 as i32),
                label: Some(Label::Optional as i32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut f = file("a.proto", "pkg", &[]);
        f.message_type = vec![msg];
        let err = ingest(&[f]).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::FieldNumberOutOfRange { .. })));
    }

    #[test]
    fn rejects_reserved_field_number() {
        let msg = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("x".to_owned()),
                number: Some(19_500),
                r#type: Some(Type::Int32 as i32),
                label: Some(Label::Optional as i32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut f = file("a.proto", "pkg", &[]);
        f.message_type = vec![msg];
        let err = ingest(&[f]).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::ReservedFieldNumber { .. })));
    }

    #[test]
    fn rejects_unresolved_message_type() {
        let msg = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("b".to_owned()),
                number: Some(1),
                r#type: Some(Type::Message as i32),
                type_name: Some(".pkg.Missing".to_owned()),
                label: Some(Label::Optional as i32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut f = file("a.proto", "pkg", &[]);
        f.message_type = vec![msg];
        let err = ingest(&[f]).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnresolvedType { .. })));
    }

    #[test]
    fn accepts_acyclic_imports() {
        let a = file("a.proto", "pkg", &["b.proto"]);
        let b = file("b.proto", "pkg", &[]);
        assert!(ingest(&[a, b]).is_ok());
    }

    #[test]
    fn message_type_reference_cycles_are_allowed() {
        let msg_a = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("b".to_owned()),
                number: Some(1),
                r#type: Some(Type::Message as i32),
                type_name: Some(".pkg.B".to_owned()),
                label: Some(Label::Optional as i32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let msg_b = DescriptorProto {
            name: Some("B".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("a".to_owned()),
                number: Some(1),
                r#type: Some(Type::Message as i32),
                type_name: Some(".pkg.A".to_owned()),
                label: Some(Label::Optional as i32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut f = file("a.proto", "pkg", &[]);
        f.message_type = vec![msg_a, msg_b];
        let collection = ingest(&[f]).expect("message cycles are not schema errors");
        let module = Module::from_protobuf_package_name("pkg");
        let info = &collection.modules[&module];
        let a = info.messages.get(&FullyQualifiedName::from("pkg.A")).or_else(|| {
            info.messages
                .values()
                .find(|m| m.rust_name == "A")
        });
        assert!(a.is_some());
    }

    #[test]
    fn rejects_fields_colliding_after_identifier_conversion() {
        let msg = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![
                FieldDescriptorProto {
                    name: Some("my_field".to_owned()),
                    number: Some(1),
                    r#type: Some(Type::Int32 as i32),
                    label: Some(Label::Optional as i32),
                    ..Default::default()
                },
                FieldDescriptorProto {
                    name: Some("myField".to_owned()),
                    number: Some(2),
                    r#type: Some(Type::Int32 as i32),
                    label: Some(Label::Optional as i32),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut f = file("a.proto", "pkg", &[]);
        f.message_type = vec![msg];
        let err = ingest(&[f]).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateFieldName { .. })));
    }
}
