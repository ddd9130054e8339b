//! Stub emitter (spec component C).
//!
//! The generated runtime (`codegen`) is a real `.rs` source file; the stub emitted here is a
//! separate, non-compiling description of its public surface; the generated module's types are
//! opaque to any tool that doesn't also evaluate the template, and downstream documentation and
//! schema-review tooling benefit from a flat listing that doesn't require parsing field tables out
//! of macro-generated code. One stub file is produced per compile, mirroring every module, enum,
//! and message the collection contains, plus the cross-module alias table.

use std::fmt::Write as _;

use crate::model::{DataType, FieldGroupInfo, FieldInfo, GlobalAlias, GlobalAliasTarget, MessageInfo, ModuleCollection, ModuleInfo};

pub(crate) fn emit_stub(collection: &ModuleCollection) -> String {
    let mut out = String::new();
    out.push_str("// Generated surface description. Not compiled; mirrors the generated module's public API\n");
    out.push_str("// for tools that review or document a schema without evaluating the runtime template.\n\n");

    for module_info in collection.modules.values() {
        write_module(&mut out, collection, module_info);
    }

    out.push_str("// Global aliases\n");
    for (name, alias) in collection.global_aliases() {
        match alias {
            GlobalAlias::Unique(GlobalAliasTarget::Message(fq)) => {
                let _ = writeln!(out, "pub type {name} = {}::{name}; // {}", owning_module_path(collection, &fq), fq.as_ref());
            }
            GlobalAlias::Unique(GlobalAliasTarget::Enum(fq)) => {
                let _ = writeln!(out, "pub type {name} = {}::{name}; // {}", owning_module_path(collection, &fq), fq.as_ref());
            }
            GlobalAlias::Ambiguous => {
                let _ = writeln!(out, "// {name}: defined in multiple modules, no alias generated");
            }
        }
    }

    out
}

fn owning_module_path(collection: &ModuleCollection, fq: &crate::fully_qualified_name::FullyQualifiedName) -> String {
    collection
        .owning_module
        .get(fq)
        .map(|m| m.to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn write_module(out: &mut String, collection: &ModuleCollection, module_info: &ModuleInfo) {
    let _ = writeln!(out, "pub mod {} {{", module_info.module);

    for enum_info in module_info.enums.values() {
        let _ = writeln!(out, "    pub enum {} {{", enum_info.rust_name);
        let mut members = enum_info.members.clone();
        members.sort_by_key(|m| m.number);
        for member in members {
            let _ = writeln!(out, "        {} = {},", member.rust_name, member.number);
        }
        out.push_str("    }\n\n");
    }

    for message in module_info.messages.values() {
        write_message(out, collection, message);
    }

    out.push_str("}\n\n");
}

fn write_message(out: &mut String, collection: &ModuleCollection, message: &MessageInfo) {
    let groups = field_groups(message);

    let _ = writeln!(out, "    pub struct {} {{", message.rust_name);
    for group in &groups {
        let numbers: Vec<String> = group.members.iter().map(|f| f.number.to_string()).collect();
        let _ = writeln!(
            out,
            "        pub {}: {};  // fields {}",
            group.rust_name,
            group_type(collection, group),
            numbers.join(", ")
        );
    }
    out.push_str("    }\n\n");

    let ctor_args: Vec<String> = groups.iter().map(|g| format!("{}: {}", g.rust_name, group_type(collection, g))).collect();
    let _ = writeln!(out, "    impl {} {{", message.rust_name);
    let _ = writeln!(out, "        pub fn new({}) -> Self;", ctor_args.join(", "));
    let _ = writeln!(
        out,
        "        pub fn from_bytes(data: &[u8], retain_unknown_fields: bool, ignore_incorrect_types: bool) -> Result<Self, DecodeError>;"
    );
    let _ = writeln!(
        out,
        "        pub fn parse_into(&mut self, data: &[u8], retain_unknown_fields: bool, ignore_incorrect_types: bool) -> Result<(), DecodeError>;"
    );
    out.push_str("        pub fn to_bytes(&self) -> Vec<u8>;\n");
    out.push_str("        pub fn to_dyn_value(&self) -> DynValue;\n");
    let _ = writeln!(out, "        pub fn copy(&self, {}) -> Self;", ctor_args.iter().map(|a| format!("{a} = ..")).collect::<Vec<_>>().join(", "));
    out.push_str("        pub fn has_unknown_fields(&self) -> bool;\n");
    out.push_str("        pub fn delete_unknown_fields(&mut self);\n");
    out.push_str("        pub fn get_unknown_fields(&self) -> Option<&UnknownFields>;\n");
    out.push_str("    }\n");
    out.push_str("    // Derives: PartialEq, Eq, Hash, Clone\n");
    out.push_str("    // Debug: hand-written, field-number order, bytes fields truncated past 64 bytes\n\n");
}

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

fn group_type(collection: &ModuleCollection, group: &FieldGroupInfo) -> String {
    if group.members.len() > 1 {
        let branches: Vec<String> = group.members.iter().map(|f| field_type(collection, f)).collect();
        return branches.join(" | ");
    }
    let field = &group.members[0];
    let base = field_type(collection, field);
    if field.optional {
        format!("{base} | None")
    } else {
        base
    }
}

fn field_type(collection: &ModuleCollection, field: &FieldInfo) -> String {
    let scalar = match &field.data_type {
        DataType::Bool => "bool".to_string(),
        DataType::Int32 | DataType::Sint32 | DataType::Sfixed32 => "i32".to_string(),
        DataType::Int64 | DataType::Sint64 | DataType::Sfixed64 => "i64".to_string(),
        DataType::Uint32 | DataType::Fixed32 => "u32".to_string(),
        DataType::Uint64 | DataType::Fixed64 => "u64".to_string(),
        DataType::Float => "f32".to_string(),
        DataType::Double => "f64".to_string(),
        DataType::String => "string".to_string(),
        DataType::Bytes => "bytes".to_string(),
        DataType::Enum(name) => collection.enum_info(name).map(|e| e.rust_name.clone()).unwrap_or_else(|| name.as_ref().to_string()),
        DataType::Message(name) => collection.message(name).map(|m| m.rust_name.clone()).unwrap_or_else(|| name.as_ref().to_string()),
        DataType::Map(key, value) => {
            return format!(
                "map({}, {})",
                field_type(
                    collection,
                    &FieldInfo {
                        rust_name: String::new(),
                        schema_name: String::new(),
                        number: 0,
                        data_type: (**key).clone(),
                        repeated: false,
                        optional: false,
                        boxed: false,
                    }
                ),
                field_type(
                    collection,
                    &FieldInfo {
                        rust_name: String::new(),
                        schema_name: String::new(),
                        number: 0,
                        data_type: (**value).clone(),
                        repeated: false,
                        optional: false,
                        boxed: false,
                    }
                )
            );
        }
    };
    if field.repeated {
        format!("list({scalar})")
    } else {
        scalar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fully_qualified_name::FullyQualifiedName;
    use crate::model::{EnumInfo, EnumMember, MessageInfo};
    use crate::module::Module;

    #[test]
    fn emits_enum_and_message_surface() {
        let mut collection = ModuleCollection::default();
        let module = Module::from_parts(["greet"]);
        let fq_enum = FullyQualifiedName::from(".greet.Mood");
        let fq_msg = FullyQualifiedName::from(".greet.Greeting");
        {
            let info = collection.module_mut(module.clone());
            info.enums.insert(
                fq_enum.clone(),
                EnumInfo {
                    fq_name: fq_enum.clone(),
                    rust_name: "Mood".to_string(),
                    members: vec![EnumMember { rust_name: "Unspecified".to_string(), number: 0 }],
                },
            );
            info.messages.insert(
                fq_msg.clone(),
                MessageInfo {
                    fq_name: fq_msg.clone(),
                    rust_name: "Greeting".to_string(),
                    fields: vec![FieldInfo {
                        rust_name: "text".to_string(),
                        schema_name: "text".to_string(),
                        number: 1,
                        data_type: DataType::String,
                        repeated: false,
                        optional: false,
                        boxed: false,
                    }],
                    field_groups: vec![],
                },
            );
        }
        collection.owning_module.insert(fq_enum, module.clone());
        collection.owning_module.insert(fq_msg, module);

        let stub = emit_stub(&collection);
        assert!(stub.contains("pub mod greet {"));
        assert!(stub.contains("pub enum Mood {"));
        assert!(stub.contains("pub struct Greeting {"));
        assert!(stub.contains("pub text: string;  // fields 1"));
        assert!(stub.contains("pub type Mood = greet::Mood;"));
        assert!(stub.contains("pub type Greeting = greet::Greeting;"));
    }
}
