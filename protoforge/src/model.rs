//! The internal schema model that the ingester builds from a descriptor graph, and that codegen
//! and the stub emitter read from. Nothing in this module talks to `prost_types` — by the time a
//! [`ModuleCollection`] exists, the descriptor graph has been fully resolved and validated.

use std::collections::BTreeMap;

use crate::fully_qualified_name::FullyQualifiedName;
use crate::module::Module;

/// Every entity (message, enum) known to the compiler, keyed by Rust module and indexed for
/// lookup by fully-qualified schema name.
#[derive(Debug, Default)]
pub(crate) struct ModuleCollection {
    pub(crate) modules: BTreeMap<Module, ModuleInfo>,
    /// Resolves a schema-level fully-qualified name to the module that owns it, for cross-module
    /// type references.
    pub(crate) owning_module: BTreeMap<FullyQualifiedName, Module>,
}

impl ModuleCollection {
    pub(crate) fn module_mut(&mut self, module: Module) -> &mut ModuleInfo {
        self.modules.entry(module.clone()).or_insert_with(|| ModuleInfo {
            module,
            messages: BTreeMap::new(),
            enums: BTreeMap::new(),
        })
    }

    pub(crate) fn message(&self, name: &FullyQualifiedName) -> Option<&MessageInfo> {
        let module = self.owning_module.get(name)?;
        self.modules.get(module)?.messages.get(name)
    }

    pub(crate) fn enum_info(&self, name: &FullyQualifiedName) -> Option<&EnumInfo> {
        let module = self.owning_module.get(name)?;
        self.modules.get(module)?.enums.get(name)
    }

    /// Computes the cross-module global alias table: a generated type name present in exactly one
    /// module is promoted to a top-level alias in the generated source; a name shared by two or
    /// more modules is ambiguous and gets no alias. Computed on demand rather than cached on the
    /// collection, since it's only consulted by codegen and the stub emitter.
    pub(crate) fn global_aliases(&self) -> BTreeMap<String, GlobalAlias> {
        let mut aliases: BTreeMap<String, GlobalAlias> = BTreeMap::new();
        for module_info in self.modules.values() {
            for message in module_info.messages.values() {
                record_alias(&mut aliases, &message.rust_name, GlobalAliasTarget::Message(message.fq_name.clone()));
            }
            for enum_info in module_info.enums.values() {
                record_alias(&mut aliases, &enum_info.rust_name, GlobalAliasTarget::Enum(enum_info.fq_name.clone()));
            }
        }
        aliases
    }
}

fn record_alias(aliases: &mut BTreeMap<String, GlobalAlias>, rust_name: &str, target: GlobalAliasTarget) {
    aliases
        .entry(rust_name.to_string())
        .and_modify(|existing| *existing = GlobalAlias::Ambiguous)
        .or_insert(GlobalAlias::Unique(target));
}

#[derive(Debug, Clone)]
pub(crate) enum GlobalAlias {
    Unique(GlobalAliasTarget),
    Ambiguous,
}

#[derive(Debug, Clone)]
pub(crate) enum GlobalAliasTarget {
    Message(FullyQualifiedName),
    Enum(FullyQualifiedName),
}

/// Everything generated into a single Rust module, i.e. one `.proto` package.
#[derive(Debug)]
pub(crate) struct ModuleInfo {
    pub(crate) module: Module,
    pub(crate) messages: BTreeMap<FullyQualifiedName, MessageInfo>,
    pub(crate) enums: BTreeMap<FullyQualifiedName, EnumInfo>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnumInfo {
    pub(crate) fq_name: FullyQualifiedName,
    pub(crate) rust_name: String,
    pub(crate) members: Vec<EnumMember>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnumMember {
    pub(crate) rust_name: String,
    pub(crate) number: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct MessageInfo {
    pub(crate) fq_name: FullyQualifiedName,
    pub(crate) rust_name: String,
    /// Plain fields and proto3-optional-singleton fields, in ascending field-number order.
    pub(crate) fields: Vec<FieldInfo>,
    /// Real (multi-member) oneofs, a.k.a. field groups, by declaration order.
    pub(crate) field_groups: Vec<FieldGroupInfo>,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldInfo {
    pub(crate) rust_name: String,
    pub(crate) schema_name: String,
    pub(crate) number: i32,
    pub(crate) data_type: DataType,
    pub(crate) repeated: bool,
    /// `true` for a proto3 `optional` singleton field (a synthetic one-member oneof collapsed
    /// back into a scalar field with explicit presence tracking).
    pub(crate) optional: bool,
    /// Whether this field closes a recursive reference cycle and must be boxed.
    pub(crate) boxed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldGroupInfo {
    pub(crate) rust_name: String,
    pub(crate) schema_name: String,
    /// The field number of the group's lowest-numbered member; groups are ordered by this.
    pub(crate) min_number: i32,
    pub(crate) members: Vec<FieldInfo>,
}

/// The resolved type of a field, after map-entry detection and well-known-type substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DataType {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    String,
    Bytes,
    Enum(FullyQualifiedName),
    Message(FullyQualifiedName),
    /// A proto3 map field, detected structurally (a repeated message field whose type is an
    /// implicit `Entry` message with fields 1 (key) and 2 (value)) rather than from any dedicated
    /// descriptor bit.
    Map(Box<DataType>, Box<DataType>),
}

impl DataType {
    /// The wire type used to encode this field when not packed. Maps and messages always use
    /// `LEN`; see the `WireType` enum in `protoforge-runtime` for the authoritative mapping of
    /// scalar kinds.
    pub(crate) fn type_key(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Sint32 => "sint32",
            DataType::Sint64 => "sint64",
            DataType::Fixed32 => "fixed32",
            DataType::Fixed64 => "fixed64",
            DataType::Sfixed32 => "sfixed32",
            DataType::Sfixed64 => "sfixed64",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Bytes => "bytes",
            DataType::Enum(_) => "enum",
            DataType::Message(_) => "message",
            DataType::Map(_, _) => "map",
        }
    }

    /// Primitive (non-message, non-map) types are eligible for packed encoding/decoding and for
    /// the `ignore_incorrect_types` tolerance; enums count as primitive for this purpose since
    /// they're varint-encoded.
    pub(crate) fn is_primitive(&self) -> bool {
        !matches!(self, DataType::Message(_) | DataType::Map(_, _) | DataType::String | DataType::Bytes)
    }

    pub(crate) fn is_packable(&self) -> bool {
        self.is_primitive()
    }
}
