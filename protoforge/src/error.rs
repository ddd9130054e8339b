use thiserror::Error;

/// Errors produced while compiling a descriptor graph into Rust source.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// The descriptor graph itself is malformed or uses an unsupported `.proto` construct.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{file}: unsupported syntax {syntax:?}, only proto3 is supported")]
    UnsupportedSyntax { file: String, syntax: String },

    #[error("{file}: proto2 groups are not supported")]
    GroupsUnsupported { file: String },

    #[error("{message}: RPC services are not supported")]
    ServicesUnsupported { message: String },

    #[error("{message}: extensions are not supported")]
    ExtensionsUnsupported { message: String },

    #[error("{message}: nested enums are not supported")]
    NestedEnumsUnsupported { message: String },

    #[error("import cycle detected: {cycle}")]
    ImportCycle { cycle: String },

    #[error("{name}: unresolved type reference {type_name}")]
    UnresolvedType { name: String, type_name: String },

    #[error("duplicate entity name {name} in module {module}")]
    DuplicateName { module: String, name: String },

    #[error("message {message}: field or oneof {name} collides with another member after identifier conversion")]
    DuplicateFieldName { message: String, name: String },

    #[error("field {field}: map entry is missing its key (1) or value (2) field")]
    MalformedMapEntry { field: String },

    #[error("enum {enum_name} has no zero-valued member, which proto3 requires")]
    EnumMissingZero { enum_name: String },
}

/// A numeric value is out of the range the schema or the wire format allows.
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("field number {number} in {message} is out of the valid range 1..=536870911")]
    FieldNumberOutOfRange { message: String, number: i32 },

    #[error("field number {number} in {message} falls in the reserved range 19000-19999")]
    ReservedFieldNumber { message: String, number: i32 },

    #[error("enum value {value} for {enum_name} exceeds i32 range")]
    EnumValueOutOfRange { enum_name: String, value: i64 },
}

/// A failure while assembling or formatting the generated output.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("template {template} is missing a matching END_{marker} for {marker}")]
    UnbalancedTemplateBlock { template: String, marker: String },

    #[error("template {template} references unknown binding {name}")]
    UnknownBinding { template: String, name: String },

    #[cfg(feature = "format")]
    #[error("failed to format generated source for module {module}: {source}")]
    Format {
        module: String,
        #[source]
        source: syn::Error,
    },

    #[error("failed to encode CodeGeneratorResponse: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("failed to decode CodeGeneratorRequest: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
