//! Compiles a protobuf descriptor graph into Rust: a native message module (struct per message,
//! enum per enum, hand-rolled wire codec) plus a stub describing its public surface.
//!
//! The crate is driven as a `protoc` plugin (`src/bin/protoc-gen-rust.rs`): it receives an
//! already-parsed `prost_types::compiler::CodeGeneratorRequest` on stdin and writes a
//! `CodeGeneratorResponse` to stdout. [`codegen::generate`] is the entry point; everything else is
//! an internal stage of that pipeline.
//!
//! ```text
//! descriptors --ingest--> ModuleCollection --template::expand--> generated source
//!                                           \--stub::emit_stub--> stub text
//! ```

mod bindings;
mod codegen;
mod error;
mod fully_qualified_name;
mod ident;
mod ingest;
mod message_graph;
mod model;
mod module;
mod stub;
mod syntax;
mod template;

pub use codegen::generate;
pub use error::{BuildError, Error, RangeError, SchemaError};
