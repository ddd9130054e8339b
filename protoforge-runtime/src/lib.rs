//! Runtime support consumed by generated message code: the wire-format codec, unknown-field
//! retention, and the schema-erased value tree used for dict-style export.

// Re-export the bytes crate for use within generated code.
pub use bytes;

mod debug;
mod dyn_value;
mod error;
mod message;
mod unknown;

#[doc(hidden)]
pub mod encoding;

pub use crate::debug::{truncated, Truncated};
pub use crate::dyn_value::{DynValue, DynValueKey};
pub use crate::encoding::length_delimiter::{
    decode_length_delimiter, encode_length_delimiter, length_delimiter_len,
};
pub use crate::error::{DecodeError, EncodeError};
pub use crate::message::Message;
pub use crate::unknown::UnknownFields;
