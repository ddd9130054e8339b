//! Errors produced while encoding or decoding the wire format.

use thiserror::Error;

use crate::encoding::WireType;

/// A message failed to decode because the input buffer did not contain a valid encoding.
///
/// The error is 'best effort': in general it is not possible to pinpoint exactly why a buffer is
/// malformed, only that it is.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid varint")]
    InvalidVarint,

    #[error("length delimiter exceeds maximum usize value")]
    LengthDelimiterTooLarge,

    #[error("invalid wire type value: {0}")]
    InvalidWireType(u64),

    #[error("invalid tag value: 0")]
    InvalidTag,

    #[error("invalid wire type: {actual:?} (expected {expected:?})")]
    UnexpectedWireType { actual: WireType, expected: WireType },

    #[error("buffer underflow")]
    BufferUnderflow,

    #[error("delimited length exceeded")]
    DelimitedLengthExceeded,

    #[error("recursion limit reached")]
    RecursionLimitReached,

    #[error("invalid string value: data is not UTF-8 encoded")]
    InvalidUtf8,

    #[error("a proto2 group was encountered, but groups are not supported")]
    GroupNotSupported,

    /// An enum field decoded a valid varint that isn't a recognized member of its schema type.
    /// Distinct from [`DecodeError::UnexpectedWireType`]: the wire type was fine, the value
    /// wasn't. Tolerated the same way under `ignore_incorrect_types`, but callers that want to
    /// tell "wrong shape" from "wrong value" apart can match on this separately.
    #[error("field {field}: {value} is not a recognized enum value")]
    UnknownEnumValue { field: &'static str, value: i32 },
}

/// A message failed to encode because the destination buffer had insufficient capacity. Encoding
/// is otherwise infallible.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to encode message; insufficient buffer capacity (required: {required}, remaining: {remaining})")]
pub struct EncodeError {
    required: usize,
    remaining: usize,
}

impl EncodeError {
    pub fn new(required: usize, remaining: usize) -> EncodeError {
        EncodeError { required, remaining }
    }

    pub fn required_capacity(&self) -> usize {
        self.required
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}
