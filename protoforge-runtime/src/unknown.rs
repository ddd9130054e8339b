use std::collections::BTreeMap;

use bytes::{Buf, BufMut};

use crate::encoding::{self, DecodeContext, WireType};
use crate::{DecodeError, Message};

/// The set of fields a message decoded but whose field number isn't declared by its schema.
///
/// Each field number maps to the raw, already-encoded bytes (key and value together) of every
/// occurrence of that field in the input, in the order they were read. Retaining raw bytes
/// rather than a decoded representation lets unknown fields round-trip byte-for-byte through a
/// decode/re-encode cycle without knowing their wire type's semantics ahead of time.
///
/// A `StartGroup`/`EndGroup` tag is never retained here: proto2 groups are rejected during
/// schema ingestion, so encountering one while decoding an unknown field is treated as malformed
/// input rather than data to preserve.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct UnknownFields {
    fields: BTreeMap<u32, Vec<u8>>,
}

impl UnknownFields {
    /// Creates an empty set of unknown fields.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns `true` if no unknown fields have been recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of distinct field numbers recorded.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns the raw encoded bytes recorded for `tag`, if any.
    pub fn get(&self, tag: u32) -> Option<&[u8]> {
        self.fields.get(&tag).map(Vec::as_slice)
    }

    /// Iterates over the field numbers and their raw encoded bytes, in field-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.fields.iter().map(|(&tag, bytes)| (tag, bytes.as_slice()))
    }

    /// Removes every recorded field.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl Message for UnknownFields {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        for bytes in self.fields.values() {
            buf.put_slice(bytes);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        _ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        let mut raw = Vec::new();
        encoding::encode_key(tag, wire_type, &mut raw);

        match wire_type {
            WireType::Varint => {
                let value = encoding::decode_varint(buf)?;
                encoding::encode_varint(value, &mut raw);
            }
            WireType::SixtyFourBit => {
                if buf.remaining() < 8 {
                    return Err(DecodeError::BufferUnderflow);
                }
                raw.extend_from_slice(&buf.copy_to_bytes(8));
            }
            WireType::ThirtyTwoBit => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::BufferUnderflow);
                }
                raw.extend_from_slice(&buf.copy_to_bytes(4));
            }
            WireType::LengthDelimited => {
                let len = encoding::decode_varint(buf)?;
                if len > buf.remaining() as u64 {
                    return Err(DecodeError::BufferUnderflow);
                }
                encoding::encode_varint(len, &mut raw);
                raw.extend_from_slice(&buf.copy_to_bytes(len as usize));
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(DecodeError::GroupNotSupported);
            }
        }

        self.fields.entry(tag).or_default().extend_from_slice(&raw);
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    fn clear(&mut self) {
        self.fields.clear();
    }
}
