use bytes::{Buf, BufMut};

use crate::encoding::varint::{decode_varint, encode_varint, encoded_len_varint};
use crate::{DecodeError, EncodeError};

/// Encodes a length delimiter to the buffer.
///
/// An error will be returned if the buffer does not have sufficient capacity to encode the
/// delimiter.
pub fn encode_length_delimiter(length: usize, buf: &mut impl BufMut) -> Result<(), EncodeError> {
    let length = length as u64;
    let required = encoded_len_varint(length);
    let remaining = buf.remaining_mut();
    if required > remaining {
        return Err(EncodeError::new(required, remaining));
    }
    encode_varint(length, buf);
    Ok(())
}

/// Returns the encoded length of a length delimiter.
///
/// Callers may use this to ensure sufficient buffer capacity before calling
/// `encode_length_delimiter`. The returned size will be between 1 and 10, inclusive.
pub fn length_delimiter_len(length: usize) -> usize {
    encoded_len_varint(length as u64)
}

/// Decodes a length delimiter from the buffer.
///
/// This allows the length delimiter to be decoded independently of the message it prefixes.
///
/// An error may be returned in two cases:
///
///  * If the supplied buffer contains fewer than 10 bytes, then an error indicates that more
///    input is required to decode the full delimiter.
///  * If the supplied buffer contains 10 bytes or more, then the buffer contains an invalid
///    delimiter, and typically the buffer should be considered corrupt.
pub fn decode_length_delimiter(mut buf: impl Buf) -> Result<usize, DecodeError> {
    let length = decode_varint(&mut buf)?;
    if length > usize::MAX as u64 {
        return Err(DecodeError::LengthDelimiterTooLarge);
    }
    Ok(length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_length_delimiters() {
        for &length in &[0usize, 1, 127, 128, 16384, 2_097_151] {
            let mut buf = Vec::new();
            encode_length_delimiter(length, &mut buf).unwrap();
            assert_eq!(buf.len(), length_delimiter_len(length));
            assert_eq!(decode_length_delimiter(&buf[..]).unwrap(), length);
        }
    }

    #[test]
    fn rejects_insufficient_capacity() {
        let mut buf = [0u8; 0];
        let mut buf = &mut buf[..];
        assert!(encode_length_delimiter(128, &mut buf).is_err());
    }
}
