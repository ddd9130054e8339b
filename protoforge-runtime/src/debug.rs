use std::fmt;

/// Threshold, in bytes, past which a [`Truncated`] debug rendering elides the remainder.
const TRUNCATE_AT: usize = 64;

/// Wraps a `bytes` field for `Debug` formatting, eliding anything past [`TRUNCATE_AT`] bytes
/// instead of printing the field in full.
///
/// Generated messages format their `bytes` fields through this wrapper rather than deriving
/// `Debug` directly, so a message holding a large blob doesn't flood a log line or test failure
/// with its raw contents.
pub struct Truncated<'a>(&'a [u8]);

/// Wraps `bytes` for truncated `Debug` output. See [`Truncated`].
pub fn truncated(bytes: &[u8]) -> Truncated<'_> {
    Truncated(bytes)
}

impl fmt::Debug for Truncated<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= TRUNCATE_AT {
            return fmt::Debug::fmt(self.0, f);
        }
        fmt::Debug::fmt(&self.0[..TRUNCATE_AT], f)?;
        f.write_str("...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bytes_print_in_full() {
        let bytes = vec![1u8, 2, 3];
        assert_eq!(format!("{:?}", truncated(&bytes)), format!("{:?}", bytes));
    }

    #[test]
    fn long_bytes_are_truncated_with_ellipsis() {
        let bytes = vec![7u8; TRUNCATE_AT + 1];
        let rendered = format!("{:?}", truncated(&bytes));
        let expected = format!("{:?}...", &bytes[..TRUNCATE_AT]);
        assert_eq!(rendered, expected);
    }

    #[test]
    fn exactly_threshold_bytes_print_in_full() {
        let bytes = vec![9u8; TRUNCATE_AT];
        assert_eq!(format!("{:?}", truncated(&bytes)), format!("{:?}", bytes));
    }
}
