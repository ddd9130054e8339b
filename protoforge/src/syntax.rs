use crate::error::SchemaError;

/// The `syntax` declaration of a `.proto` file.
///
/// Only proto3 files are accepted; proto2 groups, extensions, and closed enums are a Non-goal.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Syntax {
    Proto3,
}

impl Syntax {
    pub(crate) fn parse(syntax: Option<&str>, file_name: &str) -> Result<Self, SchemaError> {
        match syntax {
            Some("proto3") => Ok(Syntax::Proto3),
            Some(other) => Err(SchemaError::UnsupportedSyntax {
                file: file_name.to_owned(),
                syntax: other.to_owned(),
            }),
            // protoc defaults `syntax` to proto2 when the field is absent.
            None => Err(SchemaError::UnsupportedSyntax {
                file: file_name.to_owned(),
                syntax: "proto2".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_proto3() {
        assert_eq!(Syntax::parse(Some("proto3"), "a.proto").unwrap(), Syntax::Proto3);
    }

    #[test]
    fn rejects_proto2_and_missing_syntax() {
        assert!(Syntax::parse(Some("proto2"), "a.proto").is_err());
        assert!(Syntax::parse(None, "a.proto").is_err());
    }
}
