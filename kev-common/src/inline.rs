//! # Inline Command Arguments
//!
//! Inline commands are space separated and CRLF terminated with no length
//! prefixes, so an argument containing whitespace or control bytes would
//! split into extra arguments or end the command early. Such arguments are
//! rejected instead of escaped.

use thiserror::Error;

/// Why an argument cannot be sent as part of an inline command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InlineArgError {
    #[error("inline argument is empty")]
    Empty,
    #[error("inline argument {arg:?} contains byte 0x{byte:02x} at offset {offset}")]
    ForbiddenByte { arg: String, byte: u8, offset: usize },
}

/// Checks that `arg` can travel as one inline-command token.
///
/// Non-ASCII UTF-8 passes through untouched; whitespace and ASCII control
/// characters do not.
pub fn validate_inline_arg(arg: &str) -> Result<(), InlineArgError> {
    if arg.is_empty() {
        return Err(InlineArgError::Empty);
    }
    match arg
        .bytes()
        .enumerate()
        .find(|(_, b)| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        Some((offset, byte)) => Err(InlineArgError::ForbiddenByte {
            arg: arg.to_string(),
            byte,
            offset,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_tokens() {
        assert!(validate_inline_arg("user:42").is_ok());
        assert!(validate_inline_arg("__keyevent@*:*").is_ok());
        assert!(validate_inline_arg("clé").is_ok());
    }

    #[test]
    fn rejects_separators() {
        assert_eq!(validate_inline_arg(""), Err(InlineArgError::Empty));
        assert!(matches!(
            validate_inline_arg("a b"),
            Err(InlineArgError::ForbiddenByte { byte: b' ', offset: 1, .. })
        ));
        assert!(matches!(
            validate_inline_arg("a\r\nGET x"),
            Err(InlineArgError::ForbiddenByte { byte: b'\r', .. })
        ));
        assert!(validate_inline_arg("tab\there").is_err());
    }
}
