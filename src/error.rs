//! Error types for the formatting pipeline.
//!
//! Tokenizer and parser failures are problems with the input and are reported
//! per file. An [`EquivalenceError`] is different: it means a transformation
//! produced code that no longer means the same thing, which is always a bug in
//! the formatter and must stop the output from being written.

use thiserror::Error;

/// Malformed lexical input: unterminated strings, bad dedents, stray characters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot tokenize {line}:{column}: {reason}")]
pub struct TokenizeError {
    pub reason: String,
    /// 1-based line of the offending character.
    pub line: usize,
    /// 0-based column of the offending character.
    pub column: usize,
}

/// No grammar variant accepted the input.
///
/// When several grammar variants were tried, this carries the diagnostic of
/// the variant that got furthest into the token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<TokenizeError> for ParseError {
    fn from(err: TokenizeError) -> Self {
        ParseError {
            message: err.reason,
            line: err.line,
            column: err.column,
        }
    }
}

/// The formatted output is not structurally equal to the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "INTERNAL ERROR: produced code that is not equivalent to the source: {diff_description}"
)]
pub struct EquivalenceError {
    pub diff_description: String,
}

/// Contradictory or out-of-range configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("line length must be between 1 and {max}, got {got}")]
    LineLength { got: usize, max: usize },

    #[error("invalid line range {start}-{end}: {reason}")]
    LineRange {
        start: usize,
        end: usize,
        reason: &'static str,
    },

    #[error("unknown target version: {0}")]
    UnknownTargetVersion(String),

    #[error("unknown preview feature: {0}")]
    UnknownPreviewFeature(String),
}

/// Anything that stops a single file from being formatted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Equivalence(#[from] EquivalenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FormatError {
    /// True for failures that point at the formatter rather than the input.
    pub fn is_internal(&self) -> bool {
        matches!(self, FormatError::Equivalence(_))
    }
}

/// Formatting the output again changed it. Never fatal; logged and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("output is not stable after {passes} passes: {detail}")]
pub struct StabilityWarning {
    pub passes: usize,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_has_position() {
        let err = ParseError {
            message: "bad input".to_string(),
            line: 3,
            column: 7,
        };
        assert_eq!(err.to_string(), "cannot parse 3:7: bad input");
    }

    #[test]
    fn tokenize_error_converts_to_parse_error() {
        let err = TokenizeError {
            reason: "unterminated string".to_string(),
            line: 1,
            column: 4,
        };
        let parse: ParseError = err.into();
        assert_eq!(parse.line, 1);
        assert_eq!(parse.column, 4);
        assert!(parse.message.contains("unterminated"));
    }

    #[test]
    fn only_equivalence_is_internal() {
        let eq = FormatError::from(EquivalenceError {
            diff_description: "x".to_string(),
        });
        assert!(eq.is_internal());
        let parse = FormatError::from(ParseError {
            message: "x".to_string(),
            line: 1,
            column: 0,
        });
        assert!(!parse.is_internal());
    }
}
