//! Errors raised while parsing or evaluating a filter.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The filter text does not follow the grammar.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// AND and OR mixed at one level without parentheses.
    #[error("ambiguous binary operators: {operators} (add parentheses)")]
    AmbiguousOperators { operators: String },

    /// Recognised by the grammar but without defined semantics.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

impl FilterError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        FilterError::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Malformed text, including ambiguous operator mixes.
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            FilterError::Syntax { .. } | FilterError::AmbiguousOperators { .. }
        )
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, FilterError::NotImplemented(_))
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
