//! Error types for the query grammar.

use thiserror::Error;

/// Result type for grammar operations.
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Errors raised while compiling a query string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// An exclusive operator was given twice for the same field.
    #[error("query cannot contain more than one '{operator}' criteria for the same key")]
    DuplicateCriteria {
        /// Field the criteria applies to.
        field: String,
        /// Human readable operator name.
        operator: &'static str,
    },

    /// A repeated key used an operator that cannot be turned into a membership test.
    #[error("query cannot contain more than one '{operator}' criteria for the same key")]
    NotComposable {
        /// Field the criteria applies to.
        field: String,
        /// Human readable operator name.
        operator: &'static str,
    },

    /// `$limit` was not an integer greater than zero.
    #[error("query string parameter $limit must be a number greater than 0")]
    InvalidLimit,

    /// `$skip` was not a non-negative integer.
    #[error("query string parameter $skip must be a number greater than or equal to 0")]
    InvalidSkip,

    /// `$count` was neither empty nor a boolean.
    #[error("query string parameter $count must be a boolean")]
    InvalidCount,

    /// A comma separated meta list contained an empty entry.
    #[error("query string parameter {parameter} cannot contain an empty value")]
    EmptyListEntry {
        /// The meta directive, including its `$`.
        parameter: &'static str,
    },

    /// A value with the `@` suffix could not be read as a date.
    #[error("invalid date format in query string")]
    InvalidDate,

    /// The raw query string had a bad percent escape or was not UTF-8.
    #[error("malformed percent-encoding in query string: {message}")]
    MalformedEncoding {
        /// Description of the problem.
        message: String,
    },
}

impl GrammarError {
    /// Create a duplicate criteria error.
    pub fn duplicate(field: impl Into<String>, operator: &'static str) -> Self {
        Self::DuplicateCriteria {
            field: field.into(),
            operator,
        }
    }

    /// Create a not-composable error.
    pub fn not_composable(field: impl Into<String>, operator: &'static str) -> Self {
        Self::NotComposable {
            field: field.into(),
            operator,
        }
    }

    /// Create a malformed encoding error.
    pub fn malformed_encoding(message: impl Into<String>) -> Self {
        Self::MalformedEncoding {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GrammarError::duplicate("foo", "greater than");
        assert_eq!(
            err.to_string(),
            "query cannot contain more than one 'greater than' criteria for the same key"
        );

        let err = GrammarError::EmptyListEntry {
            parameter: "$sort",
        };
        assert_eq!(
            err.to_string(),
            "query string parameter $sort cannot contain an empty value"
        );

        assert_eq!(
            GrammarError::InvalidDate.to_string(),
            "invalid date format in query string"
        );
    }
}
