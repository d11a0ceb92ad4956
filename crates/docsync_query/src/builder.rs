//! Translation of one `key=value` token into a predicate condition.

use crate::error::{GrammarError, GrammarResult};
use crate::predicate::{Condition, PredicateTree};
use crate::value::{coerce, Coerced, RawValue, ValueFormat};
use serde_json::Value;

/// The comparison a token selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Exists,
    NotExists,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Equals => "equals",
            Operation::NotEquals => "not equals",
            Operation::GreaterThan => "greater than",
            Operation::GreaterThanEqual => "greater than or equal",
            Operation::LessThan => "less than",
            Operation::LessThanEqual => "less than or equal",
            Operation::Exists => "exists",
            Operation::NotExists => "not exists",
            Operation::Contains => "contains",
            Operation::StartsWith => "starts with",
            Operation::EndsWith => "ends with",
        }
    }
}

/// Builds field predicates from query-string tokens.
///
/// # Token forms
///
/// With an empty value the operator is read from the key itself:
/// `a>b` (strict greater-than), `a<b` (strict less-than), `!` (identity
/// field absent), `!a` (field absent), `a` (field present).
///
/// Otherwise the last key character selects the operator: `!` not-equal,
/// `>` greater-or-equal, `<` less-or-equal, `~` contains, `^` starts-with,
/// `$` ends-with, anything else equality. A trailing `:` or `@` on the
/// remaining key forces string or date coercion of the value.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    identity_field: String,
}

impl Default for PredicateBuilder {
    fn default() -> Self {
        Self::new(crate::DEFAULT_IDENTITY_FIELD)
    }
}

impl PredicateBuilder {
    /// Creates a builder that maps the bare `!` token to `identity_field`.
    pub fn new(identity_field: impl Into<String>) -> Self {
        Self {
            identity_field: identity_field.into(),
        }
    }

    /// Returns the identity field name.
    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    /// Merges the condition described by `key` and `raw` into `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] when an exclusive operator is repeated
    /// for a field, when a repeated key uses an operator that cannot form
    /// a membership test, or when a date value cannot be parsed.
    pub fn apply(&self, key: &str, raw: &RawValue, filter: &mut PredicateTree) -> GrammarResult<()> {
        let (key, operation, raw) = self.classify(key, raw);
        let (field, format) = split_format(&key);

        let condition = match operation {
            Operation::Exists => Condition::Exists(true),
            Operation::NotExists => Condition::Exists(false),
            _ => match coerce(&raw, format)? {
                Coerced::Single(value) => single_condition(operation, value),
                Coerced::Many(values) => match operation {
                    Operation::Equals => Condition::In(values),
                    Operation::NotEquals => Condition::NotIn(values),
                    _ => return Err(GrammarError::not_composable(field, operation.name())),
                },
            },
        };

        filter.field_entry(field).insert(condition)
    }

    fn classify(&self, key: &str, raw: &RawValue) -> (String, Operation, RawValue) {
        if raw.is_empty_single() {
            if let Some(index) = key.find('>') {
                let value = RawValue::from(&key[index + 1..]);
                return (key[..index].to_string(), Operation::GreaterThan, value);
            }
            if let Some(index) = key.find('<') {
                let value = RawValue::from(&key[index + 1..]);
                return (key[..index].to_string(), Operation::LessThan, value);
            }
            if key == "!" {
                return (self.identity_field.clone(), Operation::NotExists, raw.clone());
            }
            if let Some(field) = key.strip_prefix('!') {
                return (field.to_string(), Operation::NotExists, raw.clone());
            }
            return (key.to_string(), Operation::Exists, raw.clone());
        }

        let operation = match key.chars().last() {
            Some('!') => Operation::NotEquals,
            Some('>') => Operation::GreaterThanEqual,
            Some('<') => Operation::LessThanEqual,
            Some('~') => Operation::Contains,
            Some('^') => Operation::StartsWith,
            Some('$') => Operation::EndsWith,
            _ => return (key.to_string(), Operation::Equals, raw.clone()),
        };
        (key[..key.len() - 1].to_string(), operation, raw.clone())
    }
}

fn split_format(key: &str) -> (&str, ValueFormat) {
    if key.len() > 1 {
        if let Some(field) = key.strip_suffix(':') {
            return (field, ValueFormat::String);
        }
        if let Some(field) = key.strip_suffix('@') {
            return (field, ValueFormat::Date);
        }
    }
    (key, ValueFormat::Default)
}

fn single_condition(operation: Operation, value: Value) -> Condition {
    match operation {
        Operation::Equals => Condition::Eq(value),
        Operation::NotEquals => Condition::NotEq(value),
        Operation::GreaterThan => Condition::Gt(value),
        Operation::GreaterThanEqual => Condition::Gte(value),
        Operation::LessThan => Condition::Lt(value),
        Operation::LessThanEqual => Condition::Lte(value),
        Operation::Contains => Condition::Contains(pattern_text(value)),
        Operation::StartsWith => Condition::StartsWith(pattern_text(value)),
        Operation::EndsWith => Condition::EndsWith(pattern_text(value)),
        Operation::Exists => Condition::Exists(true),
        Operation::NotExists => Condition::Exists(false),
    }
}

fn pattern_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
