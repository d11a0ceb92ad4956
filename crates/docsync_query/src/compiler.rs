//! Query-string compiler.
//!
//! A raw query string is percent-decoded, split on `|` into alternative
//! clauses, and each clause is read as `key=value&key=value`. Keys starting
//! with `$` are meta directives (pagination, sort, projection, flags); all
//! other keys are field predicates handled by [`PredicateBuilder`].

use crate::builder::PredicateBuilder;
use crate::error::{GrammarError, GrammarResult};
use crate::predicate::PredicateTree;
use crate::value::{coerce_scalar, RawValue};
use percent_encoding::percent_decode_str;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sort direction of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first (`1`).
    Ascending,
    /// Largest first (`-1`).
    Descending,
}

impl SortDirection {
    /// Native numeric form.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Sort order of a query.
///
/// A single key and an ordered list of keys render differently in the
/// native format (`{"a": 1}` versus `[["a", 1], ["b", -1]]`), so both
/// shapes are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortSpec {
    /// Exactly one key.
    Single(SortKey),
    /// Two or more keys, most significant first.
    Ordered(Vec<SortKey>),
}

impl SortSpec {
    /// Sort keys, most significant first.
    pub fn keys(&self) -> &[SortKey] {
        match self {
            SortSpec::Single(key) => std::slice::from_ref(key),
            SortSpec::Ordered(keys) => keys,
        }
    }

    /// Renders the native sort form.
    pub fn to_native(&self) -> Value {
        match self {
            SortSpec::Single(key) => {
                let mut out = Map::new();
                out.insert(key.field.clone(), Value::from(key.direction.as_i32()));
                Value::Object(out)
            }
            SortSpec::Ordered(keys) => Value::Array(
                keys.iter()
                    .map(|k| Value::Array(vec![Value::from(k.field.clone()), Value::from(k.direction.as_i32())]))
                    .collect(),
            ),
        }
    }
}

/// Projection of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Keep the field (`1`).
    Include,
    /// Drop the field (`0`).
    Exclude,
}

impl Projection {
    /// Native numeric form.
    pub fn as_u8(self) -> u8 {
        match self {
            Projection::Include => 1,
            Projection::Exclude => 0,
        }
    }
}

/// The compiled form of a query string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    /// Document filter.
    pub filter: PredicateTree,
    /// Maximum number of documents (`$limit`).
    pub limit: Option<u64>,
    /// Number of documents to skip (`$skip`).
    pub skip: Option<u64>,
    /// Sort order (`$sort`).
    pub sort: Option<SortSpec>,
    /// Projection (`$fields`). Mixing include and exclude is left to the store.
    pub fields: Option<BTreeMap<String, Projection>>,
    /// Fields to embed (`$embed`).
    pub embed: Option<Vec<String>>,
    /// Whether a total count is requested (`$count`).
    pub count: Option<bool>,
    /// Any other `$name` directive, keyed without the `$`.
    pub extra: BTreeMap<String, Value>,
}

impl QueryDescriptor {
    /// Returns true if `$count` was requested.
    pub fn wants_count(&self) -> bool {
        self.count == Some(true)
    }

    /// Returns true if the extra directive `name` is the boolean `true`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.extra.get(name), Some(Value::Bool(true)))
    }

    /// Renders the descriptor in native JSON form.
    ///
    /// Extra directives are flattened into the top level; the named
    /// directives take precedence over an extra with the same name.
    pub fn to_json(&self) -> Value {
        let mut out: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.insert("filter".into(), self.filter.to_native());
        if let Some(limit) = self.limit {
            out.insert("limit".into(), Value::from(limit));
        }
        if let Some(skip) = self.skip {
            out.insert("skip".into(), Value::from(skip));
        }
        if let Some(sort) = &self.sort {
            out.insert("sort".into(), sort.to_native());
        }
        if let Some(fields) = &self.fields {
            let projection = fields
                .iter()
                .map(|(k, p)| (k.clone(), Value::from(p.as_u8())))
                .collect();
            out.insert("fields".into(), Value::Object(projection));
        }
        if let Some(embed) = &self.embed {
            out.insert("embed".into(), Value::from(embed.clone()));
        }
        if let Some(count) = self.count {
            out.insert("count".into(), Value::Bool(count));
        }
        Value::Object(out)
    }

    /// Copies every directive set in `other` over this one.
    fn merge_meta(&mut self, other: QueryDescriptor) {
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.skip.is_some() {
            self.skip = other.skip;
        }
        if other.sort.is_some() {
            self.sort = other.sort;
        }
        if other.fields.is_some() {
            self.fields = other.fields;
        }
        if other.embed.is_some() {
            self.embed = other.embed;
        }
        if other.count.is_some() {
            self.count = other.count;
        }
        self.extra.extend(other.extra);
    }
}

impl Serialize for QueryDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Compiles query strings into [`QueryDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    builder: PredicateBuilder,
}

impl QueryCompiler {
    /// Creates a compiler using the default identity field (`_id`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the field targeted by the bare `!` token.
    #[must_use]
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.builder = PredicateBuilder::new(field);
        self
    }

    /// Returns the identity field name.
    pub fn identity_field(&self) -> &str {
        self.builder.identity_field()
    }

    /// Compiles a raw query string.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] for malformed encoding, invalid meta
    /// directives, or conflicting field predicates.
    pub fn compile(&self, raw: &str) -> GrammarResult<QueryDescriptor> {
        let decoded = decode_component(raw)?;
        let clauses: Vec<&str> = decoded.split('|').collect();
        if let [clause] = clauses.as_slice() {
            return self.compile_clause(clause);
        }

        let mut descriptor = QueryDescriptor::default();
        let mut alternatives = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let mut compiled = self.compile_clause(clause)?;
            alternatives.push(std::mem::take(&mut compiled.filter));
            descriptor.merge_meta(compiled);
        }
        descriptor.filter = PredicateTree::Or(alternatives);
        Ok(descriptor)
    }

    fn compile_clause(&self, clause: &str) -> GrammarResult<QueryDescriptor> {
        let mut descriptor = QueryDescriptor::default();
        for (key, raw) in group_pairs(clause) {
            match key.strip_prefix('$') {
                Some(name) => apply_meta(&mut descriptor, name, &raw)?,
                None => self.builder.apply(&key, &raw, &mut descriptor.filter)?,
            }
        }
        Ok(descriptor)
    }
}

/// Compiles `raw` with the default compiler.
///
/// # Errors
///
/// See [`QueryCompiler::compile`].
pub fn compile(raw: &str) -> GrammarResult<QueryDescriptor> {
    QueryCompiler::new().compile(raw)
}

/// Reads a clause as form-encoded pairs, grouping repeated keys in order of
/// first appearance.
fn group_pairs(clause: &str) -> Vec<(String, RawValue)> {
    let mut grouped: Vec<(String, RawValue)> = Vec::new();
    for (key, value) in form_urlencoded::parse(clause.as_bytes()) {
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, raw)) => raw.push(value.into_owned()),
            None => grouped.push((key.into_owned(), RawValue::Single(value.into_owned()))),
        }
    }
    grouped
}

fn decode_component(raw: &str) -> GrammarResult<String> {
    let bytes = raw.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte == b'%' {
            let valid = bytes
                .get(index + 1..index + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(GrammarError::malformed_encoding(format!(
                    "bad escape at offset {index}"
                )));
            }
        }
    }
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| GrammarError::malformed_encoding(e.to_string()))
}

fn apply_meta(descriptor: &mut QueryDescriptor, name: &str, raw: &RawValue) -> GrammarResult<()> {
    let value = raw.last();
    match name {
        "limit" => {
            let limit = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(GrammarError::InvalidLimit)?;
            descriptor.limit = Some(limit);
        }
        "skip" => {
            let skip = value
                .trim()
                .parse::<u64>()
                .map_err(|_| GrammarError::InvalidSkip)?;
            descriptor.skip = Some(skip);
        }
        "count" => {
            descriptor.count = Some(match coerce_scalar(value) {
                Value::String(s) if s.is_empty() => true,
                Value::Bool(b) => b,
                _ => return Err(GrammarError::InvalidCount),
            });
        }
        "fields" => {
            let fields = parse_list(value, "$fields")?
                .into_iter()
                .map(|(field, negated)| {
                    let projection = if negated {
                        Projection::Exclude
                    } else {
                        Projection::Include
                    };
                    (field, projection)
                })
                .collect();
            descriptor.fields = Some(fields);
        }
        "sort" => {
            let mut keys: Vec<SortKey> = parse_list(value, "$sort")?
                .into_iter()
                .map(|(field, negated)| SortKey {
                    field,
                    direction: if negated {
                        SortDirection::Descending
                    } else {
                        SortDirection::Ascending
                    },
                })
                .collect();
            descriptor.sort = Some(if keys.len() == 1 {
                SortSpec::Single(keys.remove(0))
            } else {
                SortSpec::Ordered(keys)
            });
        }
        "embed" => {
            descriptor.embed = Some(value.split(',').map(str::to_string).collect());
        }
        other => {
            let value = if value.is_empty() {
                Value::Bool(true)
            } else {
                coerce_scalar(value)
            };
            descriptor.extra.insert(other.to_string(), value);
        }
    }
    Ok(())
}

/// Splits a comma list, reading a leading `-` as negation.
fn parse_list(value: &str, parameter: &'static str) -> GrammarResult<Vec<(String, bool)>> {
    value
        .split(',')
        .map(|entry| match entry.strip_prefix('-') {
            Some("") => Err(GrammarError::EmptyListEntry { parameter }),
            Some(field) => Ok((field.to_string(), true)),
            None if entry.is_empty() => Err(GrammarError::EmptyListEntry { parameter }),
            None => Ok((entry.to_string(), false)),
        })
        .collect()
}
