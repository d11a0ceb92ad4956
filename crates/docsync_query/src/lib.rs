//! # docsync Query
//!
//! Compiler for the compact, URL-safe query grammar used by docsync.
//!
//! This crate provides:
//! - [`QueryCompiler`] - turns a raw query string into a [`QueryDescriptor`]
//! - [`PredicateBuilder`] - turns one `key=value` token into a [`Condition`]
//! - [`PredicateTree`] - the filter AST, its native rendering, and in-memory
//!   evaluation against JSON documents
//!
//! ## Grammar
//!
//! | Token | Meaning |
//! |---|---|
//! | `key=value` | equality (`$in` if the key repeats) |
//! | `key` | field exists |
//! | `!key` / `!` | field (or identity field) absent |
//! | `key!=value` | not equal (`$nin` if the key repeats) |
//! | `key>value` / `key<value` | strict bounds, once per key |
//! | `key>=value` / `key<=value` | inclusive bounds |
//! | `key~=v` / `key^=v` / `key$=v` | case-insensitive contains / prefix / suffix |
//! | `key:=value` / `key@=value` | force string / date value |
//! | `$limit` `$skip` `$count` `$fields` `$sort` `$embed` | meta directives |
//! | `a=b\|c=d` | alternatives combined with OR |
//!
//! ## Example
//!
//! ```rust
//! use docsync_query::compile;
//! use serde_json::json;
//!
//! let query = compile("a=b|c=d&$limit=2").unwrap();
//! assert_eq!(query.limit, Some(2));
//! assert_eq!(
//!     query.filter.to_native(),
//!     json!({ "$or": [{ "a": { "$eq": "b" } }, { "c": { "$eq": "d" } }] })
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod compiler;
mod error;
mod eval;
mod predicate;
mod value;

pub use builder::PredicateBuilder;
pub use compiler::{
    compile, Projection, QueryCompiler, QueryDescriptor, SortDirection, SortKey, SortSpec,
};
pub use error::{GrammarError, GrammarResult};
pub use eval::{compare_values, lookup, lookup_field, sort_order, values_equal, PreparedFilter};
pub use predicate::{Condition, FieldPredicate, PredicateTree, Slot};
pub use value::{coerce_scalar, parse_date, RawValue, ValueFormat};

/// Identity field used when none is configured.
pub const DEFAULT_IDENTITY_FIELD: &str = "_id";
