//! In-memory evaluation of predicate trees against JSON documents.
//!
//! Comparison follows the usual document-store conventions: numbers compare
//! numerically regardless of integer/float representation, strings compare
//! lexicographically, and values of different types never satisfy an
//! ordering operator. An array field satisfies equality, membership,
//! ordering, and text conditions when any of its elements does.

use crate::predicate::{Condition, FieldPredicate, PredicateTree};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

impl PredicateTree {
    /// Returns true if `document` satisfies the tree.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            PredicateTree::Leaf(fields) => fields.iter().all(|p| p.matches(document)),
            PredicateTree::And(children) => children.iter().all(|c| c.matches(document)),
            PredicateTree::Or(children) => children.iter().any(|c| c.matches(document)),
        }
    }
}

impl FieldPredicate {
    /// Returns true if every condition holds for the field in `document`.
    pub fn matches(&self, document: &Value) -> bool {
        let value = lookup(document, &self.field);
        self.conditions.iter().all(|c| c.matches(value))
    }
}

impl Condition {
    /// Evaluates the condition against a field value (`None` when missing).
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => value.is_some_and(|v| equals_or_contains(v, expected)),
            Condition::NotEq(expected) => !value.is_some_and(|v| equals_or_contains(v, expected)),
            Condition::Gt(bound) => ordered(value, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => ordered(value, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => ordered(value, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => ordered(value, bound, |o| o != Ordering::Greater),
            Condition::Contains(text) => {
                let needle = text.to_lowercase();
                textual(value, |s| s.contains(&needle))
            }
            Condition::StartsWith(text) => {
                let needle = text.to_lowercase();
                textual(value, |s| s.starts_with(&needle))
            }
            Condition::EndsWith(text) => {
                let needle = text.to_lowercase();
                textual(value, |s| s.ends_with(&needle))
            }
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::In(candidates) => value
                .is_some_and(|v| candidates.iter().any(|c| equals_or_contains(v, c))),
            Condition::NotIn(candidates) => !value
                .is_some_and(|v| candidates.iter().any(|c| equals_or_contains(v, c))),
        }
    }
}

/// Resolves a dotted path such as `address.city` or `tags.0`.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Resolves a dotted path starting from a document's field map.
pub fn lookup_field<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

/// A predicate tree prepared for repeated evaluation.
///
/// Membership lists are indexed into hash sets, so testing `In`/`NotIn`
/// against a document costs the same regardless of list length. Matching
/// agrees with [`PredicateTree::matches`].
#[derive(Debug)]
pub struct PreparedFilter<'a> {
    root: PreparedNode<'a>,
}

#[derive(Debug)]
enum PreparedNode<'a> {
    Leaf(Vec<PreparedField<'a>>),
    And(Vec<PreparedNode<'a>>),
    Or(Vec<PreparedNode<'a>>),
}

#[derive(Debug)]
struct PreparedField<'a> {
    field: &'a str,
    checks: Vec<Check<'a>>,
}

#[derive(Debug)]
enum Check<'a> {
    Plain(&'a Condition),
    Member { set: MemberSet<'a>, negated: bool },
}

impl PredicateTree {
    /// Prepares the tree for evaluation against many documents.
    pub fn prepare(&self) -> PreparedFilter<'_> {
        PreparedFilter {
            root: PreparedNode::new(self),
        }
    }
}

impl PreparedFilter<'_> {
    /// Returns true if `document` satisfies the filter.
    pub fn matches(&self, document: &Value) -> bool {
        match document {
            Value::Object(map) => self.matches_document(map),
            _ => self.root.matches_with(&|path: &str| lookup(document, path)),
        }
    }

    /// Returns true if the document with these fields satisfies the filter.
    pub fn matches_document(&self, document: &Map<String, Value>) -> bool {
        self.root.matches_with(&|path: &str| lookup_field(document, path))
    }
}

impl<'a> PreparedNode<'a> {
    fn new(tree: &'a PredicateTree) -> Self {
        match tree {
            PredicateTree::Leaf(fields) => PreparedNode::Leaf(
                fields
                    .iter()
                    .map(|predicate| PreparedField {
                        field: &predicate.field,
                        checks: predicate.conditions.iter().map(Check::new).collect(),
                    })
                    .collect(),
            ),
            PredicateTree::And(children) => {
                PreparedNode::And(children.iter().map(PreparedNode::new).collect())
            }
            PredicateTree::Or(children) => {
                PreparedNode::Or(children.iter().map(PreparedNode::new).collect())
            }
        }
    }

    fn matches_with<'d>(&self, resolve: &dyn Fn(&str) -> Option<&'d Value>) -> bool {
        match self {
            PreparedNode::Leaf(fields) => fields.iter().all(|f| {
                let value = resolve(f.field);
                f.checks.iter().all(|check| check.matches(value))
            }),
            PreparedNode::And(children) => children.iter().all(|c| c.matches_with(resolve)),
            PreparedNode::Or(children) => children.iter().any(|c| c.matches_with(resolve)),
        }
    }
}

impl<'a> Check<'a> {
    fn new(condition: &'a Condition) -> Self {
        match condition {
            Condition::In(values) => Check::Member {
                set: MemberSet::new(values),
                negated: false,
            },
            Condition::NotIn(values) => Check::Member {
                set: MemberSet::new(values),
                negated: true,
            },
            other => Check::Plain(other),
        }
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Check::Plain(condition) => condition.matches(value),
            Check::Member { set, negated } => value.is_some_and(|v| set.holds(v)) != *negated,
        }
    }
}

/// Hashable form of a scalar, normalising numbers so that `1 == 1.0`.
#[derive(Debug, PartialEq, Eq, Hash)]
enum MemberKey<'a> {
    Null,
    Bool(bool),
    Int(i128),
    Float(u64),
    Str(&'a str),
}

impl<'a> MemberKey<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        Some(match value {
            Value::Null => MemberKey::Null,
            Value::Bool(b) => MemberKey::Bool(*b),
            Value::String(s) => MemberKey::Str(s),
            Value::Number(n) => number_key(n),
            Value::Array(_) | Value::Object(_) => return None,
        })
    }
}

fn number_key(n: &Number) -> MemberKey<'static> {
    if let Some(i) = n.as_i64() {
        return MemberKey::Int(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return MemberKey::Int(i128::from(u));
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    if f.fract() == 0.0 && f.abs() < 9.2e18 {
        // Integral floats share the integer key.
        return MemberKey::Int(f as i128);
    }
    MemberKey::Float(f.to_bits())
}

#[derive(Debug)]
struct MemberSet<'a> {
    scalars: HashSet<MemberKey<'a>>,
    composites: Vec<&'a Value>,
}

impl<'a> MemberSet<'a> {
    fn new(values: &'a [Value]) -> Self {
        let mut scalars = HashSet::with_capacity(values.len());
        let mut composites = Vec::new();
        for value in values {
            match MemberKey::of(value) {
                Some(key) => {
                    scalars.insert(key);
                }
                None => composites.push(value),
            }
        }
        Self { scalars, composites }
    }

    fn contains(&self, value: &Value) -> bool {
        match MemberKey::of(value) {
            Some(key) => self.scalars.contains(&key),
            None => self.composites.iter().any(|c| values_equal(value, c)),
        }
    }

    /// Membership with array fan-out, as for [`Condition::In`].
    fn holds(&self, value: &Value) -> bool {
        if self.contains(value) {
            return true;
        }
        match value {
            Value::Array(items) => items.iter().any(|item| self.contains(item)),
            _ => false,
        }
    }
}

/// Equality with numeric normalisation (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        _ => a == b,
    }
}

/// Ordering between two values of the same type; `None` across types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(compare_numbers(x, y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total ordering used for sorting.
///
/// Missing and null sort first, then numbers, strings, objects, arrays,
/// and booleans.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank_a = type_rank(a);
    let rank_b = type_rank(b);
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        _ => Ordering::Equal,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

fn equals_or_contains(value: &Value, expected: &Value) -> bool {
    if values_equal(value, expected) {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

fn ordered(value: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, bound).is_some_and(&accept)),
        Some(v) => compare_values(v, bound).is_some_and(accept),
        None => false,
    }
}

fn textual(value: Option<&Value>, accept: impl Fn(&str) -> bool) -> bool {
    match value {
        Some(Value::String(s)) => accept(&s.to_lowercase()),
        Some(Value::Array(items)) => items.iter().any(|item| match item {
            Value::String(s) => accept(&s.to_lowercase()),
            _ => false,
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "_id": "a1",
            "name": "Widget Pro",
            "price": 25,
            "weight": 1.5,
            "active": true,
            "tags": ["red", "large"],
            "address": { "city": "Oslo" },
        })
    }

    #[test]
    fn equality_and_membership() {
        let d = doc();
        assert!(Condition::Eq(json!(25)).matches(lookup(&d, "price")));
        assert!(Condition::Eq(json!(25.0)).matches(lookup(&d, "price")));
        assert!(Condition::Eq(json!("red")).matches(lookup(&d, "tags")));
        assert!(Condition::In(vec![json!("x"), json!("Oslo")]).matches(lookup(&d, "address.city")));
        assert!(Condition::NotIn(vec![json!("blue")]).matches(lookup(&d, "tags")));
        assert!(Condition::NotEq(json!(1)).matches(lookup(&d, "missing")));
        assert!(!Condition::Eq(json!("25")).matches(lookup(&d, "price")));
    }

    #[test]
    fn ordering_is_type_bracketed() {
        let d = doc();
        assert!(Condition::Gt(json!(20)).matches(lookup(&d, "price")));
        assert!(Condition::Lte(json!(1.5)).matches(lookup(&d, "weight")));
        assert!(!Condition::Gt(json!("20")).matches(lookup(&d, "price")));
        assert!(!Condition::Lt(json!(100)).matches(lookup(&d, "missing")));
    }

    #[test]
    fn text_patterns_ignore_case() {
        let d = doc();
        assert!(Condition::Contains("GET p".into()).matches(lookup(&d, "name")));
        assert!(Condition::StartsWith("widget".into()).matches(lookup(&d, "name")));
        assert!(Condition::EndsWith("PRO".into()).matches(lookup(&d, "name")));
        assert!(Condition::StartsWith("lar".into()).matches(lookup(&d, "tags")));
        assert!(!Condition::Contains("25".into()).matches(lookup(&d, "price")));
    }

    #[test]
    fn existence() {
        let d = doc();
        assert!(Condition::Exists(true).matches(lookup(&d, "active")));
        assert!(Condition::Exists(false).matches(lookup(&d, "nope")));
        assert!(Condition::Exists(true).matches(lookup(&d, "tags.1")));
    }

    #[test]
    fn tree_combinators() {
        let d = doc();
        let tree = PredicateTree::Or(vec![
            PredicateTree::field("price", Condition::Gt(json!(100))),
            PredicateTree::field("active", Condition::Eq(json!(true))),
        ]);
        assert!(tree.matches(&d));
        assert!(PredicateTree::match_all().matches(&d));
        let both = PredicateTree::And(vec![
            tree,
            PredicateTree::field("_id", Condition::NotIn(vec![json!("a1")])),
        ]);
        assert!(!both.matches(&d));
    }

    #[test]
    fn sort_order_brackets_types() {
        assert_eq!(sort_order(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(sort_order(Some(&json!(true)), Some(&json!("z"))), Ordering::Greater);
    }

    #[test]
    fn prepared_filter_agrees_with_tree() {
        let d = doc();
        for query in [
            "",
            "price=25",
            "price=25.0&tags=red",
            "tags=blue&tags=large",
            "tags!=red&tags!=blue",
            "address.city=Oslo&address.city=Bergen",
            "name^=widget|price>100",
            "!missing&weight<=1.5",
            "price:=25",
        ] {
            let tree = compile(query).unwrap().filter;
            let prepared = tree.prepare();
            assert_eq!(prepared.matches(&d), tree.matches(&d), "{query}");
            assert_eq!(
                prepared.matches_document(d.as_object().unwrap()),
                tree.matches(&d),
                "{query}"
            );
        }
    }

    #[test]
    fn prepared_membership_uses_normalised_keys() {
        let many: Vec<Value> = (0..10_000).map(|i| json!(format!("id-{i}"))).collect();
        let tree = PredicateTree::field("_id", Condition::NotIn(many));
        let prepared = tree.prepare();
        assert!(!prepared.matches(&json!({ "_id": "id-9999" })));
        assert!(prepared.matches(&json!({ "_id": "id-10000" })));
        assert!(prepared.matches(&json!({})));

        let numbers = PredicateTree::field("n", Condition::In(vec![json!(1.0), json!([1, 2])]));
        let prepared = numbers.prepare();
        assert!(prepared.matches(&json!({ "n": 1 })));
        assert!(prepared.matches(&json!({ "n": [5, 1] })));
        assert!(prepared.matches(&json!({ "n": [1, 2] })));
        assert!(!prepared.matches(&json!({ "n": 2 })));
    }

    #[test]
    fn lookup_field_walks_paths() {
        let d = doc();
        let map = d.as_object().unwrap();
        assert_eq!(lookup_field(map, "address.city"), Some(&json!("Oslo")));
        assert_eq!(lookup_field(map, "tags.1"), Some(&json!("large")));
        assert_eq!(lookup_field(map, "tags.x"), None);
    }
}
