//! Predicate tree and its rendering into the native filter format.
//!
//! The tree is a tagged representation: every operator is its own
//! [`Condition`] variant. The storage-facing JSON shape (`$eq`, `$in`,
//! `$regex`, `$and`, ...) is produced only by [`PredicateTree::to_native`].

use crate::error::{GrammarError, GrammarResult};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A single condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field does not equal the value.
    NotEq(Value),
    /// Field is strictly greater than the value.
    Gt(Value),
    /// Field is greater than or equal to the value.
    Gte(Value),
    /// Field is strictly less than the value.
    Lt(Value),
    /// Field is less than or equal to the value.
    Lte(Value),
    /// Field contains the text, ignoring case.
    Contains(String),
    /// Field starts with the text, ignoring case.
    StartsWith(String),
    /// Field ends with the text, ignoring case.
    EndsWith(String),
    /// Field is present (`true`) or absent (`false`).
    Exists(bool),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field equals none of the values.
    NotIn(Vec<Value>),
}

/// The operator position a [`Condition`] occupies within a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Equality.
    Eq,
    /// Inequality.
    NotEq,
    /// Strict greater-than.
    Gt,
    /// Greater-or-equal.
    Gte,
    /// Strict less-than.
    Lt,
    /// Less-or-equal.
    Lte,
    /// Case-insensitive substring match.
    Contains,
    /// Case-insensitive prefix match.
    StartsWith,
    /// Case-insensitive suffix match.
    EndsWith,
    /// Presence test.
    Exists,
    /// Membership.
    In,
    /// Negated membership.
    NotIn,
}

impl Slot {
    /// Returns true if filling this slot twice for one field is an error.
    pub fn is_exclusive(self) -> bool {
        matches!(
            self,
            Slot::Eq | Slot::Gt | Slot::Lt | Slot::Contains | Slot::StartsWith | Slot::EndsWith
        )
    }

    /// Returns true for the text-pattern slots, which render as `$regex`.
    pub fn is_pattern(self) -> bool {
        matches!(self, Slot::Contains | Slot::StartsWith | Slot::EndsWith)
    }
}

impl Condition {
    /// Returns the slot this condition occupies.
    pub fn slot(&self) -> Slot {
        match self {
            Condition::Eq(_) => Slot::Eq,
            Condition::NotEq(_) => Slot::NotEq,
            Condition::Gt(_) => Slot::Gt,
            Condition::Gte(_) => Slot::Gte,
            Condition::Lt(_) => Slot::Lt,
            Condition::Lte(_) => Slot::Lte,
            Condition::Contains(_) => Slot::Contains,
            Condition::StartsWith(_) => Slot::StartsWith,
            Condition::EndsWith(_) => Slot::EndsWith,
            Condition::Exists(_) => Slot::Exists,
            Condition::In(_) => Slot::In,
            Condition::NotIn(_) => Slot::NotIn,
        }
    }

    /// Human readable operator name used in error messages.
    pub fn operator_name(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "equals",
            Condition::NotEq(_) => "not equals",
            Condition::Gt(_) => "greater than",
            Condition::Gte(_) => "greater than or equal",
            Condition::Lt(_) => "less than",
            Condition::Lte(_) => "less than or equal",
            Condition::Contains(_) => "contains",
            Condition::StartsWith(_) => "starts with",
            Condition::EndsWith(_) => "ends with",
            Condition::Exists(_) => "exists",
            Condition::In(_) => "in",
            Condition::NotIn(_) => "not in",
        }
    }

    fn write_native(&self, out: &mut Map<String, Value>) {
        let (key, value) = match self {
            Condition::Eq(v) => ("$eq", v.clone()),
            Condition::NotEq(v) => ("$ne", v.clone()),
            Condition::Gt(v) => ("$gt", v.clone()),
            Condition::Gte(v) => ("$gte", v.clone()),
            Condition::Lt(v) => ("$lt", v.clone()),
            Condition::Lte(v) => ("$lte", v.clone()),
            Condition::Contains(p) => ("$regex", Value::String(p.clone())),
            Condition::StartsWith(p) => ("$regex", Value::String(format!("^{p}"))),
            Condition::EndsWith(p) => ("$regex", Value::String(format!("{p}$"))),
            Condition::Exists(b) => ("$exists", Value::Bool(*b)),
            Condition::In(values) => ("$in", Value::Array(values.clone())),
            Condition::NotIn(values) => ("$nin", Value::Array(values.clone())),
        };
        out.insert(key.to_string(), value);
        if self.slot().is_pattern() {
            out.insert("$options".to_string(), Value::String("i".to_string()));
        }
    }
}

/// All conditions applying to one field within a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    /// Field name, possibly a dotted path.
    pub field: String,
    /// Conditions, at most one per [`Slot`].
    pub conditions: Vec<Condition>,
}

impl FieldPredicate {
    /// Creates an empty predicate for `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            conditions: Vec::new(),
        }
    }

    /// Returns the condition occupying `slot`, if any.
    pub fn get(&self, slot: Slot) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.slot() == slot)
    }

    /// Adds a condition.
    ///
    /// A condition in a non-exclusive slot replaces the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::DuplicateCriteria`] if the slot is exclusive
    /// and already filled.
    pub fn insert(&mut self, condition: Condition) -> GrammarResult<()> {
        let slot = condition.slot();
        match self.conditions.iter().position(|c| c.slot() == slot) {
            Some(_) if slot.is_exclusive() => Err(GrammarError::duplicate(
                self.field.clone(),
                condition.operator_name(),
            )),
            Some(index) => {
                self.conditions[index] = condition;
                Ok(())
            }
            None => {
                self.conditions.push(condition);
                Ok(())
            }
        }
    }

    /// Renders the operator object for this field.
    ///
    /// A native operator object holds a single `$regex`, so every text
    /// pattern after the first is returned separately, each as its own
    /// operator object.
    fn to_native(&self) -> (Value, Vec<Value>) {
        let mut ops = Map::new();
        let mut extra = Vec::new();
        let mut seen_pattern = false;
        for condition in &self.conditions {
            if condition.slot().is_pattern() {
                if seen_pattern {
                    let mut own = Map::new();
                    condition.write_native(&mut own);
                    extra.push(Value::Object(own));
                    continue;
                }
                seen_pattern = true;
            }
            condition.write_native(&mut ops);
        }
        (Value::Object(ops), extra)
    }
}

/// A recursive filter.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateTree {
    /// Conjunction of per-field predicates. Empty matches everything.
    Leaf(Vec<FieldPredicate>),
    /// All children must match.
    And(Vec<PredicateTree>),
    /// At least one child must match.
    Or(Vec<PredicateTree>),
}

impl Default for PredicateTree {
    fn default() -> Self {
        PredicateTree::Leaf(Vec::new())
    }
}

impl PredicateTree {
    /// A filter matching every document.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// A leaf with a single condition on `field`.
    pub fn field(field: impl Into<String>, condition: Condition) -> Self {
        PredicateTree::Leaf(vec![FieldPredicate {
            field: field.into(),
            conditions: vec![condition],
        }])
    }

    /// Returns true if this is a leaf without conditions.
    pub fn is_empty(&self) -> bool {
        matches!(self, PredicateTree::Leaf(fields) if fields.is_empty())
    }

    /// Combines two filters with a conjunction, dropping empty sides.
    #[must_use]
    pub fn and(self, other: PredicateTree) -> PredicateTree {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => PredicateTree::And(vec![self, other]),
        }
    }

    /// Returns the predicate for `field` in the conjunctive leaf of this
    /// tree, creating it (and the leaf) if needed.
    ///
    /// A disjunction is wrapped into `And([or, leaf])` first.
    pub fn field_entry(&mut self, field: &str) -> &mut FieldPredicate {
        match self {
            PredicateTree::Leaf(fields) => {
                let index = match fields.iter().position(|f| f.field == field) {
                    Some(index) => index,
                    None => {
                        fields.push(FieldPredicate::new(field));
                        fields.len() - 1
                    }
                };
                &mut fields[index]
            }
            PredicateTree::And(children) => {
                let index = match children
                    .iter()
                    .rposition(|c| matches!(c, PredicateTree::Leaf(_)))
                {
                    Some(index) => index,
                    None => {
                        children.push(PredicateTree::default());
                        children.len() - 1
                    }
                };
                children[index].field_entry(field)
            }
            PredicateTree::Or(_) => {
                let or = std::mem::take(self);
                *self = PredicateTree::And(vec![or, PredicateTree::default()]);
                self.field_entry(field)
            }
        }
    }

    /// Renders the tree in the storage collaborator's native filter format.
    pub fn to_native(&self) -> Value {
        match self {
            PredicateTree::Leaf(fields) => {
                let mut out = Map::new();
                let mut conjuncts = Vec::new();
                for predicate in fields {
                    let (ops, extra) = predicate.to_native();
                    out.insert(predicate.field.clone(), ops);
                    for ops in extra {
                        let mut single = Map::new();
                        single.insert(predicate.field.clone(), ops);
                        conjuncts.push(Value::Object(single));
                    }
                }
                if conjuncts.is_empty() {
                    return Value::Object(out);
                }
                conjuncts.insert(0, Value::Object(out));
                let mut and = Map::new();
                and.insert("$and".to_string(), Value::Array(conjuncts));
                Value::Object(and)
            }
            PredicateTree::And(children) => combinator("$and", children),
            PredicateTree::Or(children) => combinator("$or", children),
        }
    }
}

fn combinator(name: &str, children: &[PredicateTree]) -> Value {
    let mut out = Map::new();
    out.insert(
        name.to_string(),
        Value::Array(children.iter().map(PredicateTree::to_native).collect()),
    );
    Value::Object(out)
}

impl Serialize for PredicateTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_native().serialize(serializer)
    }
}
