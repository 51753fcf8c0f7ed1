use crate::error::FilterError;
use crate::value::{Metadata, MetadataValue};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single comparison against one metadata field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq(MetadataValue),
    Ne(MetadataValue),
    In(Vec<MetadataValue>),
    Gt(MetadataValue),
    Gte(MetadataValue),
    Lt(MetadataValue),
    Lte(MetadataValue),
}

impl Predicate {
    /// Evaluate against the field's value, `None` when the field is missing.
    ///
    /// A missing field only satisfies `$ne`. Range operators on values of
    /// different kinds never match.
    pub fn matches(&self, value: Option<&MetadataValue>) -> bool {
        let Some(value) = value else {
            return matches!(self, Predicate::Ne(_));
        };

        match self {
            Predicate::Eq(expected) => value == expected,
            Predicate::Ne(expected) => value != expected,
            Predicate::In(candidates) => candidates.iter().any(|c| c == value),
            Predicate::Gt(bound) => value.compare(bound) == Some(Ordering::Greater),
            Predicate::Gte(bound) => matches!(
                value.compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::Lt(bound) => value.compare(bound) == Some(Ordering::Less),
            Predicate::Lte(bound) => {
                matches!(value.compare(bound), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }

    fn parse_operator(field: &str, op: &str, operand: MetadataValue) -> Result<Self, FilterError> {
        let range_operand = |operand: MetadataValue| match operand {
            MetadataValue::Number(_) | MetadataValue::String(_) => Ok(operand),
            other => Err(FilterError::new(
                field,
                format!("`{op}` expects a number or string, got {}", other.kind()),
            )),
        };

        match op {
            "$eq" => Ok(Predicate::Eq(operand)),
            "$ne" => Ok(Predicate::Ne(operand)),
            "$in" => match operand {
                MetadataValue::List(items) if !items.is_empty() => Ok(Predicate::In(items)),
                MetadataValue::List(_) => {
                    Err(FilterError::new(field, "`$in` expects a non-empty list"))
                }
                other => Err(FilterError::new(
                    field,
                    format!("`$in` expects a list, got {}", other.kind()),
                )),
            },
            "$gt" => range_operand(operand).map(Predicate::Gt),
            "$gte" => range_operand(operand).map(Predicate::Gte),
            "$lt" => range_operand(operand).map(Predicate::Lt),
            "$lte" => range_operand(operand).map(Predicate::Lte),
            other => Err(FilterError::new(field, format!("unknown operator `{other}`"))),
        }
    }
}

/// Conjunction of predicates over metadata fields.
///
/// Every field must satisfy every predicate attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, Vec<Predicate>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate to `field`, keeping any already present.
    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.clauses.entry(field.into()).or_default().push(predicate);
        self
    }

    /// Parse a Mongo-style filter document.
    ///
    /// ```text
    /// { "lang": "rust", "stars": { "$gte": 10, "$lt": 100 }, "kind": { "$in": ["fn", "struct"] } }
    /// ```
    ///
    /// A bare value means equality. An object whose keys all start with `$`
    /// is a set of operators; any other object is compared for equality.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FilterError> {
        let serde_json::Value::Object(fields) = value else {
            return Err(FilterError::new("<root>", "filter must be an object"));
        };

        let mut filter = Self::new();
        for (field, spec) in fields {
            let predicates = match spec {
                serde_json::Value::Object(ops)
                    if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) =>
                {
                    ops.iter()
                        .map(|(op, operand)| {
                            let operand = Self::operand(field, operand)?;
                            Predicate::parse_operator(field, op, operand)
                        })
                        .collect::<Result<Vec<_>, _>>()?
                }
                other => vec![Predicate::Eq(Self::operand(field, other)?)],
            };
            filter.clauses.insert(field.clone(), predicates);
        }
        Ok(filter)
    }

    fn operand(field: &str, value: &serde_json::Value) -> Result<MetadataValue, FilterError> {
        MetadataValue::from_json(value)
            .ok_or_else(|| FilterError::new(field, "null is not a valid operand"))
    }

    /// Whether the document metadata satisfies every clause.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(field, predicates)| {
            let value = metadata.get(field);
            predicates.iter().all(|p| p.matches(value))
        })
    }

    /// Combine with `overrides`; a field present in both takes the override's
    /// predicates.
    pub fn merged_with(&self, overrides: &MetadataFilter) -> MetadataFilter {
        let mut clauses = self.clauses.clone();
        for (field, predicates) in &overrides.clauses {
            clauses.insert(field.clone(), predicates.clone());
        }
        MetadataFilter { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of constrained fields.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.clauses.keys().map(String::as_str)
    }

    pub fn clauses(&self) -> &BTreeMap<String, Vec<Predicate>> {
        &self.clauses
    }
}
