//! Boundgraph query IR.
//!
//! A compiled query is an ordered pipeline of a handful of operators. The
//! pipeline is pure data: it carries no behavior and is interpreted strictly
//! left to right by `boundgraph-exec`.
//!
//! ```text
//!   SeedEntities / ScanType      (start the working set)
//!        │
//!        ▼
//!   Expand*  Limit*              (reshape the working set)
//!        │
//!        ▼
//!   Project                      (pick header fields for output rows)
//! ```
//!
//! Front ends either build the operators directly or hand us a JSON document,
//! see [`QueryIr::from_json_str`].

pub mod json;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Header fields materialized when a pipeline carries no `Project`.
pub const DEFAULT_PROJECT_FIELDS: [&str; 3] = ["id", "type", "name"];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("query IR must contain at least one operator")]
    EmptyPipeline,

    #[error("query IR is not valid JSON: {0}")]
    Json(String),

    #[error("query IR must be an array of operators or an object with an `ops` array")]
    BadShape,

    #[error("operator #{index}: {message}")]
    Operator { index: usize, message: String },

    #[error("operator #{index}: unsupported operator `{name}`")]
    UnsupportedOperator { index: usize, name: String },

    #[error("operator #{index}: `{field}` {message}")]
    InvalidField {
        index: usize,
        field: String,
        message: String,
    },
}

impl IrError {
    pub(crate) fn field(index: usize, field: &str, message: impl Into<String>) -> Self {
        IrError::InvalidField {
            index,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Which edges `Expand` follows, relative to each source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outgoing" => Ok(Direction::Outgoing),
            "incoming" => Ok(Direction::Incoming),
            "both" => Ok(Direction::Both),
            other => Err(format!(
                "unknown direction `{other}` (expected outgoing|incoming|both)"
            )),
        }
    }
}

/// One step of a compiled query.
///
/// The derived `Deserialize` checks shape only. Whole pipelines should come
/// in through [`QueryIr`], which also applies the value checks in [`json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operator {
    /// Start from a caller-supplied list of entity ids.
    SeedEntities { entity_ids: Vec<String> },

    /// Start from every entity of `entity_type`.
    ///
    /// `scope` is a list of root ids the backend may use to narrow the scan.
    /// It is advisory: the engine never re-filters what the backend returns.
    ScanType {
        entity_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        scope: Option<Vec<String>>,
    },

    /// Replace the working set with the neighbors of each member.
    Expand {
        #[serde(skip_serializing_if = "Option::is_none")]
        relationship_types: Option<Vec<String>>,
        #[serde(default)]
        direction: Direction,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_per_node: Option<usize>,
    },

    /// Keep at most `n` members of the working set.
    Limit { n: usize },

    /// Header fields to materialize for each output row.
    Project { fields: Vec<String> },
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::SeedEntities { .. } => "SeedEntities",
            Operator::ScanType { .. } => "ScanType",
            Operator::Expand { .. } => "Expand",
            Operator::Limit { .. } => "Limit",
            Operator::Project { .. } => "Project",
        }
    }

    pub fn seed<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operator::SeedEntities {
            entity_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn scan(entity_type: impl Into<String>) -> Self {
        Operator::ScanType {
            entity_type: entity_type.into(),
            scope: None,
        }
    }

    pub fn scan_in<I, S>(entity_type: impl Into<String>, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operator::ScanType {
            entity_type: entity_type.into(),
            scope: Some(scope.into_iter().map(Into::into).collect()),
        }
    }

    pub fn expand(direction: Direction) -> Self {
        Operator::Expand {
            relationship_types: None,
            direction,
            max_per_node: None,
        }
    }

    pub fn limit(n: usize) -> Self {
        Operator::Limit { n }
    }

    pub fn project<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operator::Project {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// An ordered, non-empty operator pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryIr {
    ops: Vec<Operator>,
}

impl QueryIr {
    pub fn new(ops: Vec<Operator>) -> Result<Self, IrError> {
        if ops.is_empty() {
            return Err(IrError::EmptyPipeline);
        }
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// A constructed pipeline is never empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The `n` of the operator right after `index`, if that operator is a `Limit`.
    pub fn limit_after(&self, index: usize) -> Option<usize> {
        match self.ops.get(index + 1) {
            Some(Operator::Limit { n }) => Some(*n),
            _ => None,
        }
    }

    /// Fields requested for output rows. The last `Project` wins; without one
    /// the default `id`/`type`/`name` set applies.
    pub fn output_fields(&self) -> Vec<String> {
        self.ops
            .iter()
            .rev()
            .find_map(|op| match op {
                Operator::Project { fields } => Some(fields.clone()),
                _ => None,
            })
            .unwrap_or_else(|| {
                DEFAULT_PROJECT_FIELDS
                    .iter()
                    .map(|f| f.to_string())
                    .collect()
            })
    }

    /// Compile a JSON document (array of operators, or `{"ops": [...]}`).
    pub fn from_json_str(text: &str) -> Result<Self, IrError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| IrError::Json(e.to_string()))?;
        json::compile(&value)
    }

    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, IrError> {
        json::compile(value)
    }

    /// Render back to the `{"ops": [...]}` form accepted by `from_json_*`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<'de> Deserialize<'de> for QueryIr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        json::compile(&value).map_err(serde::de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a QueryIr {
    type Item = &'a Operator;
    type IntoIter = std::slice::Iter<'a, Operator>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipeline_is_rejected() {
        assert_eq!(QueryIr::new(vec![]), Err(IrError::EmptyPipeline));
    }

    #[test]
    fn operators_deserialize_from_their_serialized_form() {
        let op: Operator = serde_json::from_str(r#"{"op": "Expand"}"#).unwrap();
        assert_eq!(op, Operator::expand(Direction::Outgoing));

        let op = Operator::scan_in("Person", ["root"]);
        let back: Operator = serde_json::from_value(serde_json::to_value(&op).unwrap()).unwrap();
        assert_eq!(back, op);

        assert!(serde_json::from_str::<Operator>(r#"{"op": "Filter"}"#).is_err());
    }

    #[test]
    fn pipelines_deserialize_with_value_checks() {
        let ir = QueryIr::new(vec![Operator::seed(["a"]), Operator::limit(3)]).unwrap();
        let text = serde_json::to_string(&ir).unwrap();
        assert_eq!(serde_json::from_str::<QueryIr>(&text).unwrap(), ir);

        let err = serde_json::from_str::<QueryIr>(r#"{"ops": []}"#).unwrap_err();
        assert!(err.to_string().contains("at least one operator"), "{err}");

        let err =
            serde_json::from_str::<QueryIr>(r#"[{"op": "ScanType", "entity_type": ""}]"#).unwrap_err();
        assert!(err.to_string().contains("ScanType.entity_type"), "{err}");
    }

    #[test]
    fn limit_after_only_looks_one_step_ahead() {
        let ir = QueryIr::new(vec![
            Operator::scan("Person"),
            Operator::limit(5),
            Operator::expand(Direction::Outgoing),
            Operator::project(["id"]),
            Operator::limit(2),
        ])
        .unwrap();

        assert_eq!(ir.limit_after(0), Some(5));
        assert_eq!(ir.limit_after(1), None);
        assert_eq!(ir.limit_after(2), None);
        assert_eq!(ir.limit_after(3), Some(2));
        assert_eq!(ir.limit_after(4), None);
    }

    #[test]
    fn output_fields_default_and_last_project_wins() {
        let ir = QueryIr::new(vec![Operator::seed(["a"])]).unwrap();
        assert_eq!(ir.output_fields(), vec!["id", "type", "name"]);

        let ir = QueryIr::new(vec![
            Operator::project(["id"]),
            Operator::seed(["a"]),
            Operator::project(["name", "age"]),
        ])
        .unwrap();
        assert_eq!(ir.output_fields(), vec!["name", "age"]);
    }

    #[test]
    fn to_json_uses_op_tags() {
        let ir = QueryIr::new(vec![
            Operator::scan_in("Person", ["root"]),
            Operator::expand(Direction::Both),
            Operator::limit(3),
        ])
        .unwrap();

        let v = ir.to_json();
        assert_eq!(v["ops"][0]["op"], "ScanType");
        assert_eq!(v["ops"][0]["scope"][0], "root");
        assert_eq!(v["ops"][1]["direction"], "both");
        assert!(v["ops"][1].get("max_per_node").is_none());
        assert_eq!(v["ops"][2]["n"], 3);
    }

    #[test]
    fn direction_parses_known_names_only() {
        assert_eq!("incoming".parse::<Direction>(), Ok(Direction::Incoming));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
