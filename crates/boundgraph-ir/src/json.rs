//! JSON form of the query IR.
//!
//! Accepted shapes:
//!
//! ```json
//! [ {"op": "ScanType", "entity_type": "Person", "scope": ["root"]},
//!   {"op": "Limit", "n": 5} ]
//! ```
//!
//! or the same array wrapped as `{"ops": [...]}`.
//!
//! `Operator` derives `Deserialize` for typed round trips, but documents are
//! compiled here by hand so every error names the operator index and the
//! offending field (`ScanType.entity_type`, ...). `QueryIr`'s `Deserialize`
//! routes through [`compile`].

use serde_json::{Map, Value};

use crate::{Direction, IrError, Operator, QueryIr};

pub fn compile(value: &Value) -> Result<QueryIr, IrError> {
    let ops = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("ops") {
            Some(Value::Array(items)) => items,
            _ => return Err(IrError::BadShape),
        },
        _ => return Err(IrError::BadShape),
    };

    let compiled = ops
        .iter()
        .enumerate()
        .map(|(index, op)| compile_operator(index, op))
        .collect::<Result<Vec<_>, _>>()?;

    QueryIr::new(compiled)
}

fn compile_operator(index: usize, value: &Value) -> Result<Operator, IrError> {
    let obj = value.as_object().ok_or_else(|| IrError::Operator {
        index,
        message: "operator must be a JSON object".to_string(),
    })?;

    let name = match obj.get("op") {
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(IrError::Operator {
                index,
                message: "`op` must be a string".to_string(),
            })
        }
        None => {
            return Err(IrError::Operator {
                index,
                message: "missing `op` tag".to_string(),
            })
        }
    };

    match name {
        "SeedEntities" => {
            let entity_ids = required_string_list(obj, index, "SeedEntities", "entity_ids")?;
            if let Some(pos) = entity_ids.iter().position(|id| id.is_empty()) {
                return Err(IrError::field(
                    index,
                    "SeedEntities.entity_ids",
                    format!("contains an empty id at position {pos}"),
                ));
            }
            Ok(Operator::SeedEntities { entity_ids })
        }
        "ScanType" => {
            let entity_type = match obj.get("entity_type") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
                _ => {
                    return Err(IrError::field(
                        index,
                        "ScanType.entity_type",
                        "must be a non-empty string",
                    ))
                }
            };
            let scope = optional_string_list(obj, index, "ScanType", "scope")?;
            Ok(Operator::ScanType { entity_type, scope })
        }
        "Expand" => {
            let direction = match obj.get("direction") {
                None | Some(Value::Null) => Direction::default(),
                Some(Value::String(s)) => s
                    .parse::<Direction>()
                    .map_err(|e| IrError::field(index, "Expand.direction", e))?,
                Some(_) => {
                    return Err(IrError::field(
                        index,
                        "Expand.direction",
                        "must be one of outgoing|incoming|both",
                    ))
                }
            };
            let relationship_types =
                optional_string_list(obj, index, "Expand", "relationship_types")?;
            let max_per_node = match obj.get("max_per_node") {
                None | Some(Value::Null) => None,
                Some(v) => Some(non_negative_int(v).ok_or_else(|| {
                    IrError::field(index, "Expand.max_per_node", "must be an integer >= 0")
                })?),
            };
            Ok(Operator::Expand {
                relationship_types,
                direction,
                max_per_node,
            })
        }
        "Limit" => {
            let n = obj
                .get("n")
                .and_then(non_negative_int)
                .ok_or_else(|| IrError::field(index, "Limit.n", "must be an integer >= 0"))?;
            Ok(Operator::Limit { n })
        }
        "Project" => {
            let fields = required_string_list(obj, index, "Project", "fields")?;
            Ok(Operator::Project { fields })
        }
        other => Err(IrError::UnsupportedOperator {
            index,
            name: other.to_string(),
        }),
    }
}

fn non_negative_int(v: &Value) -> Option<usize> {
    v.as_u64().and_then(|n| usize::try_from(n).ok())
}

fn string_list(
    value: &Value,
    index: usize,
    op: &str,
    key: &str,
) -> Result<Vec<String>, IrError> {
    let field = format!("{op}.{key}");
    let items = value
        .as_array()
        .ok_or_else(|| IrError::field(index, &field, "must be a list of strings"))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                IrError::field(index, &field, format!("item {i} is not a string"))
            })
        })
        .collect()
}

fn required_string_list(
    obj: &Map<String, Value>,
    index: usize,
    op: &str,
    key: &str,
) -> Result<Vec<String>, IrError> {
    let field = format!("{op}.{key}");
    let value = obj
        .get(key)
        .ok_or_else(|| IrError::field(index, &field, "is required"))?;
    let items = string_list(value, index, op, key)?;
    if items.is_empty() {
        return Err(IrError::field(index, &field, "must be a non-empty list"));
    }
    Ok(items)
}

fn optional_string_list(
    obj: &Map<String, Value>,
    index: usize,
    op: &str,
    key: &str,
) -> Result<Option<Vec<String>>, IrError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => string_list(v, index, op, key).map(Some),
    }
}
