//! Operation validator.
//!
//! Turns the model's raw operation list into typed [`Operation`]s. Bad
//! entries are dropped one at a time: an invalid property only removes that
//! property, a malformed operation only removes that operation. Accepted
//! operations keep their input order.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use super::operations::{EditAction, Operation, PropertyEntry, ScriptEdit};
use crate::error::OperationError;
use crate::scene::property::{self, PropertyType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

/// A property removed from an otherwise accepted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedProperty {
    pub index: usize,
    pub property: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub accepted: Vec<Operation>,
    pub rejected: Vec<Rejection>,
    pub dropped_properties: Vec<DroppedProperty>,
}

/// Validate a raw operation list.
pub fn validate(operations: &[Value]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (index, raw) in operations.iter().enumerate() {
        let mut dropped = Vec::new();
        match validate_operation(raw, &mut dropped) {
            Ok(op) => report.accepted.push(op),
            Err(e) => {
                warn!("Rejected operation {}: {}", index, e);
                report.rejected.push(Rejection {
                    index,
                    reason: e.to_string(),
                });
            }
        }
        for (property, reason) in dropped {
            warn!("Dropped property {} of operation {}: {}", property, index, reason);
            report.dropped_properties.push(DroppedProperty {
                index,
                property,
                reason,
            });
        }
    }

    report
}

/// Validate one operation. Property-level failures are pushed to `dropped`
/// as `(name, reason)` and do not fail the operation on their own.
pub fn validate_operation(
    raw: &Value,
    dropped: &mut Vec<(String, String)>,
) -> Result<Operation, OperationError> {
    let obj = raw.as_object().ok_or(OperationError::NotAnObject)?;
    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .map(normalize_tag)
        .unwrap_or_default();

    match tag.as_str() {
        "modify_instance" => {
            let path = parse_path(obj)?;
            let raw_props = obj
                .get("properties")
                .and_then(Value::as_object)
                .ok_or(OperationError::MissingRequired("properties"))?;
            let properties = parse_properties(raw_props, dropped);
            if properties.is_empty() {
                return Err(OperationError::NoValidProperties);
            }
            Ok(Operation::ModifyInstance { path, properties })
        }
        "edit_script" => {
            let path = parse_path(obj)?;
            let raw_edits = obj
                .get("edits")
                .or_else(|| obj.get("modifications"))
                .and_then(Value::as_array)
                .filter(|edits| !edits.is_empty())
                .ok_or(OperationError::NoEdits)?;
            let edits = raw_edits
                .iter()
                .map(parse_edit)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Operation::EditScript { path, edits })
        }
        "delete_instance" => Ok(Operation::DeleteInstance {
            path: parse_path(obj)?,
        }),
        "create_instance" => {
            let path = parse_path(obj)?;
            let class_name =
                class_name(obj).ok_or(OperationError::MissingRequired("className"))?;
            let name = string_field(obj, &["name", "Name"]).unwrap_or_else(|| class_name.clone());
            let properties = obj
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| parse_properties(props, dropped))
                .unwrap_or_default();
            Ok(Operation::CreateInstance {
                class_name,
                name,
                path,
                properties,
            })
        }
        "create_script" => {
            let path = parse_path(obj)?;
            let source = string_field(obj, &["source", "Source"])
                .ok_or(OperationError::MissingRequired("source"))?;
            Ok(Operation::CreateScript {
                class_name: class_name(obj).unwrap_or_else(|| "Script".to_string()),
                name: string_field(obj, &["name", "Name"])
                    .unwrap_or_else(|| "GeneratedScript".to_string()),
                path,
                source,
            })
        }
        _ => Err(OperationError::UnknownType(tag)),
    }
}

/// `ModifyInstance`, `MODIFY_INSTANCE` and `modify-instance` all become
/// `modify_instance`.
fn normalize_tag(tag: &str) -> String {
    if !tag.chars().any(|c| c.is_ascii_lowercase()) {
        return tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    }
    let mut out = String::with_capacity(tag.len() + 4);
    for (i, c) in tag.trim().chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_path(obj: &Map<String, Value>) -> Result<Vec<String>, OperationError> {
    let path: Vec<String> = match obj.get("path") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(OperationError::EmptyPath)?,
        Some(Value::String(s)) => s.split('/').map(str::to_string).collect(),
        _ => return Err(OperationError::EmptyPath),
    };

    if path.is_empty() || path.iter().any(|segment| segment.trim().is_empty()) {
        return Err(OperationError::EmptyPath);
    }
    Ok(path)
}

fn parse_properties(
    raw: &Map<String, Value>,
    dropped: &mut Vec<(String, String)>,
) -> BTreeMap<String, PropertyEntry> {
    let mut properties = BTreeMap::new();

    for (name, value) in raw {
        let declared = value
            .as_object()
            .and_then(|o| o.get("type"))
            .and_then(Value::as_str);

        let Some(type_name) = declared else {
            properties.insert(name.clone(), PropertyEntry::Raw(value.clone()));
            continue;
        };

        let ty = PropertyType::parse(type_name);
        match value.get("value") {
            Some(wire) => match property::decode_json(&ty, wire) {
                Ok(decoded) => {
                    properties.insert(name.clone(), PropertyEntry::Typed(decoded));
                }
                Err(e) => dropped.push((name.clone(), e.to_string())),
            },
            None => dropped.push((name.clone(), format!("{ty} property has no value"))),
        }
    }

    properties
}

fn parse_edit(raw: &Value) -> Result<ScriptEdit, OperationError> {
    let obj = raw.as_object().ok_or(OperationError::NotAnObject)?;
    let action_str = obj.get("action").and_then(Value::as_str).unwrap_or_default();
    let action =
        EditAction::parse(action_str).ok_or_else(|| OperationError::InvalidAction(action_str.into()))?;

    let line_number = match obj.get("lineNumber").or_else(|| obj.get("line_number")) {
        None | Some(Value::Null) => None,
        Some(v) => Some(line_number(v).ok_or(OperationError::InvalidLineNumber)?),
    };

    let content = ["content", "newContent", "new_content"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    if action.needs_line_number() && line_number.is_none() {
        return Err(OperationError::MissingField {
            action: action.as_str().into(),
            field: "lineNumber",
        });
    }
    if action.needs_content() && content.is_none() {
        return Err(OperationError::MissingField {
            action: action.as_str().into(),
            field: "content",
        });
    }

    Ok(ScriptEdit {
        action,
        line_number,
        content,
    })
}

fn line_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return (n >= 1).then_some(n);
    }
    let f = value.as_f64()?;
    (f >= 1.0 && f.fract() == 0.0).then_some(f as u64)
}

fn class_name(obj: &Map<String, Value>) -> Option<String> {
    string_field(obj, &["className", "classTag", "class_name", "ClassName"])
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
