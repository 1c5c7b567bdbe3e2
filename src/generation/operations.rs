//! Typed operations returned to the editor client.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::request::Mode;
use super::validator::{DroppedProperty, Rejection};
use crate::scene::PropertyValue;

/// A property assignment: decoded when the model declared a type, echoed
/// untouched otherwise (e.g. `"Material": "Neon"`, `"Anchored": true`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyEntry {
    Typed(PropertyValue),
    Raw(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Replace,
    Insert,
    Delete,
    Append,
}

impl EditAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "insert" => Some(Self::Insert),
            "delete" => Some(Self::Delete),
            "append" => Some(Self::Append),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Append => "append",
        }
    }

    pub fn needs_line_number(&self) -> bool {
        !matches!(self, Self::Append)
    }

    pub fn needs_content(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

/// One line-level edit of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEdit {
    pub action: EditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    ModifyInstance {
        path: Vec<String>,
        properties: BTreeMap<String, PropertyEntry>,
    },
    EditScript {
        path: Vec<String>,
        edits: Vec<ScriptEdit>,
    },
    DeleteInstance {
        path: Vec<String>,
    },
    CreateInstance {
        #[serde(rename = "className")]
        class_name: String,
        name: String,
        path: Vec<String>,
        properties: BTreeMap<String, PropertyEntry>,
    },
    CreateScript {
        #[serde(rename = "className")]
        class_name: String,
        name: String,
        path: Vec<String>,
        source: String,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModifyInstance { .. } => "modify_instance",
            Self::EditScript { .. } => "edit_script",
            Self::DeleteInstance { .. } => "delete_instance",
            Self::CreateInstance { .. } => "create_instance",
            Self::CreateScript { .. } => "create_script",
        }
    }

    pub fn path(&self) -> &[String] {
        match self {
            Self::ModifyInstance { path, .. }
            | Self::EditScript { path, .. }
            | Self::DeleteInstance { path }
            | Self::CreateInstance { path, .. }
            | Self::CreateScript { path, .. } => path,
        }
    }
}

/// Outcome of one generate call. Built once and handed to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub operations: Vec<Operation>,
    pub summary: String,
    pub provider_used: String,
    pub model: String,
    pub mode: Mode,
    pub tokens_consumed: u64,
    /// Operations the validator dropped, by index in the model's output.
    pub rejected: Vec<Rejection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_properties: Vec<DroppedProperty>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_serialize_with_type_tag() {
        let op = Operation::EditScript {
            path: vec!["ServerScriptService".into(), "Main".into()],
            edits: vec![ScriptEdit {
                action: EditAction::Insert,
                line_number: Some(3),
                content: Some("print('hi')".into()),
            }],
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "type": "edit_script",
                "path": ["ServerScriptService", "Main"],
                "edits": [{"action": "insert", "lineNumber": 3, "content": "print('hi')"}]
            })
        );
    }

    #[test]
    fn create_script_uses_class_name_key() {
        let op = Operation::CreateScript {
            class_name: "LocalScript".into(),
            name: "Hud".into(),
            path: vec!["StarterGui".into()],
            source: "-- hud".into(),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["className"], "LocalScript");
        assert_eq!(op.kind(), "create_script");
    }

    #[test]
    fn raw_properties_are_echoed() {
        let entry = PropertyEntry::Raw(json!("Neon"));
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!("Neon"));
    }

    #[test]
    fn action_requirements() {
        assert!(EditAction::Replace.needs_line_number() && EditAction::Replace.needs_content());
        assert!(!EditAction::Append.needs_line_number());
        assert!(!EditAction::Delete.needs_content());
    }
}
