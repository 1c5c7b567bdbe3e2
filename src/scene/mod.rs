//! Scene-graph snapshot supplied by the editor client.
//!
//! The tree is treated as opaque input: it is read for counts, listings and
//! script previews but never mutated. Traversal uses an explicit stack
//! because depth is not bounded by anything we control.

pub mod property;
pub mod summary;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use property::{PropertyType, PropertyValue};
pub use summary::{SummaryLimits, summarize};

/// One node of the scene tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    #[serde(
        default,
        rename = "className",
        alias = "ClassName",
        alias = "class_name",
        alias = "classTag"
    )]
    pub class_name: String,

    #[serde(default, alias = "Name")]
    pub name: String,

    /// Property name to raw wire value, as sent by the client.
    #[serde(default, alias = "Properties")]
    pub properties: BTreeMap<String, Value>,

    #[serde(default, alias = "Children")]
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(class_name: &str, name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Pre-order walk in child insertion order, yielding `(node, depth)`.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(self, 0)],
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    pub fn is_script(&self) -> bool {
        self.class_name.contains("Script")
    }

    /// All script nodes in this subtree, in traversal order.
    pub fn scripts(&self) -> Vec<ScriptRef<'_>> {
        self.walk()
            .map(|(node, _)| node)
            .filter(|node| node.is_script())
            .map(|node| ScriptRef {
                name: &node.name,
                class_name: &node.class_name,
                source: node.properties.get("Source").and_then(Value::as_str),
            })
            .collect()
    }

    /// Short string form of a property value for display.
    pub fn property_display(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Borrowed view of a script discovered in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptRef<'a> {
    pub name: &'a str,
    pub class_name: &'a str,
    pub source: Option<&'a str>,
}

/// Explicit-stack pre-order iterator over a subtree.
pub struct Walk<'a> {
    stack: Vec<(&'a SceneNode, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a SceneNode, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        // Reverse so the first child is popped first.
        for child in node.children.iter().rev() {
            self.stack.push((child, depth + 1));
        }
        Some((node, depth))
    }
}

/// Root of the snapshot: top-level service name to service node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneTree {
    services: BTreeMap<String, SceneNode>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, name: &str, node: SceneNode) -> Self {
        self.services.insert(name.to_string(), node);
        self
    }

    pub fn service(&self, name: &str) -> Option<&SceneNode> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &SceneNode)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Total node count across all services.
    pub fn node_count(&self) -> usize {
        self.services.values().map(SceneNode::node_count).sum()
    }
}

/// A node the user has selected in the editor, referenced by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedInstance {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(
        default,
        rename = "className",
        alias = "ClassName",
        alias = "class_name",
        alias = "classTag"
    )]
    pub class_name: String,

    #[serde(default)]
    pub path: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SceneNode {
        SceneNode::new("Workspace", "Workspace")
            .with_child(
                SceneNode::new("Model", "House")
                    .with_child(SceneNode::new("Part", "Wall"))
                    .with_child(SceneNode::new("Script", "Door").with_property("Source", "print(1)")),
            )
            .with_child(SceneNode::new("Part", "Baseplate"))
    }

    #[test]
    fn walk_is_preorder_in_insertion_order() {
        let root = sample();
        let names: Vec<_> = root.walk().map(|(n, d)| (n.name.as_str(), d)).collect();
        assert_eq!(
            names,
            vec![
                ("Workspace", 0),
                ("House", 1),
                ("Wall", 2),
                ("Door", 2),
                ("Baseplate", 1)
            ]
        );
    }

    #[test]
    fn deep_trees_do_not_overflow() {
        let mut node = SceneNode::new("Folder", "leaf");
        for i in 0..50_000 {
            node = SceneNode::new("Folder", &format!("f{i}")).with_child(node);
        }
        assert_eq!(node.node_count(), 50_001);
        // Unwind without recursive drop.
        let mut stack = vec![node];
        while let Some(mut n) = stack.pop() {
            stack.append(&mut n.children);
        }
    }

    #[test]
    fn scripts_carry_source() {
        let root = sample();
        let scripts = root.scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, "Door");
        assert_eq!(scripts[0].source, Some("print(1)"));
    }

    #[test]
    fn deserializes_editor_field_names() {
        let tree: SceneTree = serde_json::from_value(json!({
            "Workspace": {
                "Name": "Workspace",
                "ClassName": "Workspace",
                "Properties": {},
                "Children": [
                    {"Name": "Part1", "ClassName": "Part", "Properties": {"Anchored": true}}
                ]
            }
        }))
        .unwrap();

        let ws = tree.service("Workspace").unwrap();
        assert_eq!(ws.children[0].class_name, "Part");
        assert_eq!(ws.children[0].properties["Anchored"], json!(true));
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn selected_instance_accepts_class_name_aliases() {
        let sel: SelectedInstance = serde_json::from_value(json!({
            "name": "Part1",
            "className": "Part",
            "path": ["Workspace", "Part1"]
        }))
        .unwrap();
        assert_eq!(sel.class_name, "Part");
        assert_eq!(sel.path.len(), 2);
    }
}
