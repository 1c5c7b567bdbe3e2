//! Bounded textual digest of a scene tree for prompt building.
//!
//! Which subtrees are included depends on the instruction text. Rendering is
//! bounded in depth and breadth, and the final digest is hard-capped, so the
//! prompt stays small no matter how large the scene is.

use super::{SceneNode, SceneTree};

/// Container whose subtree is listed for structural requests.
pub const PRIMARY_CONTAINER: &str = "Workspace";

/// Containers searched for scripts on behavioral requests.
pub const SCRIPT_CONTAINERS: &[&str] = &[
    "ReplicatedStorage",
    "ServerStorage",
    "ServerScriptService",
    "StarterGui",
];

/// Instruction keywords that pull in the primary container subtree.
pub const STRUCTURAL_KEYWORDS: &[&str] = &["part", "model", "spawn"];

/// Instruction keywords that pull in script listings.
pub const BEHAVIORAL_KEYWORDS: &[&str] = &["script", "code", "function"];

/// Appended when the digest is cut at the character cap.
pub const TRUNCATION_MARKER: &str = "\n...";

/// Properties worth showing inline next to a node.
const KEY_PROPERTIES: &[(&str, &str)] = &[
    ("Position", "Pos"),
    ("Size", "Size"),
    ("Anchored", "Anchored"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    /// Levels rendered below (and including) a container.
    pub max_depth: usize,
    /// Children shown per node before collapsing the rest.
    pub max_siblings: usize,
    pub script_preview_chars: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_siblings: 25,
            script_preview_chars: 200,
        }
    }
}

/// Summarize with default limits.
pub fn summarize(tree: &SceneTree, instruction: &str, max_chars: usize) -> String {
    summarize_with(tree, instruction, max_chars, &SummaryLimits::default())
}

pub fn summarize_with(
    tree: &SceneTree,
    instruction: &str,
    max_chars: usize,
    limits: &SummaryLimits,
) -> String {
    let lower = instruction.to_lowercase();
    let needs_structure = STRUCTURAL_KEYWORDS.iter().any(|k| lower.contains(*k));
    let needs_scripts = BEHAVIORAL_KEYWORDS.iter().any(|k| lower.contains(*k));

    let mut out = String::new();
    render_overview(tree, limits, &mut out);

    if needs_structure && let Some(container) = tree.service(PRIMARY_CONTAINER) {
        out.push_str(&format!("\n{PRIMARY_CONTAINER} Contents:\n"));
        render_subtree(container, limits, &mut out);
    }

    if needs_scripts {
        for service in SCRIPT_CONTAINERS {
            if let Some(node) = tree.service(service) {
                render_scripts(service, node, limits, &mut out);
            }
        }
    }

    truncate(out, max_chars)
}

fn render_overview(tree: &SceneTree, limits: &SummaryLimits, out: &mut String) {
    let total = tree.node_count();
    let service_count = tree.services().count();
    out.push_str(&format!(
        "Scene Overview: {total} objects across {service_count} services\n"
    ));
    for (name, node) in tree.services().take(limits.max_siblings) {
        out.push_str(&format!("- {name}: {} objects\n", node.node_count()));
    }
    if service_count > limits.max_siblings {
        out.push_str(&format!(
            "- ... and {} more services\n",
            service_count - limits.max_siblings
        ));
    }
}

enum Line<'a> {
    Node(&'a SceneNode, usize),
    More(usize, usize),
}

fn render_subtree(root: &SceneNode, limits: &SummaryLimits, out: &mut String) {
    let mut stack = vec![Line::Node(root, 0)];

    while let Some(line) = stack.pop() {
        match line {
            Line::More(count, depth) => {
                out.push_str(&format!("{}- ... {count} more\n", "  ".repeat(depth)));
            }
            Line::Node(node, depth) => {
                out.push_str(&format!(
                    "{}- {} ({}){}\n",
                    "  ".repeat(depth),
                    node.name,
                    node.class_name,
                    key_properties(node)
                ));

                if depth + 1 >= limits.max_depth || node.children.is_empty() {
                    continue;
                }
                let hidden = node.children.len().saturating_sub(limits.max_siblings);
                if hidden > 0 {
                    stack.push(Line::More(hidden, depth + 1));
                }
                for child in node.children.iter().take(limits.max_siblings).rev() {
                    stack.push(Line::Node(child, depth + 1));
                }
            }
        }
    }
}

fn key_properties(node: &SceneNode) -> String {
    let props: Vec<String> = KEY_PROPERTIES
        .iter()
        .filter_map(|(key, label)| node.property_display(key).map(|v| format!("{label}:{v}")))
        .collect();
    if props.is_empty() {
        String::new()
    } else {
        format!(" [{}]", props.join(", "))
    }
}

fn render_scripts(service: &str, node: &SceneNode, limits: &SummaryLimits, out: &mut String) {
    let scripts = node.scripts();
    if scripts.is_empty() {
        return;
    }

    out.push_str(&format!("\n{service} Scripts:\n"));
    for script in scripts.iter().take(limits.max_siblings) {
        out.push_str(&format!("- {} ({})\n", script.name, script.class_name));
        if let Some(source) = script.source {
            let preview: String = source
                .chars()
                .take(limits.script_preview_chars)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            out.push_str(&format!("  Source preview: {preview}...\n"));
        }
    }
    if scripts.len() > limits.max_siblings {
        out.push_str(&format!(
            "- ... and {} more scripts\n",
            scripts.len() - limits.max_siblings
        ));
    }
}

/// Cap `text` at `max_chars` characters, marker included.
fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
