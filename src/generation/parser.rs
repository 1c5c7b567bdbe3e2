//! Extracts a raw operation list from a provider's completion.
//!
//! Model output is untrusted and frequently malformed, so parsing degrades
//! instead of failing: strict JSON first, then an embedded JSON object, then
//! fenced code sections, and finally an empty list with the text as summary.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::request::Mode;

pub const DEFAULT_EDIT_SUMMARY: &str = "AI operations completed";
pub const DEFAULT_GENERATE_SUMMARY: &str = "Scripts generated";
pub const EXTRACTED_SUMMARY: &str = "Extracted script from unstructured response";

/// Container that receives scripts recovered from free-form output.
const FALLBACK_SCRIPT_PARENT: &str = "ServerScriptService";

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Operations still in wire form, not yet validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub operations: Vec<Value>,
    pub summary: String,
}

/// Parse completion text. Never fails: output that matches no known shape
/// becomes an empty operation list with the text as summary.
pub fn parse(text: &str, mode: Mode) -> ParsedResponse {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    let cleaned = cleaned.trim();
    let body = strip_code_fence(cleaned);

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => {
            return from_object(&obj, mode).unwrap_or_else(|| {
                warn!("Response object has no operations, scripts or instances");
                ParsedResponse {
                    operations: Vec::new(),
                    summary: summary_field(&obj).unwrap_or_else(|| cleaned.to_string()),
                }
            });
        }
        Ok(Value::Array(ops)) => {
            return ParsedResponse {
                operations: ops,
                summary: default_summary(mode).to_string(),
            };
        }
        Ok(_) => {}
        Err(e) => debug!("Completion is not strict JSON: {}", e),
    }

    // Braces inside prose or code (e.g. `local t = {}`) only count when they
    // hold a recognized response shape.
    if let Some(parsed) = embedded_object(body).and_then(|obj| from_object(&obj, mode)) {
        debug!("Recovered JSON object embedded in completion");
        return parsed;
    }

    if mode == Mode::Generate
        && let Some(section) = fenced_section(cleaned)
    {
        debug!("Recovered fenced script section '{}'", section.name);
        return ParsedResponse {
            operations: vec![section.into_operation()],
            summary: EXTRACTED_SUMMARY.to_string(),
        };
    }

    warn!("No operations found in completion; returning summary only");
    ParsedResponse {
        operations: Vec::new(),
        summary: cleaned.to_string(),
    }
}

fn default_summary(mode: Mode) -> &'static str {
    match mode {
        Mode::DirectEdit => DEFAULT_EDIT_SUMMARY,
        Mode::Generate => DEFAULT_GENERATE_SUMMARY,
    }
}

fn summary_field(obj: &Map<String, Value>) -> Option<String> {
    obj.get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Remove a surrounding markdown fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => return text,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn embedded_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Collect operations from the known response shapes:
/// `{operations: [...]}` and `{scripts: [...], instances: [...]}`.
/// `None` when the object has none of those keys.
fn from_object(obj: &Map<String, Value>, mode: Mode) -> Option<ParsedResponse> {
    let mut operations = Vec::new();
    let mut found = false;

    if let Some(ops) = obj.get("operations").and_then(Value::as_array) {
        found = true;
        operations.extend(ops.iter().cloned());
    }
    if let Some(scripts) = obj.get("scripts").and_then(Value::as_array) {
        found = true;
        operations.extend(scripts.iter().map(|s| retag(s, "create_script")));
    }
    if let Some(instances) = obj.get("instances").and_then(Value::as_array) {
        found = true;
        operations.extend(instances.iter().map(|i| retag(i, "create_instance")));
    }

    found.then(|| ParsedResponse {
        operations,
        summary: summary_field(obj).unwrap_or_else(|| default_summary(mode).to_string()),
    })
}

/// Generate-mode entries use `type` for the class (`"LocalScript"`); move it
/// to `className` and tag the entry with its operation type.
fn retag(entry: &Value, op_type: &str) -> Value {
    let Some(obj) = entry.as_object() else {
        return entry.clone();
    };
    let mut out = obj.clone();
    if let Some(Value::String(declared)) = obj.get("type")
        && declared != op_type
        && !out.contains_key("className")
    {
        out.insert("className".into(), Value::String(declared.clone()));
    }
    out.insert("type".into(), Value::String(op_type.to_string()));
    Value::Object(out)
}

struct FencedSection {
    name: String,
    class_name: &'static str,
    code: String,
}

impl FencedSection {
    fn into_operation(self) -> Value {
        let parent = match self.class_name {
            "LocalScript" => vec!["StarterPlayer", "StarterPlayerScripts"],
            "ModuleScript" => vec!["ReplicatedStorage"],
            _ => vec![FALLBACK_SCRIPT_PARENT],
        };
        json!({
            "type": "create_script",
            "className": self.class_name,
            "name": self.name,
            "path": parent,
            "source": self.code,
        })
    }
}

/// First fenced code block, named after the nearest heading above it.
fn fenced_section(text: &str) -> Option<FencedSection> {
    let mut heading: Option<&str> = None;
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            let code: Vec<&str> = lines
                .by_ref()
                .take_while(|l| !l.trim_start().starts_with("```"))
                .collect();
            if code.iter().all(|l| l.trim().is_empty()) {
                continue;
            }
            let heading_text = heading.unwrap_or_default();
            return Some(FencedSection {
                name: script_name(heading_text),
                class_name: script_class(heading_text),
                code: code.join("\n"),
            });
        }
        if is_heading(trimmed) {
            heading = Some(trimmed);
        }
    }
    None
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#') || (line.starts_with("**") && line.ends_with("**")) || line.ends_with(':')
}

fn script_class(heading: &str) -> &'static str {
    let lower = heading.to_lowercase();
    if lower.contains("localscript") || lower.contains("local script") {
        "LocalScript"
    } else if lower.contains("modulescript") || lower.contains("module") {
        "ModuleScript"
    } else {
        "Script"
    }
}

/// Derive an instance name from a heading: alphanumeric words, capitalized.
fn script_name(heading: &str) -> String {
    let name: String = heading
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() {
        "GeneratedScript".to_string()
    } else {
        name
    }
}
