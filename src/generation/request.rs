//! Inbound generate request and its shape validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GenerationError;
use crate::scene::{SceneTree, SelectedInstance};

pub const MIN_PROMPT_CHARS: usize = 3;
pub const MAX_PROMPT_CHARS: usize = 2000;
pub const MAX_SELECTED_INSTANCES: usize = 50;

/// Operating mode actually used for a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "direct_edit")]
    DirectEdit,
    #[serde(rename = "script_generation", alias = "generate")]
    Generate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectEdit => "direct_edit",
            Self::Generate => "script_generation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode as requested by the caller; `Auto` defers to the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestedMode {
    #[serde(rename = "direct_edit")]
    DirectEdit,
    #[serde(rename = "script_generation", alias = "generate")]
    Generate,
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl RequestedMode {
    pub fn resolve(self, suggested: Mode) -> Mode {
        match self {
            Self::DirectEdit => Mode::DirectEdit,
            Self::Generate => Mode::Generate,
            Self::Auto => suggested,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct_edit" | "direct-edit" | "edit" => Some(Self::DirectEdit),
            "script_generation" | "generate" | "generation" => Some(Self::Generate),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl RequestSize {
    /// Output token budget sent to the provider.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Small => 1500,
            Self::Medium => 3000,
            Self::Large => 6000,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,

    #[serde(default, alias = "gameTree")]
    pub scene_tree: SceneTree,

    #[serde(default)]
    pub request_size: Option<RequestSize>,

    #[serde(default)]
    pub mode: RequestedMode,

    #[serde(default)]
    pub selected_instances: Vec<SelectedInstance>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, scene_tree: SceneTree) -> Self {
        Self {
            prompt: prompt.into(),
            scene_tree,
            request_size: None,
            mode: RequestedMode::Auto,
            selected_instances: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: RequestedMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_size(mut self, size: RequestSize) -> Self {
        self.request_size = Some(size);
        self
    }

    pub fn with_selection(mut self, selected: Vec<SelectedInstance>) -> Self {
        self.selected_instances = selected;
        self
    }

    /// Check the request shape, collecting every violation.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let mut errors = validate_prompt(&self.prompt);

        if self.scene_tree.is_empty() {
            errors.push("Scene tree must contain at least one service".to_string());
        }

        errors.extend(validate_selection(&self.selected_instances));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GenerationError::Validation(errors))
        }
    }
}

pub fn validate_prompt(prompt: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let len = prompt.trim().chars().count();

    if len < MIN_PROMPT_CHARS {
        errors.push(format!(
            "Prompt must be at least {MIN_PROMPT_CHARS} characters long"
        ));
    }
    if len > MAX_PROMPT_CHARS {
        errors.push(format!(
            "Prompt must be at most {MAX_PROMPT_CHARS} characters long"
        ));
    }
    if prompt.contains(['<', '>', '{', '}']) {
        errors.push("Prompt contains invalid characters".to_string());
    }
    errors
}

pub fn validate_selection(selected: &[SelectedInstance]) -> Vec<String> {
    let mut errors = Vec::new();

    if selected.len() > MAX_SELECTED_INSTANCES {
        errors.push(format!(
            "At most {MAX_SELECTED_INSTANCES} selected instances are allowed"
        ));
    }
    for (i, instance) in selected.iter().enumerate() {
        if instance.path.is_empty() {
            errors.push(format!("Selected instance {i}: empty path"));
        }
    }
    errors
}

static UNSAFE_SCHEMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(javascript|data):").expect("valid regex"));

/// Strip URL-scheme markers before the prompt is embedded in model messages.
pub fn sanitize_prompt(prompt: &str) -> String {
    UNSAFE_SCHEMES.replace_all(prompt, "").trim().to_string()
}
