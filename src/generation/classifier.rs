//! Complexity scoring and mode selection for an instruction.
//!
//! Pure and deterministic. All weights live in the tables below so tests
//! (and tuning) work against the data rather than inline conditionals.
//! The result is advisory: callers may force a mode explicitly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::request::{Mode, RequestSize};
use crate::scene::{SceneTree, SelectedInstance};

pub const MAX_COMPLEXITY: f32 = 10.0;

/// Keyword weights added to the complexity score. Heavy entries mark
/// algorithmic or system-level work, light entries mark property tweaks.
pub const COMPLEXITY_KEYWORDS: &[(&str, f32)] = &[
    ("batch", 2.0),
    ("recursive", 2.0),
    ("optimize", 2.0),
    ("pathfinding", 2.0),
    ("algorithm", 2.0),
    ("procedural", 2.0),
    ("multiplayer", 2.0),
    ("datastore", 2.0),
    ("inventory", 2.0),
    ("leaderboard", 2.0),
    ("animation", 2.0),
    ("physics", 2.0),
    ("raycast", 2.0),
    ("npc", 2.0),
    ("system", 2.0),
    ("color", 0.5),
    ("colour", 0.5),
    ("size", 0.5),
    ("position", 0.5),
    ("move", 0.5),
    ("rotate", 0.5),
    ("scale", 0.5),
    ("transparency", 0.5),
    ("anchor", 0.5),
    ("material", 0.5),
    ("rename", 0.5),
    ("red", 0.5),
    ("green", 0.5),
    ("blue", 0.5),
];

/// Words that mean the request touches code.
pub const SCRIPT_KEYWORDS: &[&str] = &["script", "code", "function"];
pub const SCRIPT_BONUS: f32 = 3.0;

pub const LENGTH_DIVISOR: f32 = 100.0;
pub const LENGTH_CAP: f32 = 5.0;
pub const SCENE_NODES_DIVISOR: f32 = 100.0;
pub const SCENE_CAP: f32 = 3.0;
pub const SELECTION_DIVISOR: f32 = 10.0;
pub const SELECTION_CAP: f32 = 2.0;

/// Above this complexity the request always goes to generate mode.
pub const FORCE_GENERATE_ABOVE: f32 = 7.0;

pub const MODE_KEYWORD_WEIGHT: f32 = 2.0;
pub const MODE_PATTERN_WEIGHT: f32 = 3.0;
pub const SELECTION_BIAS: f32 = 1.0;
pub const LENGTH_BIAS: f32 = 1.0;
pub const SHORT_INSTRUCTION_CHARS: usize = 30;
pub const LONG_INSTRUCTION_CHARS: usize = 100;

/// Keywords voting for a mode.
pub const MODE_KEYWORDS: &[(&str, Mode)] = &[
    ("change", Mode::DirectEdit),
    ("set", Mode::DirectEdit),
    ("resize", Mode::DirectEdit),
    ("color", Mode::DirectEdit),
    ("colour", Mode::DirectEdit),
    ("size", Mode::DirectEdit),
    ("position", Mode::DirectEdit),
    ("move", Mode::DirectEdit),
    ("rotate", Mode::DirectEdit),
    ("scale", Mode::DirectEdit),
    ("transparency", Mode::DirectEdit),
    ("anchor", Mode::DirectEdit),
    ("material", Mode::DirectEdit),
    ("rename", Mode::DirectEdit),
    ("delete", Mode::DirectEdit),
    ("remove", Mode::DirectEdit),
    ("fix", Mode::DirectEdit),
    ("red", Mode::DirectEdit),
    ("green", Mode::DirectEdit),
    ("blue", Mode::DirectEdit),
    ("bigger", Mode::DirectEdit),
    ("smaller", Mode::DirectEdit),
    ("script", Mode::Generate),
    ("create", Mode::Generate),
    ("when", Mode::Generate),
    ("click", Mode::Generate),
    ("touch", Mode::Generate),
    ("event", Mode::Generate),
    ("spawn", Mode::Generate),
    ("system", Mode::Generate),
    ("gui", Mode::Generate),
    ("leaderboard", Mode::Generate),
    ("animation", Mode::Generate),
    ("animate", Mode::Generate),
    ("tween", Mode::Generate),
    ("function", Mode::Generate),
    ("behavior", Mode::Generate),
    ("behaviour", Mode::Generate),
    ("npc", Mode::Generate),
    ("teleport", Mode::Generate),
    ("timer", Mode::Generate),
    ("loop", Mode::Generate),
    ("generate", Mode::Generate),
    ("build", Mode::Generate),
];

/// Structural patterns voting for a mode.
pub static MODE_PATTERNS: Lazy<Vec<(Regex, Mode)>> = Lazy::new(|| {
    [
        (r"\b(change|set|make|turn|paint)\b.+\b(to|into)\b", Mode::DirectEdit),
        (r"\b(delete|remove|destroy)\b", Mode::DirectEdit),
        (r"\b(resize|move|rotate|scale)\b.+\bby\b", Mode::DirectEdit),
        (r"\bline\s+\d+", Mode::DirectEdit),
        (
            r"\bwhen\b.+\b(click|clicked|touch|touched|press|pressed|joins?|dies|die)\b",
            Mode::Generate,
        ),
        (
            r"\b(create|make|build|add)\b.+\b(script|system|gui|leaderboard|npc|menu)\b",
            Mode::Generate,
        ),
        (r"\bon\s+(click|touch|join)\b", Mode::Generate),
        (r"\bevery\s+\d*\s*(seconds?|minutes?)\b", Mode::Generate),
    ]
    .into_iter()
    .map(|(pattern, mode)| (Regex::new(pattern).expect("valid regex"), mode))
    .collect()
});

/// Substrings signalling the user wants something removed.
pub const DELETION_MARKERS: &[&str] = &["delete", "remove", "destroy"];

/// Cost multiplier per mode.
pub fn mode_multiplier(mode: Mode) -> f32 {
    match mode {
        Mode::DirectEdit => 1.0,
        Mode::Generate => 2.0,
    }
}

/// Cost multiplier per requested size.
pub fn size_multiplier(size: RequestSize) -> f32 {
    match size {
        RequestSize::Small => 1.0,
        RequestSize::Medium => 1.5,
        RequestSize::Large => 2.5,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeVotes {
    pub direct_edit: f32,
    pub generate: f32,
}

impl ModeVotes {
    fn add(&mut self, mode: Mode, weight: f32) {
        match mode {
            Mode::DirectEdit => self.direct_edit += weight,
            Mode::Generate => self.generate += weight,
        }
    }

    /// Ties go to direct edit.
    pub fn winner(&self) -> Mode {
        if self.generate > self.direct_edit {
            Mode::Generate
        } else {
            Mode::DirectEdit
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub complexity_score: f32,
    pub mode: Mode,
    pub estimated_cost: u32,
    /// The instruction asks for something to be deleted or removed.
    pub deletion_requested: bool,
    pub votes: ModeVotes,
    pub matched_keywords: Vec<String>,
}

pub fn classify(
    instruction: &str,
    tree: &SceneTree,
    selected: &[SelectedInstance],
    size: RequestSize,
) -> Classification {
    let lower = instruction.to_lowercase();
    let tokens = tokenize(&lower);
    let length = instruction.chars().count();

    // Complexity
    let mut matched_keywords = Vec::new();
    let mut score = (length as f32 / LENGTH_DIVISOR).min(LENGTH_CAP);
    for (keyword, weight) in COMPLEXITY_KEYWORDS {
        if mentions(&lower, &tokens, keyword) {
            score += weight;
            matched_keywords.push(keyword.to_string());
        }
    }
    score += (tree.node_count() as f32 / SCENE_NODES_DIVISOR).min(SCENE_CAP);
    score += (selected.len() as f32 / SELECTION_DIVISOR).min(SELECTION_CAP);
    if SCRIPT_KEYWORDS.iter().any(|k| mentions(&lower, &tokens, k)) {
        score += SCRIPT_BONUS;
    }
    let complexity_score = score.clamp(0.0, MAX_COMPLEXITY);

    // Mode vote
    let mut votes = ModeVotes::default();
    for (keyword, mode) in MODE_KEYWORDS {
        if mentions(&lower, &tokens, keyword) {
            votes.add(*mode, MODE_KEYWORD_WEIGHT);
        }
    }
    for (pattern, mode) in MODE_PATTERNS.iter() {
        if pattern.is_match(&lower) {
            votes.add(*mode, MODE_PATTERN_WEIGHT);
        }
    }
    if !selected.is_empty() {
        votes.add(Mode::DirectEdit, SELECTION_BIAS);
    }
    if length < SHORT_INSTRUCTION_CHARS {
        votes.add(Mode::DirectEdit, LENGTH_BIAS);
    } else if length > LONG_INSTRUCTION_CHARS {
        votes.add(Mode::Generate, LENGTH_BIAS);
    }

    let mode = if complexity_score > FORCE_GENERATE_ABOVE {
        Mode::Generate
    } else {
        votes.winner()
    };

    Classification {
        complexity_score,
        mode,
        estimated_cost: estimate_cost(mode, size, complexity_score),
        deletion_requested: DELETION_MARKERS.iter().any(|m| lower.contains(*m)),
        votes,
        matched_keywords,
    }
}

pub fn estimate_cost(mode: Mode, size: RequestSize, complexity: f32) -> u32 {
    let raw = mode_multiplier(mode) * size_multiplier(size) * (1.0 + complexity / 10.0);
    (raw.ceil() as u32).max(1)
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whole-word match allowing common inflections (`parts`, `anchored`,
/// `clicking`). Multi-word keywords fall back to substring search.
fn mentions(lower: &str, tokens: &[&str], keyword: &str) -> bool {
    if keyword.contains(' ') {
        return lower.contains(keyword);
    }
    tokens.iter().any(|token| {
        *token == keyword
            || ["s", "es", "ed", "d", "ing"]
                .iter()
                .any(|suffix| token.strip_suffix(*suffix) == Some(keyword))
    })
}
