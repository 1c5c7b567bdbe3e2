pub mod analyze;
pub mod config;
pub mod generate;
pub mod providers;
pub mod serve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;

use crate::config::Config;
use crate::scene::{SceneNode, SceneTree};

#[derive(Parser)]
#[command(name = "studiogen")]
#[command(
    author,
    version,
    about = "Turns natural-language instructions into typed scene operations"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "STUDIOGEN_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve(serve::ServeArgs),

    /// Generate operations for one instruction
    Generate(generate::GenerateArgs),

    /// Classify an instruction without calling any provider
    Analyze(analyze::AnalyzeArgs),

    /// Show which AI providers are configured
    Providers(providers::ProvidersArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

/// Load config from the `--config` file when given, else the default location.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(Path::new(path)),
        None => Config::load(),
    }
}

/// Read a scene tree from a JSON file, or use a bare Workspace.
pub(crate) fn read_scene(path: Option<&str>) -> Result<SceneTree> {
    let Some(path) = path else {
        return Ok(SceneTree::new().with_service("Workspace", SceneNode::new("Workspace", "Workspace")));
    };
    let content = if path == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read scene from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read scene file {}", path))?
    };
    serde_json::from_str(&content).with_context(|| format!("Invalid scene tree in {}", path))
}
