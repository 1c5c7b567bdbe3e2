//! studiogen - natural-language scene editing for a game-editor plugin
//!
//! This crate provides:
//! - Scene tree model, property codec and bounded scene summaries
//! - Complexity and mode classification of instructions
//! - Multi-provider AI completion with ordered fallback
//! - Response parsing and operation validation
//! - HTTP server for the editor plugin

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod paths;
pub mod providers;
pub mod scene;
pub mod server;

pub use config::Config;
pub use error::GenerationError;
pub use generation::{GenerateRequest, GenerationResult, Generator, Operation};
