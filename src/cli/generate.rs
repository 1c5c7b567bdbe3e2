use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use crate::generation::{
    GenerateRequest, GenerationResult, GenerationSettings, Generator, Operation, RequestSize,
    RequestedMode,
};
use crate::providers::{HttpTransport, ProviderRegistry};

#[derive(Args)]
pub struct GenerateArgs {
    /// The instruction, e.g. "make all parts red"
    pub prompt: String,

    /// Scene tree JSON file ("-" for stdin). Defaults to an empty Workspace.
    #[arg(short, long)]
    pub scene: Option<String>,

    /// Mode: direct_edit, script_generation or auto
    #[arg(short, long, default_value = "auto")]
    pub mode: String,

    /// Request size: small, medium or large
    #[arg(long)]
    pub size: Option<String>,

    /// Provider to use as primary for this run (e.g. anthropic)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: GenerateArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let mode = RequestedMode::parse(&args.mode)
        .ok_or_else(|| anyhow::anyhow!("Invalid mode: {}", args.mode))?;
    let scene = super::read_scene(args.scene.as_deref())?;

    let mut request = GenerateRequest::new(args.prompt, scene).with_mode(mode);
    if let Some(size) = args.size.as_deref() {
        let size =
            RequestSize::parse(size).ok_or_else(|| anyhow::anyhow!("Invalid size: {}", size))?;
        request = request.with_size(size);
    }

    let registry = ProviderRegistry::from_env(&config.providers)?;
    if let Some(provider) = args.provider.as_deref() {
        registry.switch(provider)?;
    }

    let generator = Generator::new(
        Arc::new(registry),
        Arc::new(HttpTransport::new()),
        GenerationSettings::from(&config.generation),
    );
    let result = generator.generate(&request).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result)?,
    }

    Ok(())
}

fn print_text(result: &GenerationResult) -> Result<()> {
    println!("{}", result.summary);
    println!(
        "\nProvider: {} ({})  Mode: {}  Tokens: {}",
        result.provider_used, result.model, result.mode, result.tokens_consumed
    );

    if result.operations.is_empty() {
        println!("\nNo operations.");
    } else {
        println!("\nOperations:");
        for (i, op) in result.operations.iter().enumerate() {
            println!("{:>3}. {} {}", i + 1, op.kind(), op.path().join("/"));
            if let Operation::CreateScript { source, .. } = op {
                for line in source.lines() {
                    println!("       | {}", line);
                }
            } else {
                println!("       {}", serde_json::to_string(op)?);
            }
        }
    }

    if !result.rejected.is_empty() {
        println!("\nRejected:");
        for rejection in &result.rejected {
            println!("  #{}: {}", rejection.index, rejection.reason);
        }
    }
    for dropped in &result.dropped_properties {
        println!(
            "  dropped {} of #{}: {}",
            dropped.property, dropped.index, dropped.reason
        );
    }

    Ok(())
}
