use anyhow::Result;
use clap::Args;

use crate::generation::classifier::{Classification, classify};
use crate::generation::request::{self, RequestSize};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// The instruction to classify
    pub prompt: String,

    /// Scene tree JSON file ("-" for stdin)
    #[arg(short, long)]
    pub scene: Option<String>,

    /// Request size: small, medium or large
    #[arg(long)]
    pub size: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let errors = request::validate_prompt(&args.prompt);
    if !errors.is_empty() {
        anyhow::bail!("Invalid prompt: {}", errors.join("; "));
    }

    let size = match args.size.as_deref() {
        Some(size) => {
            RequestSize::parse(size).ok_or_else(|| anyhow::anyhow!("Invalid size: {}", size))?
        }
        None => config.generation.default_request_size,
    };
    let scene = super::read_scene(args.scene.as_deref())?;
    let classification = classify(&args.prompt, &scene, &[], size);

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&classification)?),
        _ => print_text(&classification),
    }

    Ok(())
}

fn print_text(c: &Classification) {
    println!("Mode:            {}", c.mode);
    println!("Complexity:      {:.1}", c.complexity_score);
    println!("Estimated cost:  {}", c.estimated_cost);
    println!(
        "Votes:           direct_edit={} generate={}",
        c.votes.direct_edit, c.votes.generate
    );
    if c.deletion_requested {
        println!("Deletion:        requested");
    }
    if !c.matched_keywords.is_empty() {
        println!("Keywords:        {}", c.matched_keywords.join(", "));
    }
}
