use anyhow::Result;
use clap::Args;

use crate::providers::{ProviderStatus, availability};

#[derive(Args)]
pub struct ProvidersArgs {
    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: ProvidersArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let table = availability(&config.providers, |key| std::env::var(key).ok());

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&table)?),
        _ => print_table(&table),
    }

    Ok(())
}

fn print_table(table: &[ProviderStatus]) {
    let primary = table.iter().find(|s| s.available).map(|s| s.key);

    println!("{:<12} {:<18} {:<20} {:<10} MODEL", "KEY", "NAME", "ENV VAR", "STATUS");
    for status in table {
        let state = match (status.available, Some(status.key) == primary) {
            (true, true) => "primary",
            (true, false) => "fallback",
            _ => "missing",
        };
        println!(
            "{:<12} {:<18} {:<20} {:<10} {}",
            status.key, status.name, status.env_var, state, status.model
        );
    }

    if primary.is_none() {
        println!(
            "\nNo provider is configured. Set one of: {}",
            table
                .iter()
                .map(|s| s.env_var)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}
