use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::paths::Paths;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., generation.timeout_secs)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., providers.anthropic.model)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(args: ConfigArgs, config_path: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(config_path, &format),
        ConfigCommands::Get { key } => get_config(config_path, &key),
        ConfigCommands::Set { key, value } => set_config(config_path, &key, &value),
        ConfigCommands::Path => show_path(config_path),
        ConfigCommands::Init { force } => init_config(config_path, force),
    }
}

fn resolve_paths(config_path: Option<&str>) -> Result<Paths> {
    let paths = Paths::resolve()?;
    Ok(match config_path {
        Some(path) => paths.with_config_file(path),
        None => paths,
    })
}

fn show_config(config_path: Option<&str>, format: &str) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    // Never echo credentials.
    for settings in [
        &mut config.providers.openrouter,
        &mut config.providers.openai,
        &mut config.providers.anthropic,
        &mut config.providers.google,
    ]
    .into_iter()
    .flatten()
    {
        if settings.api_key.is_some() {
            settings.api_key = Some("********".to_string());
        }
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn get_config(config_path: Option<&str>, key: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let value = config.get_value(key)?;
    println!("{}", value);
    Ok(())
}

fn set_config(config_path: Option<&str>, key: &str, value: &str) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    config.set_value(key, value)?;
    config.save()?;
    println!("Set {} = {}", key, value);
    Ok(())
}

fn show_path(config_path: Option<&str>) -> Result<()> {
    let path = resolve_paths(config_path)?.config_file();
    println!("{}", path.display());
    Ok(())
}

fn init_config(config_path: Option<&str>, force: bool) -> Result<()> {
    let paths = resolve_paths(config_path)?;
    let path = paths.config_file();

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    paths.ensure_dirs()?;
    let config = Config {
        paths,
        ..Config::default()
    };
    config.save_with_template()?;

    Ok(())
}
