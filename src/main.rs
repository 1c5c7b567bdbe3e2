use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use studiogen::cli::{self, Cli, Commands};
use studiogen::config::LoggingConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Config problems are reported by the command itself; logging falls back to defaults.
    let logging = cli::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(&logging, cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => cli::serve::run(args, config_path).await,
        Commands::Generate(args) => cli::generate::run(args, config_path).await,
        Commands::Analyze(args) => cli::analyze::run(args, config_path).await,
        Commands::Providers(args) => cli::providers::run(args, config_path).await,
        Commands::Config(args) => cli::config::run(args, config_path).await,
    }
}

/// RUST_LOG wins, then --verbose, then `logging.level`.
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
