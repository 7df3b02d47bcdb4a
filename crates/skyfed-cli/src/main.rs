//! Skyfed CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;
mod logging;

use commands::Commands;
use config::ConfigSource;

#[derive(Parser)]
#[command(name = "skyfed")]
#[command(author, version, about = "Keyless cloud workload identity", long_about = None)]
struct Cli {
    /// Configuration file (YAML, JSON or TOML)
    #[arg(short, long, global = true, env = "SKYFED_CONFIG")]
    config: Option<PathBuf>,

    /// `terraform output -json` document from provisioning
    #[arg(long, global = true, env = "SKYFED_TERRAFORM_OUTPUT")]
    terraform_output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_tracing(cli.log_json);

    let source = ConfigSource::resolve(cli.config, cli.terraform_output, &std::env::current_dir()?)?;
    let config = source.load()?;

    match cli.command {
        Commands::Serve { bind } => handlers::serve(&config, bind).await?,
        Commands::Token {
            audience,
            subject,
            claims,
        } => handlers::token(&config, audience, subject, claims).await?,
        Commands::Credentials { cloud } => handlers::credentials(&config, cloud).await?,
        Commands::Config => handlers::show_config(&config)?,
    }

    Ok(())
}
