use anyhow::Result;
use clap::Parser;
use cli::commands::{check_config, run};
use cli::{Cli, Commands};
use common::{init_structured_logging, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_structured_logging(
        LoggingConfig::default()
            .with_level(cli.log_level())
            .with_json(cli.json_logs),
    )?;

    match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::CheckConfig(args) => check_config::execute(args),
    }
}
