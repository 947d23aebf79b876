use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

pub mod check_config;
pub mod run;

#[derive(Debug, Parser)]
#[command(name = "impactscan")]
#[command(about = "Find the files a planned code change is likely to affect")]
#[command(version)]
pub struct Cli {
    /// Emit logs as one JSON object per line
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write reports
    Run(RunArgs),
    /// Load and validate a configuration file
    CheckConfig(CheckConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the TOML configuration
    #[arg(short, long)]
    pub config: PathBuf,

    /// Description of the planned change
    #[arg(short, long)]
    pub instruction: String,

    /// Extra keyword to scan for (repeatable)
    #[arg(short = 'k', long = "keyword")]
    pub keywords: Vec<String>,

    /// Overrides `target_dir` from the configuration
    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    /// Print each assessment as soon as it is ready
    #[arg(long)]
    pub stream: bool,
}

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Path to the TOML configuration
    #[arg(short, long)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_with_repeated_keywords() {
        let cli = Cli::try_parse_from([
            "impactscan",
            "run",
            "--config",
            "impactscan.toml",
            "--instruction",
            "improve caching layer",
            "-k",
            "cache",
            "-k",
            "ttl",
            "--stream",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), Level::DEBUG);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.keywords, vec!["cache", "ttl"]);
                assert!(args.stream);
                assert!(args.target_dir.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_instruction() {
        let err = Cli::try_parse_from(["impactscan", "run", "--config", "x.toml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_json_logs_is_global() {
        let cli = Cli::try_parse_from(["impactscan", "check-config", "-c", "x.toml", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert_eq!(cli.log_level(), Level::WARN);
    }
}
