use super::RunArgs;
use crate::output;
use crate::progress::RunSpinner;
use crate::report;
use anyhow::{Context, Result};
use domain::{ImpactRunSummary, ImpactScanConfig, Settings};
use orchestrator::{CancellationToken, Engine};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn load_config(args: &RunArgs) -> Result<ImpactScanConfig> {
    let mut config = ImpactScanConfig::load(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;
    if let Some(dir) = &args.target_dir {
        config.target_dir = dir.clone();
    }
    Ok(config.validated()?)
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            token.cancel();
        }
    })
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let settings = Settings::load(&config);
    let perspectives = config.analysis.perspectives.clone();
    let output_config = config.output.clone();
    let engine = Engine::from_config(config, &settings).context("failed to set up the pipeline")?;

    info!(
        target_dir = %engine.config().target_dir.display(),
        stream = args.stream,
        "starting run"
    );

    let summary = if args.stream {
        run_streaming(&engine, &args).await?
    } else {
        run_batch(&engine, &args).await?
    };

    let reports = report::write_reports(&output_config, &summary, &perspectives)?;
    output::print_summary(&summary, &reports, !args.stream);
    Ok(())
}

async fn run_batch(engine: &Engine, args: &RunArgs) -> Result<ImpactRunSummary> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let spinner = RunSpinner::start("Scanning repository");
    let result = engine
        .run_with_cancel(&args.instruction, &args.keywords, cancel)
        .await;
    spinner.finish();
    watcher.abort();
    Ok(result?)
}

async fn run_streaming(engine: &Engine, args: &RunArgs) -> Result<ImpactRunSummary> {
    let mut stream = engine.stream(args.instruction.clone(), args.keywords.clone());
    let watcher = cancel_on_ctrl_c(stream.cancellation_token());
    while let Some(assessment) = stream.next().await {
        output::print_assessment(&assessment);
    }
    let result = stream.finish().await;
    watcher.abort();
    Ok(result?)
}
