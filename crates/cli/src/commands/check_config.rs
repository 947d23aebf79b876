use super::CheckConfigArgs;
use anyhow::{Context, Result};
use console::style;
use domain::{ImpactScanConfig, Settings};

/// Which provider the configuration selects and whether its key is present.
pub fn provider_status(config: &ImpactScanConfig, settings: &Settings) -> (&'static str, bool) {
    if config.azure_openai.enabled {
        let ok = settings
            .require_azure_key(&config.azure_openai.api_key_env)
            .is_ok();
        ("azure_openai", ok)
    } else if config.openai.enabled {
        let ok = settings.require_openai_key(&config.openai.api_key_env).is_ok();
        ("openai", ok)
    } else {
        ("none", false)
    }
}

pub fn execute(args: CheckConfigArgs) -> Result<()> {
    let config = ImpactScanConfig::load(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;
    let settings = Settings::load(&config);

    println!("{} {}", style("configuration OK:").green().bold(), args.config.display());
    println!("  target_dir   {}", config.target_dir.display());
    println!("  analyzer     {}", config.preprocess.analyzer.name());
    println!("  perspectives {}", config.analysis.perspectives.join(", "));
    println!(
        "  triage       threshold {} parallelism {}",
        config.analysis.triage_threshold, config.analysis.parallelism
    );
    println!(
        "  cache        {}",
        match (&config.cache.dir, config.cache.enabled) {
            (_, false) => "disabled".to_string(),
            (Some(dir), true) => format!("sled at {}", dir.display()),
            (None, true) => "in-memory".to_string(),
        }
    );

    match provider_status(&config, &settings) {
        ("none", _) => println!("  {} no LLM provider enabled", style("warning:").yellow().bold()),
        (provider, true) => println!("  provider     {provider} (key present)"),
        (provider, false) => println!(
            "  {} {provider} enabled but its API key is not set",
            style("warning:").yellow().bold()
        ),
    }
    Ok(())
}
