//! Console rendering of assessments and run summaries.

use console::{style, StyledObject};
use domain::{ImpactAssessment, ImpactLevel, ImpactRunSummary};
use std::path::PathBuf;

fn level_badge(level: ImpactLevel) -> StyledObject<String> {
    let label = format!("{:<6}", level.as_str().to_uppercase());
    match level {
        ImpactLevel::High => style(label).red().bold(),
        ImpactLevel::Medium => style(label).yellow().bold(),
        ImpactLevel::Low => style(label).cyan(),
        ImpactLevel::None => style(label).dim(),
    }
}

pub fn format_assessment(a: &ImpactAssessment) -> String {
    format!(
        "{} {} {} {}",
        level_badge(a.impact_level),
        style(format!("{:.2}", a.confidence)).dim(),
        style(a.file_display()).bold(),
        a.reason
    )
}

pub fn print_assessment(a: &ImpactAssessment) {
    println!("{}", format_assessment(a));
}

pub fn print_summary(summary: &ImpactRunSummary, reports: &[PathBuf], with_assessments: bool) {
    println!();
    println!("{} {}", style("Goal:").bold(), summary.intention_goal);
    println!("{} {}", style("Keywords:").bold(), summary.keywords.join(", "));
    println!(
        "{} {} files with hits, {} windows, {} triaged in, {} triaged out",
        style("Scan:").bold(),
        summary.scanned_files,
        summary.candidate_windows,
        summary.triaged_in,
        summary.triaged_out
    );

    let failed = if summary.failed > 0 {
        style(format!("{} failed", summary.failed)).red().bold()
    } else {
        style("0 failed".to_string()).green()
    };
    println!(
        "{} {} assessed, {} ({} triage, {} analysis), {} cache hits",
        style("Result:").bold(),
        style(summary.assessed).green().bold(),
        failed,
        summary.failed_triage,
        summary.failed_analysis,
        summary.cache_hits
    );
    println!(
        "{} {} total ({} prompt, {} completion) in {:.1}s",
        style("Tokens:").bold(),
        summary.token_usage.total_tokens,
        summary.token_usage.prompt_tokens,
        summary.token_usage.completion_tokens,
        summary.duration.as_secs_f64()
    );

    if with_assessments && !summary.assessments.is_empty() {
        println!();
        for a in &summary.assessments {
            print_assessment(a);
        }
    }

    for f in &summary.failures {
        println!("{} {} ({}): {}", style("!").red().bold(), f.file.display(), f.stage, f.reason);
    }

    if !reports.is_empty() {
        println!();
        for path in reports {
            println!("{} {}", style("wrote").dim(), path.display());
        }
    }
}
