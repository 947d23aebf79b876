//! Report files written after a run.

use anyhow::{Context, Result};
use domain::config::OutputConfig;
use domain::{ImpactAssessment, ImpactLevel, ImpactRunSummary};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_FILE: &str = "impact.csv";
pub const JSONL_FILE: &str = "impact.jsonl";
pub const SUMMARY_FILE: &str = "summary.md";

const FIXED_COLUMNS: [&str; 6] = [
    "file",
    "impact_level",
    "reason",
    "confidence",
    "num_occurrences",
    "lines",
];

/// Quotes a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = fields
        .into_iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// One row per assessment plus one score column per perspective, in the
/// configured order. Matched lines share one cell, newline separated.
pub fn write_csv(path: &Path, assessments: &[ImpactAssessment], perspectives: &[String]) -> Result<()> {
    let mut out = create(path)?;
    let header = FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(perspectives.iter().cloned());
    out.write_all(csv_row(header).as_bytes())?;

    for a in assessments {
        let fixed = [
            a.file_display(),
            a.impact_level.to_string(),
            a.reason.clone(),
            format!("{:.3}", a.confidence),
            a.num_occurrences.to_string(),
            a.lines.join("\n"),
        ];
        let scores = perspectives.iter().map(|p| {
            a.perspective_scores
                .get(p)
                .map(|s| format!("{s:.3}"))
                .unwrap_or_default()
        });
        out.write_all(csv_row(fixed.into_iter().chain(scores)).as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_jsonl(path: &Path, assessments: &[ImpactAssessment]) -> Result<()> {
    let mut out = create(path)?;
    for a in assessments {
        serde_json::to_writer(&mut out, a)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn md_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_summary_md(summary: &ImpactRunSummary) -> String {
    let mut md = String::new();
    // Writing to a String cannot fail.
    let _ = render_into(&mut md, summary);
    md
}

fn render_into(md: &mut String, summary: &ImpactRunSummary) -> std::fmt::Result {
    writeln!(md, "# ImpactScan summary\n")?;
    writeln!(md, "- Started: {}", summary.started_at.to_rfc3339())?;
    writeln!(md, "- Goal: {}", summary.intention_goal)?;
    writeln!(md, "- Keywords: {}", summary.keywords.join(", "))?;
    writeln!(md, "- Duration: {} ms\n", summary.duration.as_millis())?;

    writeln!(md, "## Counts\n")?;
    writeln!(md, "| Metric | Count |\n|---|---:|")?;
    for (name, value) in [
        ("Files with hits", summary.scanned_files),
        ("Candidate windows", summary.candidate_windows),
        ("Triaged in", summary.triaged_in),
        ("Triaged out", summary.triaged_out),
        ("Assessed", summary.assessed),
        ("Failed (triage)", summary.failed_triage),
        ("Failed (analysis)", summary.failed_analysis),
        ("Cache hits", summary.cache_hits),
        ("Scan warnings", summary.scan_warnings),
    ] {
        writeln!(md, "| {name} | {value} |")?;
    }

    let usage = &summary.token_usage;
    writeln!(md, "\n## Token usage\n")?;
    writeln!(md, "| Prompt | Completion | Total |\n|---:|---:|---:|")?;
    writeln!(
        md,
        "| {} | {} | {} |",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    )?;

    writeln!(md, "\n## Impact levels\n")?;
    writeln!(md, "| Level | Files |\n|---|---:|")?;
    for level in ImpactLevel::ALL.iter().rev() {
        let count = summary
            .assessments
            .iter()
            .filter(|a| a.impact_level == *level)
            .count();
        writeln!(md, "| {level} | {count} |")?;
    }

    writeln!(md, "\n## Assessments\n")?;
    if summary.assessments.is_empty() {
        writeln!(md, "No files assessed.")?;
    } else {
        writeln!(md, "| File | Level | Confidence | Reason |\n|---|---|---:|---|")?;
        for a in &summary.assessments {
            writeln!(
                md,
                "| {} | {} | {:.2} | {} |",
                md_cell(&a.file_display()),
                a.impact_level,
                a.confidence,
                md_cell(&a.reason)
            )?;
        }
    }

    if !summary.failures.is_empty() {
        writeln!(md, "\n## Failures\n")?;
        for f in &summary.failures {
            writeln!(md, "- `{}` ({}): {}", f.file.display(), f.stage, md_cell(&f.reason))?;
        }
    }
    Ok(())
}

pub fn write_summary_md(path: &Path, summary: &ImpactRunSummary) -> Result<()> {
    let mut out = create(path)?;
    out.write_all(render_summary_md(summary).as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Writes every report enabled in `output` and returns the paths written.
pub fn write_reports(
    output: &OutputConfig,
    summary: &ImpactRunSummary,
    perspectives: &[String],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if output.write_csv {
        let path = output.dir.join(CSV_FILE);
        write_csv(&path, &summary.assessments, perspectives)?;
        written.push(path);
    }
    if output.write_jsonl {
        let path = output.dir.join(JSONL_FILE);
        write_jsonl(&path, &summary.assessments)?;
        written.push(path);
    }
    if output.write_summary_md {
        let path = output.dir.join(SUMMARY_FILE);
        write_summary_md(&path, summary)?;
        written.push(path);
    }
    tracing::info!(files = written.len(), dir = %output.dir.display(), "reports written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("cache", "cache")]
    #[case::comma("a,b", "\"a,b\"")]
    #[case::quote("say \"hi\"", "\"say \"\"hi\"\"\"")]
    #[case::newline("line\nbreak", "\"line\nbreak\"")]
    fn test_csv_field_quoting(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(csv_field(raw), expected);
    }

    #[test]
    fn test_md_cell_escapes_pipes_and_newlines() {
        assert_eq!(md_cell("a|b\nc"), "a\\|b c");
    }
}
