use crate::language::Language;
use crate::noncode::HitCategory;
use crate::tokens::truncate_to_tokens;
use domain::{CandidateFileWindow, CandidateHit, ImpactScanConfig, LineSpan};
use std::fmt::Write;
use std::path::Path;

/// A hit that survived the [`HitPolicy`](crate::HitPolicy).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedHit {
    pub hit: CandidateHit,
    pub category: HitCategory,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    pub merge_window_lines: u32,
    pub context_lines: u32,
    pub max_tokens: usize,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self::from_config(&ImpactScanConfig::for_target("."))
    }
}

impl WindowOptions {
    pub fn from_config(config: &ImpactScanConfig) -> Self {
        Self {
            merge_window_lines: config.preprocess.merge_window_lines.max(1),
            context_lines: config.ripgrep.context_lines,
            max_tokens: config.preprocess.max_tokens_file_context.max(1),
        }
    }
}

/// Merges spans whose gap, measured from the previous span's last line, is at
/// most `merge_window_lines`. Applying it twice changes nothing.
pub fn merge_spans(spans: &[LineSpan], merge_window_lines: u32) -> Vec<LineSpan> {
    let mut sorted = spans.to_vec();
    sorted.sort_unstable();
    let mut merged: Vec<LineSpan> = Vec::with_capacity(sorted.len());
    for span in sorted {
        match merged.last_mut() {
            Some(prev) if span.start.saturating_sub(prev.last_line()) <= merge_window_lines => {
                prev.end = prev.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Numbered excerpt of `content` around each span.
///
/// Each span is padded by `context_lines` on both sides and clipped to the
/// file; padded ranges that touch are rendered as one `@@ lines a-b @@` block.
pub fn render_context(content: &str, spans: &[LineSpan], context_lines: u32) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len() as u32;
    if total == 0 {
        return String::new();
    }

    let mut blocks: Vec<(u32, u32)> = Vec::new();
    for span in spans {
        let first = span.start.saturating_sub(context_lines).max(1);
        let last = span.last_line().saturating_add(context_lines).min(total);
        if first > last {
            continue;
        }
        match blocks.last_mut() {
            Some((_, prev_last)) if first <= prev_last.saturating_add(1) => {
                *prev_last = (*prev_last).max(last);
            }
            _ => blocks.push((first, last)),
        }
    }

    let mut out = String::new();
    for (first, last) in blocks {
        let _ = writeln!(out, "@@ lines {first}-{last} @@");
        for n in first..=last {
            let _ = writeln!(out, "{n:>5} | {}", lines[(n - 1) as usize]);
        }
    }
    out
}

/// Builds the window for one file from its kept hits. Returns `None` when no
/// hit was kept.
pub fn build_window(
    file: &Path,
    content: &str,
    content_hash: &str,
    language: Language,
    hits: &[WeightedHit],
    options: &WindowOptions,
) -> Option<CandidateFileWindow> {
    if hits.is_empty() {
        return None;
    }

    let mut ordered: Vec<&WeightedHit> = hits.iter().collect();
    ordered.sort_by_key(|h| h.hit.byte_offset);

    let line_spans: Vec<LineSpan> = ordered.iter().map(|h| LineSpan::line(h.hit.line)).collect();
    let spans = merge_spans(&line_spans, options.merge_window_lines);

    let context = truncate_to_tokens(
        &render_context(content, &spans, options.context_lines),
        options.max_tokens,
    );

    let mut matched_lines: Vec<u32> = ordered.iter().map(|h| h.hit.line).collect();
    matched_lines.sort_unstable();
    matched_lines.dedup();
    let source: Vec<&str> = content.lines().collect();
    let matched_text = matched_lines
        .iter()
        .map(|&n| {
            source
                .get((n as usize).saturating_sub(1))
                .map(|line| line.trim().to_string())
                .unwrap_or_default()
        })
        .collect();

    let weight = ordered.iter().map(|h| h.weight).sum::<f32>() / ordered.len() as f32;

    Some(CandidateFileWindow {
        file: file.to_path_buf(),
        spans,
        context,
        hit_count: ordered.len(),
        weight: weight.clamp(0.0, 1.0),
        content_hash: content_hash.to_string(),
        matched_lines,
        matched_text,
        language: (language != Language::Unknown).then(|| language.as_str().to_string()),
    })
}
