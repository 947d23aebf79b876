//! Incremental assembler for `rg --json` output.
//!
//! Fed one line at a time. Keeps the last N lines of the current file for
//! before-context and holds each hit until N following lines (or the file's
//! `end` message) have been seen.

use domain::CandidateHit;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AssemblerError {
    #[error("malformed ripgrep message: {0}")]
    Malformed(String),

    #[error("non UTF-8 path in ripgrep output")]
    NonUtf8Path,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum Message {
    Begin(FileData),
    Match(LineData),
    Context(LineData),
    End(FileData),
    Summary(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct FileData {
    path: Text,
}

#[derive(Debug, Deserialize)]
struct LineData {
    path: Text,
    lines: Text,
    line_number: Option<u32>,
    absolute_offset: u64,
    #[serde(default)]
    submatches: Vec<Submatch>,
}

/// ripgrep encodes invalid UTF-8 as `{"bytes": base64}`.
#[derive(Debug, Deserialize)]
struct Text {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Submatch {
    #[serde(rename = "match")]
    matched: Text,
    start: u64,
}

#[derive(Debug)]
struct PendingHit {
    hit: CandidateHit,
    remaining_after: usize,
}

#[derive(Debug, Default)]
struct FileState {
    path: PathBuf,
    before: VecDeque<(u32, String)>,
    pending: Vec<PendingHit>,
}

#[derive(Debug)]
pub struct HitAssembler {
    context_lines: usize,
    current: Option<FileState>,
    files_seen: usize,
}

impl HitAssembler {
    pub fn new(context_lines: usize) -> Self {
        Self {
            context_lines,
            current: None,
            files_seen: 0,
        }
    }

    /// Distinct files that produced a `begin` message.
    pub fn files_seen(&self) -> usize {
        self.files_seen
    }

    /// Consumes one output line and returns the hits it completed.
    pub fn feed(&mut self, line: &str) -> Result<Vec<CandidateHit>, AssemblerError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let message: Message =
            serde_json::from_str(line).map_err(|e| AssemblerError::Malformed(e.to_string()))?;

        match message {
            Message::Begin(data) => {
                let completed = self.flush_current();
                let path = data.path.text.ok_or(AssemblerError::NonUtf8Path)?;
                self.current = Some(FileState {
                    path: PathBuf::from(path),
                    ..FileState::default()
                });
                self.files_seen += 1;
                Ok(completed)
            }
            Message::Match(data) => self.on_line(data, true),
            Message::Context(data) => self.on_line(data, false),
            Message::End(_) => Ok(self.flush_current()),
            Message::Summary(_) => Ok(Vec::new()),
        }
    }

    /// Flushes hits still waiting for after-context.
    pub fn finish(&mut self) -> Vec<CandidateHit> {
        self.flush_current()
    }

    fn flush_current(&mut self) -> Vec<CandidateHit> {
        match self.current.take() {
            Some(state) => state.pending.into_iter().map(|p| p.hit).collect(),
            None => Vec::new(),
        }
    }

    fn on_line(&mut self, data: LineData, is_match: bool) -> Result<Vec<CandidateHit>, AssemblerError> {
        let path = data.path.text.ok_or(AssemblerError::NonUtf8Path)?;
        let line_number = data
            .line_number
            .ok_or_else(|| AssemblerError::Malformed("missing line_number".to_string()))?;
        let text = strip_newline(data.lines.text.unwrap_or_default());

        // Tolerate streams without a `begin` for this path.
        let mut completed = Vec::new();
        let same_file = self
            .current
            .as_ref()
            .is_some_and(|s| s.path == Path::new(&path));
        if !same_file {
            completed.extend(self.flush_current());
            self.current = Some(FileState {
                path: PathBuf::from(&path),
                ..FileState::default()
            });
            self.files_seen += 1;
        }

        let n = self.context_lines;
        let Some(state) = self.current.as_mut() else {
            return Ok(completed);
        };

        // This line is after-context for earlier pending hits.
        let mut still_pending = Vec::with_capacity(state.pending.len());
        for mut pending in state.pending.drain(..) {
            if pending.hit.line < line_number && pending.remaining_after > 0 {
                pending.hit.context_lines.push(text.clone());
                pending.remaining_after -= 1;
            }
            if pending.remaining_after == 0 {
                completed.push(pending.hit);
            } else {
                still_pending.push(pending);
            }
        }
        state.pending = still_pending;

        if is_match {
            let lower = line_number.saturating_sub(n as u32);
            let mut context: Vec<String> = state
                .before
                .iter()
                .filter(|(l, _)| *l >= lower && *l < line_number)
                .map(|(_, t)| t.clone())
                .collect();
            context.push(text.clone());

            for submatch in &data.submatches {
                let hit = CandidateHit::new(
                    &state.path,
                    line_number,
                    submatch.start as u32,
                    data.absolute_offset + submatch.start,
                )
                .with_matched_text(submatch.matched.text.clone().unwrap_or_default())
                .with_context(context.clone());

                if n == 0 {
                    completed.push(hit);
                } else {
                    state.pending.push(PendingHit {
                        hit,
                        remaining_after: n,
                    });
                }
            }
        }

        if n > 0 {
            state.before.push_back((line_number, text));
            while state.before.len() > n {
                state.before.pop_front();
            }
        }

        Ok(completed)
    }
}

fn strip_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin(path: &str) -> String {
        format!(r#"{{"type":"begin","data":{{"path":{{"text":"{path}"}}}}}}"#)
    }

    fn end(path: &str) -> String {
        format!(
            r#"{{"type":"end","data":{{"path":{{"text":"{path}"}},"binary_offset":null,"stats":{{}}}}}}"#
        )
    }

    fn context(path: &str, line: u32, offset: u64, text: &str) -> String {
        format!(
            r#"{{"type":"context","data":{{"path":{{"text":"{path}"}},"lines":{{"text":"{text}\n"}},"line_number":{line},"absolute_offset":{offset},"submatches":[]}}}}"#
        )
    }

    fn matched(path: &str, line: u32, offset: u64, text: &str, subs: &[(&str, u64)]) -> String {
        let subs: Vec<String> = subs
            .iter()
            .map(|(m, start)| {
                format!(
                    r#"{{"match":{{"text":"{m}"}},"start":{start},"end":{}}}"#,
                    start + m.len() as u64
                )
            })
            .collect();
        format!(
            r#"{{"type":"match","data":{{"path":{{"text":"{path}"}},"lines":{{"text":"{text}\n"}},"line_number":{line},"absolute_offset":{offset},"submatches":[{}]}}}}"#,
            subs.join(",")
        )
    }

    #[test]
    fn test_hit_waits_for_after_context() {
        let mut asm = HitAssembler::new(1);
        assert!(asm.feed(&begin("a.rs")).unwrap().is_empty());
        assert!(asm.feed(&context("a.rs", 1, 0, "fn a() {")).unwrap().is_empty());
        assert!(asm
            .feed(&matched("a.rs", 2, 9, "    cache.get()", &[("cache", 4)]))
            .unwrap()
            .is_empty());

        let hits = asm.feed(&context("a.rs", 3, 25, "}")).unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.file, PathBuf::from("a.rs"));
        assert_eq!(hit.line, 2);
        assert_eq!(hit.column, 4);
        assert_eq!(hit.byte_offset, 13);
        assert_eq!(hit.matched_text, "cache");
        assert_eq!(hit.context_lines, vec!["fn a() {", "    cache.get()", "}"]);
    }

    #[test]
    fn test_one_hit_per_submatch_and_end_flushes() {
        let mut asm = HitAssembler::new(2);
        asm.feed(&begin("b.py")).unwrap();
        asm.feed(&matched("b.py", 1, 0, "cache ttl", &[("cache", 0), ("ttl", 6)]))
            .unwrap();
        let hits = asm.feed(&end("b.py")).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].byte_offset, 6);
        assert_eq!(hits[1].context_lines, vec!["cache ttl"]);
    }

    #[test]
    fn test_adjacent_match_is_after_context_of_previous() {
        let mut asm = HitAssembler::new(1);
        asm.feed(&begin("c.rs")).unwrap();
        asm.feed(&matched("c.rs", 1, 0, "cache", &[("cache", 0)])).unwrap();
        let hits = asm.feed(&matched("c.rs", 2, 6, "cache2", &[("cache", 0)])).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].context_lines, vec!["cache", "cache2"]);
        let rest = asm.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].context_lines, vec!["cache", "cache2"]);
    }

    #[test]
    fn test_malformed_and_summary_lines() {
        let mut asm = HitAssembler::new(0);
        assert!(matches!(asm.feed("{not json"), Err(AssemblerError::Malformed(_))));
        assert!(asm
            .feed(r#"{"type":"summary","data":{"elapsed_total":{}}}"#)
            .unwrap()
            .is_empty());
        assert!(asm
            .feed(r#"{"type":"begin","data":{"path":{"bytes":"AAE="}}}"#)
            .is_err());
    }
}
