use crate::rg_json::HitAssembler;
use crate::stream::{HitStream, ScanCounters};
use common::{ImpactError, ImpactResult};
use domain::{CandidateHit, ImpactScanConfig};
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;
/// Bytes of stderr kept for error messages. The rest is read and discarded
/// so `rg` never blocks on a full pipe.
const STDERR_LIMIT: usize = 4096;

fn drain_stderr(mut stderr: impl Read) -> String {
    let mut kept = Vec::new();
    let _ = stderr.by_ref().take(STDERR_LIMIT as u64).read_to_end(&mut kept);
    let _ = io::copy(&mut stderr, &mut io::sink());
    String::from_utf8_lossy(&kept).trim().to_string()
}

async fn drain_stderr_async(mut stderr: impl AsyncRead + Unpin) -> String {
    let mut kept = Vec::new();
    let _ = (&mut stderr).take(STDERR_LIMIT as u64).read_to_end(&mut kept).await;
    let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&kept).trim().to_string()
}

/// Flags for one `rg` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub binary: String,
    pub target_dir: PathBuf,
    pub context_lines: u32,
    pub fixed_strings: bool,
    pub smart_case: bool,
    pub threads: usize,
    pub include_hidden: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl ScanOptions {
    pub fn from_config(config: &ImpactScanConfig) -> Self {
        Self {
            binary: config.ripgrep.binary.clone(),
            target_dir: config.target_dir.clone(),
            context_lines: config.ripgrep.context_lines,
            fixed_strings: config.ripgrep.fixed_strings,
            smart_case: config.ripgrep.smart_case,
            threads: config.ripgrep.threads,
            include_hidden: config.ripgrep.include_hidden,
            include_globs: config.include_globs.clone(),
            exclude_globs: config.exclude_globs.clone(),
        }
    }
}

/// Lexical pre-filter backed by `rg --json`.
#[derive(Debug, Clone)]
pub struct RipgrepScanner {
    options: ScanOptions,
}

impl RipgrepScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &ImpactScanConfig) -> Self {
        Self::new(ScanOptions::from_config(config))
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Command-line arguments, excluding the binary.
    pub fn build_args(&self, keywords: &[String]) -> Vec<String> {
        let o = &self.options;
        let mut args = vec![
            "--json".to_string(),
            "--context".to_string(),
            o.context_lines.to_string(),
        ];
        if o.fixed_strings {
            args.push("--fixed-strings".to_string());
        }
        args.push(if o.smart_case {
            "--smart-case".to_string()
        } else {
            "--case-sensitive".to_string()
        });
        if o.threads > 0 {
            args.push("--threads".to_string());
            args.push(o.threads.to_string());
        }
        if o.include_hidden {
            args.push("--hidden".to_string());
        }
        for glob in &o.include_globs {
            args.push("--glob".to_string());
            args.push(glob.clone());
        }
        for glob in &o.exclude_globs {
            args.push("--glob".to_string());
            args.push(format!("!{glob}"));
        }
        for keyword in keywords {
            args.push("--regexp".to_string());
            args.push(keyword.clone());
        }
        args
    }

    fn unavailable(&self, reason: impl Into<String>) -> ImpactError {
        ImpactError::tool_unavailable(&self.options.binary, reason)
    }

    /// Starts the scan and returns a stream of hits.
    ///
    /// A missing executable fails here; a bad exit status arrives as the last
    /// stream item.
    pub async fn search(&self, keywords: &[String]) -> ImpactResult<HitStream> {
        if keywords.is_empty() {
            debug!("no keywords, skipping scan");
            return Ok(HitStream::empty());
        }

        let args = self.build_args(keywords);
        debug!(binary = %self.options.binary, ?args, "spawning ripgrep");

        let mut child = tokio::process::Command::new(&self.options.binary)
            .args(&args)
            .current_dir(&self.options.target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.unavailable("stdout was not captured"))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let counters = Arc::new(ScanCounters::default());
        let task_counters = Arc::clone(&counters);
        let context_lines = self.options.context_lines as usize;
        let binary = self.options.binary.clone();

        tokio::spawn(async move {
            let stderr_task = tokio::spawn(async move {
                match stderr {
                    Some(stderr) => drain_stderr_async(stderr).await,
                    None => String::new(),
                }
            });

            let mut assembler = HitAssembler::new(context_lines);
            let mut lines = tokio::io::BufReader::new(stdout).lines();
            let mut emitted = 0usize;

            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("hit stream dropped, stopping ripgrep");
                        let _ = child.start_kill();
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match assembler.feed(&line) {
                            Ok(hits) => {
                                task_counters.files.store(assembler.files_seen(), Ordering::Relaxed);
                                for hit in hits {
                                    emitted += 1;
                                    if tx.send(Ok(hit)).await.is_err() {
                                        let _ = child.start_kill();
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "skipping malformed ripgrep output line");
                                task_counters.warnings.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(ImpactError::Io(e))).await;
                            let _ = child.start_kill();
                            return;
                        }
                    }
                }
            }

            for hit in assembler.finish() {
                emitted += 1;
                if tx.send(Ok(hit)).await.is_err() {
                    return;
                }
            }

            let stderr_text = stderr_task.await.unwrap_or_default();
            match child.wait().await {
                Ok(status) => match status.code() {
                    Some(0) | Some(1) => {
                        info!(hits = emitted, files = assembler.files_seen(), "ripgrep scan complete");
                    }
                    code => {
                        let reason = format!(
                            "exited with {}: {}",
                            code.map_or("signal".to_string(), |c| c.to_string()),
                            stderr_text
                        );
                        let _ = tx
                            .send(Err(ImpactError::tool_unavailable(binary, reason)))
                            .await;
                    }
                },
                Err(e) => {
                    let _ = tx
                        .send(Err(ImpactError::tool_unavailable(binary, e.to_string())))
                        .await;
                }
            }
        });

        Ok(HitStream::new(rx, counters))
    }

    /// Synchronous variant for callers without a runtime.
    pub fn search_blocking(&self, keywords: &[String]) -> ImpactResult<BlockingHits> {
        if keywords.is_empty() {
            return Ok(BlockingHits::empty(self.options.binary.clone()));
        }

        let mut child = std::process::Command::new(&self.options.binary)
            .args(self.build_args(keywords))
            .current_dir(&self.options.target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.unavailable("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .map(|stderr| std::thread::spawn(move || drain_stderr(stderr)));

        Ok(BlockingHits {
            binary: self.options.binary.clone(),
            child: Some(child),
            stderr,
            lines: Some(Box::new(BufReader::new(stdout).lines())),
            assembler: HitAssembler::new(self.options.context_lines as usize),
            queue: VecDeque::new(),
            warnings: 0,
            done: false,
        })
    }
}

/// Iterator over hits backed by a synchronously read `rg` process. Dropping
/// it kills the process.
pub struct BlockingHits {
    binary: String,
    child: Option<std::process::Child>,
    stderr: Option<JoinHandle<String>>,
    lines: Option<Box<dyn Iterator<Item = std::io::Result<String>> + Send>>,
    assembler: HitAssembler,
    queue: VecDeque<CandidateHit>,
    warnings: usize,
    done: bool,
}

impl BlockingHits {
    fn empty(binary: String) -> Self {
        Self {
            binary,
            child: None,
            stderr: None,
            lines: None,
            assembler: HitAssembler::new(0),
            queue: VecDeque::new(),
            warnings: 0,
            done: true,
        }
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    fn finish(&mut self) -> Option<ImpactResult<CandidateHit>> {
        self.done = true;
        self.lines = None;
        self.queue.extend(self.assembler.finish());

        let mut child = self.child.take()?;
        let stderr_text = self
            .stderr
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let failure = match child.wait() {
            Ok(status) => match status.code() {
                Some(0) | Some(1) => None,
                code => Some(format!(
                    "exited with {}: {}",
                    code.map_or("signal".to_string(), |c| c.to_string()),
                    stderr_text
                )),
            },
            Err(e) => Some(e.to_string()),
        };

        match failure {
            Some(reason) => {
                // Remaining hits are discarded; the run is aborted anyway.
                self.queue.clear();
                Some(Err(ImpactError::tool_unavailable(&self.binary, reason)))
            }
            None => self.queue.pop_front().map(Ok),
        }
    }
}

impl Iterator for BlockingHits {
    type Item = ImpactResult<CandidateHit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(hit) = self.queue.pop_front() {
                return Some(Ok(hit));
            }
            if self.done {
                return None;
            }
            let next_line = self.lines.as_mut().and_then(|lines| lines.next());
            match next_line {
                Some(Ok(line)) => match self.assembler.feed(&line) {
                    Ok(hits) => self.queue.extend(hits),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed ripgrep output line");
                        self.warnings += 1;
                    }
                },
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ImpactError::Io(e)));
                }
                None => return self.finish(),
            }
        }
    }
}

impl Drop for BlockingHits {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options() -> ScanOptions {
        ScanOptions {
            binary: "rg".into(),
            target_dir: ".".into(),
            context_lines: 3,
            fixed_strings: true,
            smart_case: true,
            threads: 0,
            include_hidden: false,
            include_globs: vec!["**/*.rs".into()],
            exclude_globs: vec!["**/target/**".into()],
        }
    }

    #[test]
    fn test_build_args() {
        let scanner = RipgrepScanner::new(options());
        let args = scanner.build_args(&["cache".into(), "ttl".into()]);
        assert_eq!(
            args,
            vec![
                "--json",
                "--context",
                "3",
                "--fixed-strings",
                "--smart-case",
                "--glob",
                "**/*.rs",
                "--glob",
                "!**/target/**",
                "--regexp",
                "cache",
                "--regexp",
                "ttl",
            ]
        );
    }

    #[test]
    fn test_build_args_optional_flags() {
        let mut opts = options();
        opts.smart_case = false;
        opts.fixed_strings = false;
        opts.threads = 4;
        opts.include_hidden = true;
        opts.include_globs.clear();
        opts.exclude_globs.clear();
        let args = RipgrepScanner::new(opts).build_args(&["x".into()]);
        assert_eq!(
            args,
            vec!["--json", "--context", "3", "--case-sensitive", "--threads", "4", "--hidden", "--regexp", "x"]
        );
    }

    #[rstest]
    #[case::smart(true, "--smart-case")]
    #[case::exact(false, "--case-sensitive")]
    fn test_case_mode_flag(#[case] smart_case: bool, #[case] flag: &str) {
        let mut opts = options();
        opts.smart_case = smart_case;
        let args = RipgrepScanner::new(opts).build_args(&["x".into()]);
        assert!(args.iter().any(|a| a == flag));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_unavailable() {
        let mut opts = options();
        opts.binary = "definitely-not-ripgrep-binary".into();
        let err = RipgrepScanner::new(opts)
            .search(&["cache".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, ImpactError::ToolUnavailable { .. }));
    }
}
