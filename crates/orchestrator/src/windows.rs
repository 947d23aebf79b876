use common::{ImpactError, ImpactResult};
use domain::{CandidateFileWindow, CandidateHit};
use preprocess::FilePreprocessor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of classifying and windowing every scanned file.
#[derive(Debug, Default)]
pub struct WindowSet {
    /// Sorted by path.
    pub windows: Vec<CandidateFileWindow>,
    pub dropped_hits: usize,
    /// Files that could not be read back after the scan.
    pub unreadable: usize,
}

/// Reads each file and builds its window on the blocking pool, with at most
/// `workers` files in flight.
pub async fn build_windows(
    root: &Path,
    grouped: BTreeMap<PathBuf, Vec<CandidateHit>>,
    preprocessor: Arc<FilePreprocessor>,
    workers: usize,
    cancel: &CancellationToken,
) -> ImpactResult<WindowSet> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for (file, hits) in grouped {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
            permit = Arc::clone(&semaphore).acquire_owned() => {
                permit.map_err(|e| ImpactError::Internal(e.to_string()))?
            }
        };
        let path = root.join(&file);
        let preprocessor = Arc::clone(&preprocessor);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = std::fs::read(&path).map(|bytes| preprocessor.process(&file, bytes, hits));
            (file, outcome)
        });
    }

    let mut set = WindowSet::default();
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
            joined = tasks.join_next() => joined,
        };
        let Some(joined) = joined else { break };
        let (file, outcome) = joined.map_err(|e| ImpactError::Internal(e.to_string()))?;
        match outcome {
            Ok(outcome) => {
                set.dropped_hits += outcome.dropped_total();
                match outcome.window {
                    Some(window) => set.windows.push(window),
                    None => debug!(file = %file.display(), dropped = outcome.dropped_total(), "no kept hits"),
                }
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "could not read scanned file");
                set.unreadable += 1;
            }
        }
    }

    set.windows.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(set)
}
