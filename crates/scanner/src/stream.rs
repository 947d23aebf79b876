use common::ImpactResult;
use domain::CandidateHit;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Shared counters updated by the scan task.
#[derive(Debug, Default)]
pub(crate) struct ScanCounters {
    pub warnings: AtomicUsize,
    pub files: AtomicUsize,
}

/// Async stream of hits. Dropping it stops the scan and kills `rg`.
#[derive(Debug)]
pub struct HitStream {
    rx: mpsc::Receiver<ImpactResult<CandidateHit>>,
    counters: Arc<ScanCounters>,
}

impl HitStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<ImpactResult<CandidateHit>>,
        counters: Arc<ScanCounters>,
    ) -> Self {
        Self { rx, counters }
    }

    /// Stream over a fixed set of hits.
    pub fn from_hits(hits: Vec<CandidateHit>) -> Self {
        Self::from_results(hits.into_iter().map(Ok).collect())
    }

    pub fn from_results(items: Vec<ImpactResult<CandidateHit>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        let counters = Arc::new(ScanCounters::default());
        let mut files = std::collections::HashSet::new();
        for item in items {
            if let Ok(hit) = &item {
                files.insert(hit.file.clone());
            }
            // Capacity equals the item count.
            let _ = tx.try_send(item);
        }
        counters.files.store(files.len(), Ordering::Relaxed);
        Self { rx, counters }
    }

    pub fn empty() -> Self {
        Self::from_hits(Vec::new())
    }

    /// Malformed output lines skipped so far.
    pub fn warnings(&self) -> usize {
        self.counters.warnings.load(Ordering::Relaxed)
    }

    /// Files with at least one match seen so far.
    pub fn files_with_matches(&self) -> usize {
        self.counters.files.load(Ordering::Relaxed)
    }

    /// Receives the next hit; `None` once the scan is complete.
    pub async fn next_hit(&mut self) -> Option<ImpactResult<CandidateHit>> {
        self.rx.recv().await
    }
}

impl Stream for HitStream {
    type Item = ImpactResult<CandidateHit>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
