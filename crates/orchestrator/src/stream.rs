use common::{ImpactError, ImpactResult};
use domain::{ImpactAssessment, ImpactRunSummary};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Assessments of a run in progress, in completion order. Dropping the
/// stream before [`finish`](Self::finish) cancels the run.
pub struct AssessmentStream {
    rx: mpsc::Receiver<ImpactAssessment>,
    task: Option<JoinHandle<ImpactResult<ImpactRunSummary>>>,
    cancel: CancellationToken,
}

impl AssessmentStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<ImpactAssessment>,
        task: JoinHandle<ImpactResult<ImpactRunSummary>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
            cancel,
        }
    }

    /// Next assessment; `None` once analysis is done or the run ended.
    pub async fn next(&mut self) -> Option<ImpactAssessment> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run and returns its summary. Assessments not yet
    /// received are still part of the summary.
    pub async fn finish(mut self) -> ImpactResult<ImpactRunSummary> {
        self.rx.close();
        let task = self
            .task
            .take()
            .ok_or_else(|| ImpactError::Internal("run already finished".to_string()))?;
        let guard = self.cancel.clone().drop_guard();
        let joined = task.await;
        guard.disarm();
        joined.map_err(|e| ImpactError::Internal(format!("run task failed: {e}")))?
    }
}

impl Stream for AssessmentStream {
    type Item = ImpactAssessment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for AssessmentStream {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

/// [`AssessmentStream`] driven from synchronous code on its own runtime.
pub struct BlockingAssessmentStream {
    // Dropped before the runtime so the run is cancelled first.
    inner: AssessmentStream,
    runtime: tokio::runtime::Runtime,
}

impl BlockingAssessmentStream {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, inner: AssessmentStream) -> Self {
        Self { inner, runtime }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn finish(self) -> ImpactResult<ImpactRunSummary> {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.finish())
    }
}

impl Iterator for BlockingAssessmentStream {
    type Item = ImpactAssessment;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next())
    }
}
