//! Rolling-window request and token limiter shared by all LLM calls of a run.
//!
//! Admission is first-come-first-served: waiters queue on an async mutex and
//! only the head of the queue inspects the window. The inspect-and-record step
//! itself runs under a short synchronous lock. Non-blocking callers skip the
//! queue and are only turned away when the window is full or a blocking
//! caller is already parked on it.

use common::{ImpactError, ImpactResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimits {
    pub rpm: Option<u32>,
    pub tpm: Option<u64>,
}

impl RateLimits {
    pub fn new(rpm: Option<u32>, tpm: Option<u64>) -> Self {
        Self { rpm, tpm }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct Entry {
    id: u64,
    at: Instant,
    tokens: u64,
}

#[derive(Debug, Default)]
struct WindowState {
    next_id: u64,
    entries: VecDeque<Entry>,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.entries.front() {
            if front.at + window <= now {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn tokens(&self) -> u64 {
        self.entries.iter().map(|e| e.tokens).sum()
    }

    /// Time until a request of `tokens` fits, or `None` if it fits now.
    fn wait_for(&self, limits: RateLimits, tokens: u64, window: Duration) -> Option<Instant> {
        let mut ready_at: Option<Instant> = None;

        if let Some(rpm) = limits.rpm {
            let rpm = rpm as usize;
            if self.entries.len() >= rpm {
                // The oldest `len - rpm + 1` entries must age out.
                let idx = self.entries.len() - rpm;
                ready_at = Some(self.entries[idx].at + window);
            }
        }

        if let Some(tpm) = limits.tpm {
            let used = self.tokens();
            if used + tokens > tpm {
                let mut freed = 0u64;
                for entry in &self.entries {
                    freed += entry.tokens;
                    if used - freed + tokens <= tpm {
                        let at = entry.at + window;
                        ready_at = Some(ready_at.map_or(at, |r| r.max(at)));
                        break;
                    }
                }
            }
        }

        ready_at
    }

    fn record(&mut self, now: Instant, tokens: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Entry { id, at: now, tokens });
        id
    }
}

#[derive(Debug)]
struct Shared {
    limits: RateLimits,
    window: Duration,
    queue: tokio::sync::Mutex<()>,
    state: Mutex<WindowState>,
    /// Blocking callers sleeping until the window frees up.
    parked: AtomicUsize,
}

/// Counts a sleeping waiter for as long as it lives, including when the
/// waiting future is dropped.
struct Parked<'a>(&'a AtomicUsize);

impl<'a> Parked<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cloneable handle; clones share one window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self::with_window(limits, WINDOW)
    }

    pub fn unlimited() -> Self {
        Self::new(RateLimits::unlimited())
    }

    pub fn with_window(limits: RateLimits, window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                window,
                queue: tokio::sync::Mutex::new(()),
                state: Mutex::new(WindowState::default()),
                parked: AtomicUsize::new(0),
            }),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.shared.limits
    }

    fn clamp(&self, tokens: u64) -> u64 {
        match self.shared.limits.tpm {
            Some(tpm) => tokens.min(tpm),
            None => tokens,
        }
    }

    /// Waits until both budgets have headroom for `tokens`, then records the
    /// admission.
    pub async fn acquire(&self, tokens: u64) -> Reservation {
        let tokens = self.clamp(tokens);
        let _turn = self.shared.queue.lock().await;

        loop {
            let (ready_at, _parked) = {
                let mut state = self.shared.state.lock();
                let now = Instant::now();
                state.prune(now, self.shared.window);
                match state.wait_for(self.shared.limits, tokens, self.shared.window) {
                    None => {
                        let id = state.record(now, tokens);
                        return self.reservation(id, tokens);
                    }
                    Some(at) => (at, Parked::new(&self.shared.parked)),
                }
            };
            debug!(tokens, "rate limit reached, waiting for window");
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Admits immediately or fails with `RateLimitExceeded`.
    ///
    /// Does not wait for the admission queue; the window check and record are
    /// atomic under the state lock.
    pub fn try_acquire(&self, tokens: u64) -> ImpactResult<Reservation> {
        let tokens = self.clamp(tokens);
        let mut state = self.shared.state.lock();
        if self.shared.parked.load(Ordering::SeqCst) > 0 {
            return Err(self.exceeded("blocking callers are waiting"));
        }
        let now = Instant::now();
        state.prune(now, self.shared.window);
        if state
            .wait_for(self.shared.limits, tokens, self.shared.window)
            .is_some()
        {
            return Err(self.exceeded("window is full"));
        }
        let id = state.record(now, tokens);
        drop(state);
        Ok(self.reservation(id, tokens))
    }

    fn exceeded(&self, reason: &str) -> ImpactError {
        let limits = self.shared.limits;
        ImpactError::RateLimitExceeded {
            limit: format!(
                "rpm={} tpm={} ({reason})",
                limits.rpm.map_or("unlimited".to_string(), |v| v.to_string()),
                limits.tpm.map_or("unlimited".to_string(), |v| v.to_string()),
            ),
        }
    }

    fn reservation(&self, id: u64, tokens: u64) -> Reservation {
        Reservation {
            shared: Arc::clone(&self.shared),
            id,
            tokens,
            committed: false,
        }
    }

    /// Requests admitted in the current window.
    pub fn requests_in_window(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.prune(Instant::now(), self.shared.window);
        state.entries.len()
    }

    /// Tokens recorded in the current window.
    pub fn tokens_in_window(&self) -> u64 {
        let mut state = self.shared.state.lock();
        state.prune(Instant::now(), self.shared.window);
        state.tokens()
    }
}

/// An admitted request. Dropping it without [`Reservation::commit`] returns
/// its budget to the window.
#[derive(Debug)]
#[must_use = "dropping a reservation releases its budget"]
pub struct Reservation {
    shared: Arc<Shared>,
    id: u64,
    tokens: u64,
    committed: bool,
}

impl Reservation {
    pub fn estimated_tokens(&self) -> u64 {
        self.tokens
    }

    /// Keeps the admission and replaces the estimate with actual usage.
    pub fn commit(mut self, actual_tokens: u64) {
        let mut state = self.shared.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == self.id) {
            entry.tokens = actual_tokens;
        }
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.shared.state.lock();
        if let Some(pos) = state.entries.iter().position(|e| e.id == self.id) {
            state.entries.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rpm_blocks_until_window_rolls() {
        let limiter = RateLimiter::new(RateLimits::new(Some(2), None));
        limiter.acquire(1).await.commit(1);
        limiter.acquire(1).await.commit(1);

        let start = Instant::now();
        limiter.acquire(1).await.commit(1);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(limiter.requests_in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_rejects_excess() {
        let limiter = RateLimiter::new(RateLimits::new(Some(1), None));
        limiter.try_acquire(10).unwrap().commit(10);
        let err = limiter.try_acquire(10).unwrap_err();
        assert!(matches!(err, ImpactError::RateLimitExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_admits_while_queue_is_held() {
        let limiter = RateLimiter::new(RateLimits::new(Some(10), None));
        let _turn = limiter.shared.queue.lock().await;
        limiter.try_acquire(1).unwrap().commit(1);
        limiter.try_acquire(1).unwrap().commit(1);
        assert_eq!(limiter.requests_in_window(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_yields_to_parked_waiter() {
        let limiter = RateLimiter::new(RateLimits::new(Some(10), Some(100)));
        limiter.acquire(90).await.commit(90);

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(50).await.commit(50) })
        };
        tokio::task::yield_now().await;
        let err = limiter.try_acquire(5).unwrap_err();
        assert!(matches!(err, ImpactError::RateLimitExceeded { .. }));

        tokio::time::advance(Duration::from_secs(61)).await;
        waiter.await.unwrap();
        assert_eq!(limiter.requests_in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_are_clamped_to_budget() {
        let limiter = RateLimiter::new(RateLimits::new(None, Some(100)));
        let reservation = limiter.acquire(5_000).await;
        assert_eq!(reservation.estimated_tokens(), 100);
        reservation.commit(40);
        assert_eq!(limiter.tokens_in_window(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_reservation_releases_budget() {
        let limiter = RateLimiter::new(RateLimits::new(Some(1), Some(100)));
        let reservation = limiter.acquire(50).await;
        assert_eq!(limiter.requests_in_window(), 1);
        drop(reservation);
        assert_eq!(limiter.requests_in_window(), 0);
        assert!(limiter.try_acquire(100).is_ok());
    }
}
