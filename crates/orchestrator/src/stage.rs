//! Shared per-call discipline for the model-backed steps: limiter admission,
//! per-call timeout, reply validation and retry with backoff.

use common::{ImpactError, ImpactResult, LlmError, LlmResult};
use domain::config::ImpactScanConfig;
use domain::TokenUsage;
use futures::stream::{self, StreamExt};
use llm::{ChatRequest, ChatResponse, LlmClient, RateLimiter, RetryConfig, RetryableError};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a single model call gave up.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Non-blocking limiter rejection; never retried.
    #[error(transparent)]
    Limited(ImpactError),
}

impl RetryableError for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Llm(e) => e.is_retryable(),
            CallError::Limited(_) => false,
        }
    }

    fn error_type(&self) -> String {
        match self {
            CallError::Llm(e) => e.kind().to_string(),
            CallError::Limited(_) => "rate_limited".to_string(),
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }
}

/// Limits and retry policy shared by every call of a run.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub limiter: RateLimiter,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub blocking: bool,
}

impl CallPolicy {
    pub fn from_config(config: &ImpactScanConfig, limiter: RateLimiter) -> Self {
        Self {
            limiter,
            retry: RetryConfig::default().with_max_retries(config.analysis.max_retries),
            timeout: config.analysis.request_timeout(),
            blocking: config.analysis.rate_limit_blocking,
        }
    }
}

/// A validated reply plus the tokens spent on every attempt.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub value: T,
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// Sends `request` until `parse` accepts a reply or the retry budget runs
/// out. Usage of rejected replies still counts.
pub async fn call_with_retry<T, P>(
    policy: &CallPolicy,
    client: &dyn LlmClient,
    request: &ChatRequest,
    parse: P,
) -> Result<Reply<T>, CallError>
where
    P: Fn(&ChatResponse) -> LlmResult<T>,
{
    let usage = &Mutex::new(TokenUsage::default());
    let attempts = &Mutex::new(0u32);
    let parse = &parse;
    let estimate = request.estimated_tokens();

    let value = llm::execute_with_retry(&policy.retry, move || async move {
        *attempts.lock() += 1;
        let reservation = if policy.blocking {
            policy.limiter.acquire(estimate).await
        } else {
            match policy.limiter.try_acquire(estimate) {
                Ok(reservation) => reservation,
                Err(e) => return Err(CallError::Limited(e)),
            }
        };

        let response = match tokio::time::timeout(policy.timeout, client.chat(request.clone())).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                reservation.commit(0);
                return Err(CallError::Llm(e));
            }
            Err(_) => {
                reservation.commit(0);
                return Err(CallError::Llm(LlmError::Timeout {
                    provider: client.name().to_string(),
                    after: policy.timeout,
                }));
            }
        };

        let actual = match response.usage.total_tokens {
            0 => estimate,
            n => n,
        };
        reservation.commit(actual);
        *usage.lock() += response.usage;

        parse(&response).map_err(CallError::Llm)
    })
    .await?;

    let attempts = *attempts.lock();
    let usage = *usage.lock();
    debug!(provider = client.name(), attempts, tokens = usage.total_tokens, "model call accepted");
    Ok(Reply {
        value,
        usage,
        attempts,
    })
}

/// Runs `work` over `items` with at most `parallelism` in flight, handing
/// each result to `on_result` as it completes. Cancellation drops every
/// outstanding item.
pub async fn run_bounded<I, O, W, Fut, C, CFut>(
    items: Vec<I>,
    parallelism: usize,
    cancel: &CancellationToken,
    work: W,
    mut on_result: C,
) -> ImpactResult<()>
where
    W: Fn(I) -> Fut,
    Fut: Future<Output = O>,
    C: FnMut(O) -> CFut,
    CFut: Future<Output = ()>,
{
    let pending: Vec<Fut> = items.into_iter().map(work).collect();
    let results = stream::iter(pending).buffer_unordered(parallelism.max(1));
    tokio::pin!(results);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
            next = results.next() => match next {
                Some(output) => on_result(output).await,
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{CallableProvider, ChatMessage, RateLimits};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(limiter: RateLimiter, blocking: bool) -> CallPolicy {
        CallPolicy {
            limiter,
            retry: RetryConfig::immediate(2),
            timeout: Duration::from_secs(5),
            blocking,
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("score this")]).with_max_tokens(16)
    }

    fn parse_score(response: &ChatResponse) -> LlmResult<f64> {
        response
            .json_payload()
            .and_then(|v| v.get("score").and_then(|s| s.as_f64()))
            .ok_or_else(|| LlmError::format("missing score"))
    }

    #[tokio::test]
    async fn test_malformed_reply_is_retried_and_usage_accumulates() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let client = CallableProvider::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let body = if n == 0 { "not json" } else { r#"{"score": 0.5}"# };
            Ok(ChatResponse::from_text(body).with_usage(TokenUsage::new(10, 2)))
        });
        let reply = call_with_retry(&policy(RateLimiter::unlimited(), true), &client, &request(), parse_score)
            .await
            .unwrap();
        assert_eq!(reply.value, 0.5);
        assert_eq!(reply.attempts, 2);
        assert_eq!(reply.usage.total_tokens, 24);
    }

    #[tokio::test]
    async fn test_non_retryable_http_error_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let client = CallableProvider::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Http {
                provider: "stub".to_string(),
                status: 400,
                body: "bad request".to_string(),
            })
        });
        let err = call_with_retry(&policy(RateLimiter::unlimited(), true), &client, &request(), parse_score)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Llm(LlmError::Http { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_blocking_limiter_rejection_is_not_retried() {
        let limiter = RateLimiter::new(RateLimits::new(Some(1), None));
        let held = limiter.try_acquire(1).unwrap();
        let client = CallableProvider::new(|_| Ok(ChatResponse::from_text(r#"{"score": 1}"#)));
        let err = call_with_retry(&policy(limiter, false), &client, &request(), parse_score)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Limited(ImpactError::RateLimitExceeded { .. })));
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_and_releases_token_budget() {
        let limiter = RateLimiter::new(RateLimits::new(None, Some(10_000)));
        let client = CallableProvider::from_async(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ChatResponse::from_text(r#"{"score": 1}"#))
        });
        let policy = CallPolicy {
            timeout: Duration::from_millis(100),
            retry: RetryConfig::immediate(0),
            ..policy(limiter.clone(), true)
        };
        let err = call_with_retry(&policy, &client, &request(), parse_score)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Llm(LlmError::Timeout { .. })));
        assert_eq!(limiter.requests_in_window(), 1);
        assert_eq!(limiter.tokens_in_window(), 0);
    }

    #[tokio::test]
    async fn test_run_bounded_respects_parallelism() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let mut seen = Vec::new();
        run_bounded(
            (0..12).collect(),
            3,
            &CancellationToken::new(),
            |i: u32| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            },
            |i| {
                seen.push(i);
                async {}
            },
        )
        .await
        .unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_run_bounded_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_bounded(
            vec![1, 2, 3],
            2,
            &cancel,
            |i: u32| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                i
            },
            |_| async {},
        )
        .await;
        assert!(matches!(result, Err(ImpactError::Cancelled)));
    }
}
