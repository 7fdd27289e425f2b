//! Deadline and retry plumbing shared by all provider adapters.
//!
//! Every backend call runs under a hard deadline; the whole attempt sequence
//! (initial call plus retries) shares that budget. HTTP 5xx and 429 are
//! retried with exponential backoff; everything else fails immediately.

use std::future::Future;
use std::time::Duration;

use super::error::ProviderError;

/// Retries after the initial attempt.
pub(crate) const MAX_RETRIES: u32 = 2;

/// Cap on the error body carried into messages.
const MAX_ERROR_BODY: usize = 500;

/// Backoff before retry `n` (0-based): 1s, 2s.
pub(crate) fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(1u64 << retry.min(4))
}

/// HTTP 5xx and 429 are transient; anything else is not worth retrying.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Run `op` (one HTTP attempt per call) with retry/backoff, all under
/// `deadline`. On deadline expiry the in-flight request future is dropped,
/// which aborts the underlying connection.
pub(crate) async fn call_with_deadline<F, Fut>(
    provider: &'static str,
    deadline: Duration,
    op: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    match tokio::time::timeout(deadline, send_with_retry(provider, op)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider,
            secs: deadline.as_secs(),
        }),
    }
}

async fn send_with_retry<F, Fut>(
    provider: &'static str,
    mut op: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let code = status.as_u16();
                let mut message = response.text().await.unwrap_or_default();
                message.truncate(MAX_ERROR_BODY);
                let err = ProviderError::Http {
                    provider,
                    status: code,
                    message,
                };
                if is_retryable_status(code) && attempt < MAX_RETRIES {
                    tracing::debug!(provider, status = code, attempt, "retrying after backoff");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                if retryable && attempt < MAX_RETRIES {
                    tracing::debug!(provider, error = %e, attempt, "retrying after backoff");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(ProviderError::Network {
                    provider,
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn fake_response(status: u16, body: &'static str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .map(reqwest::Body::from)
            .into()
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn backoff_is_exponential_from_one_second() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn two_503s_then_200_succeeds_after_backoff() {
        let statuses = RefCell::new(vec![503u16, 503, 200]);
        let calls = RefCell::new(0u32);
        let started = tokio::time::Instant::now();

        let result = call_with_deadline("test", Duration::from_secs(120), || {
            *calls.borrow_mut() += 1;
            let status = statuses.borrow_mut().remove(0);
            async move { Ok(fake_response(status, "busy")) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(*calls.borrow(), 3);
        // 1s after the first failure, 2s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_returns_last_http_error() {
        let calls = RefCell::new(0u32);
        let result = call_with_deadline("test", Duration::from_secs(120), || {
            *calls.borrow_mut() += 1;
            async { Ok(fake_response(503, "still busy")) }
        })
        .await;

        assert_eq!(*calls.borrow(), 3);
        match result {
            Err(ProviderError::Http { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected Http error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_fails_immediately() {
        let calls = RefCell::new(0u32);
        let result = call_with_deadline("test", Duration::from_secs(120), || {
            *calls.borrow_mut() += 1;
            async { Ok(fake_response(401, "bad key")) }
        })
        .await;

        assert_eq!(*calls.borrow(), 1);
        match result {
            Err(ProviderError::Http { status, message, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("expected Http error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_maps_to_timeout() {
        let result = call_with_deadline("test", Duration::from_secs(5), || async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(fake_response(200, "too late"))
        })
        .await;

        match result {
            Err(ProviderError::Timeout { provider, secs }) => {
                assert_eq!(provider, "test");
                assert_eq!(secs, 5);
            }
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
    }
}
