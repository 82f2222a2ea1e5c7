//! Retry policy for connect failures.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Strategy for retrying requests whose connection could not be
/// established.
///
/// Only connect-phase failures are retried: once a request may have reached
/// the server, retrying could repeat a side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Whether to use exponential backoff.
    pub exponential_backoff: bool,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl RetryStrategy {
    /// Creates a new retry strategy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(250),
            exponential_backoff: true,
            max_delay: Duration::from_secs(5),
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            exponential_backoff: false,
            max_delay: Duration::ZERO,
        }
    }

    /// The policy behind `retry_on_connect_failure`: one silent retry when
    /// enabled, none otherwise.
    pub fn for_connect_failures(enabled: bool) -> Self {
        if enabled {
            Self::new(2)
        } else {
            Self::no_retry()
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Calculates the delay after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }

    /// Returns true if another attempt is allowed after `attempt` failures.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Determines if a request error should be retried.
    pub fn should_retry(&self, error: &reqwest::Error) -> bool {
        error.is_connect()
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, reqwest::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, reqwest::Error>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(attempt = attempts, "Sending request");
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if self.has_attempts_left(attempts) && self.should_retry(&e) => {
                    let delay = self.delay_for_attempt(attempts);
                    warn!(
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::no_retry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_exponential_backoff() {
        let strategy = RetryStrategy::new(5);

        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(strategy.delay_for_attempt(3), Duration::from_secs(1));
    }

    #[test]
    fn test_max_delay_cap() {
        let strategy = RetryStrategy::new(10).with_base_delay(Duration::from_secs(2));
        assert_eq!(strategy.delay_for_attempt(6), Duration::from_secs(5));
    }

    /// A loopback URL whose port was just released, so connecting is refused.
    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/")
    }

    async fn count_attempts(strategy: &RetryStrategy) -> (usize, reqwest::Error) {
        let client = reqwest::Client::new();
        let url = refused_url();
        let attempts = AtomicUsize::new(0);
        let err = strategy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                client.get(&url).send()
            })
            .await
            .unwrap_err();
        (attempts.load(Ordering::SeqCst), err)
    }

    #[tokio::test]
    async fn test_connect_failure_retried_once_when_enabled() {
        let strategy =
            RetryStrategy::for_connect_failures(true).with_base_delay(Duration::from_millis(10));
        let (attempts, err) = count_attempts(&strategy).await;
        assert!(err.is_connect());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_not_retried_when_disabled() {
        let (attempts, err) = count_attempts(&RetryStrategy::for_connect_failures(false)).await;
        assert!(err.is_connect());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_response_is_not_retried() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let strategy =
            RetryStrategy::for_connect_failures(true).with_base_delay(Duration::from_millis(10));
        let response = strategy.run(|| client.get(server.uri()).send()).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_connect_failure_policy_retries_once() {
        let strategy = RetryStrategy::for_connect_failures(true);
        assert!(strategy.has_attempts_left(1));
        assert!(!strategy.has_attempts_left(2));
        assert!(!RetryStrategy::for_connect_failures(false).has_attempts_left(1));
    }
}
