//! Connectivity probes.
//!
//! The cache stage needs to know, right before a call, whether the network
//! is reachable. [`ReachabilityProbe`] answers by opening a TCP connection
//! to the endpoint; [`StaticProbe`] answers with a fixed (switchable) value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Answers "is the network reachable for this endpoint?".
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if `base_url` looks reachable.
    async fn is_connected(&self, base_url: &Url) -> bool;
}

/// Result of a reachability check.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Whether the endpoint accepted a connection.
    pub success: bool,
    /// Time spent, in milliseconds.
    pub response_time_ms: u64,
    /// Optional error message.
    pub error: Option<String>,
}

// ============================================================================
// ReachabilityProbe
// ============================================================================

/// Probes by opening (and immediately closing) a TCP connection to the
/// endpoint's host and port.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    /// Connect timeout.
    pub timeout: Duration,
}

impl Default for ReachabilityProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
        }
    }
}

impl ReachabilityProbe {
    /// Creates a probe with the default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout for this probe.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes the probe and returns the result.
    pub async fn check(&self, url: &Url) -> ProbeResult {
        let start = Instant::now();
        let elapsed_ms = |start: Instant| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            return ProbeResult {
                success: false,
                response_time_ms: 0,
                error: Some("URL has no host or port".to_string()),
            };
        };

        debug!(host, port, "Running reachability probe");
        let attempt = tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect((host, port))).await;
        let error = match attempt {
            Ok(Ok(_stream)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {:?}", self.timeout)),
        };
        ProbeResult {
            success: error.is_none(),
            response_time_ms: elapsed_ms(start),
            error,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for ReachabilityProbe {
    async fn is_connected(&self, base_url: &Url) -> bool {
        let result = self.check(base_url).await;
        debug!(
            url = %base_url,
            connected = result.success,
            response_time_ms = result.response_time_ms,
            error = ?result.error,
            "Reachability probed"
        );
        result.success
    }
}

// ============================================================================
// StaticProbe
// ============================================================================

/// A probe with a fixed answer that can be flipped at runtime.
#[derive(Debug)]
pub struct StaticProbe {
    connected: AtomicBool,
}

impl StaticProbe {
    /// Always reports connected (until changed).
    pub fn online() -> Self {
        Self {
            connected: AtomicBool::new(true),
        }
    }

    /// Always reports disconnected (until changed).
    pub fn offline() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    /// Changes the reported connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_connected(&self, _base_url: &Url) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reachability_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url: Url = format!("http://127.0.0.1:{port}/").parse().unwrap();

        let probe = ReachabilityProbe::new().with_timeout(Duration::from_secs(2));
        assert!(probe.is_connected(&url).await);

        drop(listener);
        let result = probe.check(&url).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_static_probe_can_flip() {
        let url: Url = "https://api.example.com/".parse().unwrap();
        let probe = StaticProbe::online();
        assert!(probe.is_connected(&url).await);
        probe.set_connected(false);
        assert!(!probe.is_connected(&url).await);
    }
}
