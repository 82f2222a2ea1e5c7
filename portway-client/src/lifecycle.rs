//! Lifecycle scopes.
//!
//! A [`LifecycleScope`] is the cancellation boundary for in-flight
//! requests. Every request dispatched under a scope gets a child token, so
//! terminating the scope cancels all of them at once. Termination happens
//! at most once.
//!
//! The host (a window, a screen, a session) implements [`Lifecycle`] and
//! the dispatcher binds a scope to it with
//! [`Dispatcher::bind_scope`](crate::Dispatcher::bind_scope).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ============================================================================
// LifecycleScope
// ============================================================================

#[derive(Debug, Default)]
struct ScopeInner {
    token: CancellationToken,
    terminated: AtomicBool,
}

/// Cancellation boundary shared by every request dispatched under it.
///
/// Cloning is cheap; clones share the same termination state.
#[derive(Debug, Clone, Default)]
pub struct LifecycleScope {
    inner: Arc<ScopeInner>,
}

impl LifecycleScope {
    /// Creates a live scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminates the scope, cancelling every request bound to it.
    ///
    /// Returns true for the call that actually terminated it.
    pub fn terminate(&self) -> bool {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!("Lifecycle scope terminated");
        self.inner.token.cancel();
        true
    }

    /// Returns true once the scope has been terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Returns a token cancelled when the scope terminates.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Waits until the scope is terminated.
    pub async fn terminated(&self) {
        self.inner.token.cancelled().await;
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// A host that signals exactly one termination.
pub trait Lifecycle: Send + Sync {
    /// Returns a future that resolves when the host is torn down.
    fn on_terminate(&self) -> BoxFuture<'static, ()>;
}

/// A lifecycle ended by an explicit call.
#[derive(Debug, Clone, Default)]
pub struct ManualLifecycle {
    token: CancellationToken,
}

impl ManualLifecycle {
    /// Creates a running lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends the lifecycle. Later calls do nothing.
    pub fn end(&self) {
        self.token.cancel();
    }

    /// Returns true once [`end`](Self::end) has been called.
    pub fn has_ended(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Lifecycle for ManualLifecycle {
    fn on_terminate(&self) -> BoxFuture<'static, ()> {
        let token = self.token.clone();
        Box::pin(async move { token.cancelled().await })
    }
}
