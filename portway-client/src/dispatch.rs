//! Request dispatch with lifecycle-scoped cancellation.
//!
//! Work runs on the async runtime, never on the caller's thread. Results
//! are delivered on one dedicated callback thread, in submission order of
//! their completion. Each request moves through:
//!
//! ```text
//! Created -> Dispatched -> Succeeded | Failed -> Completed
//! ```
//!
//! `Completed` is reached exactly once, whatever the outcome. When the
//! bound [`LifecycleScope`] terminates first, the work is dropped and
//! neither success nor failure is delivered; only the completion hook runs.

use std::future::Future;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portway_core::{ApiResponse, ClassifiedError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::ErrorClassifier;
use crate::error::CallError;
use crate::lifecycle::{Lifecycle, LifecycleScope};

/// Name of the thread every callback runs on.
pub const CALLBACK_THREAD_NAME: &str = "portway-callback";

type Callback = Box<dyn FnOnce() + Send>;

// ============================================================================
// Request State
// ============================================================================

/// Progress of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    /// Accepted, not yet running.
    Created = 0,
    /// Running on the runtime.
    Dispatched = 1,
    /// Work finished with a payload.
    Succeeded = 2,
    /// Work finished with a failure.
    Failed = 3,
    /// Delivery finished.
    Completed = 4,
}

impl RequestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Dispatched,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Completed,
        }
    }
}

#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RequestState::Created as u8)))
    }

    fn get(&self) -> RequestState {
        RequestState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: RequestState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

// ============================================================================
// Handlers and Outcomes
// ============================================================================

/// Receives the result of a request on the callback thread.
pub trait ResponseHandler<T>: Send + 'static {
    /// Called before the work is dispatched. Show progress here.
    fn on_start(&mut self) {}

    /// Called with the unwrapped payload.
    fn on_success(&mut self, data: Option<T>);

    /// Called with the classified failure.
    fn on_failure(&mut self, error: ClassifiedError);

    /// Called exactly once, last. Tear progress down here.
    fn on_complete(&mut self) {}
}

/// How a request ended.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Delivered a payload.
    Success(T),
    /// Delivered a failure.
    Failure(ClassifiedError),
    /// The scope or handle was cancelled first; nothing was delivered.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts into a result; `None` when cancelled.
    pub fn into_result(self) -> Option<Result<T, ClassifiedError>> {
        match self {
            Self::Success(value) => Some(Ok(value)),
            Self::Failure(error) => Some(Err(error)),
            Self::Cancelled => None,
        }
    }
}

/// Handle to one dispatched request.
#[derive(Debug)]
pub struct RequestHandle<T> {
    state: StateCell,
    token: CancellationToken,
    outcome: oneshot::Receiver<Outcome<T>>,
}

impl<T> RequestHandle<T> {
    /// Returns the current state.
    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    /// Cancels this request only.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for delivery to finish.
    pub async fn outcome(self) -> Outcome<T> {
        self.outcome.await.unwrap_or(Outcome::Cancelled)
    }
}

/// What the callback thread does with a settled request.
trait Delivery<T>: Send + 'static {
    type Output: Default + Send + 'static;

    fn start(&mut self) {}
    fn success(&mut self, data: Option<T>) -> Self::Output;
    fn failure(&mut self, error: &ClassifiedError);
    fn complete(&mut self) {}
}

struct HandlerDelivery<H>(H);

impl<T, H: ResponseHandler<T>> Delivery<T> for HandlerDelivery<H> {
    type Output = ();

    fn start(&mut self) {
        self.0.on_start();
    }

    fn success(&mut self, data: Option<T>) {
        self.0.on_success(data);
    }

    fn failure(&mut self, error: &ClassifiedError) {
        self.0.on_failure(error.clone());
    }

    fn complete(&mut self) {
        self.0.on_complete();
    }
}

struct ValueDelivery;

impl<T: Send + 'static> Delivery<T> for ValueDelivery {
    type Output = Option<T>;

    fn success(&mut self, data: Option<T>) -> Option<T> {
        data
    }

    fn failure(&mut self, _error: &ClassifiedError) {}
}

fn lock<D>(mutex: &Mutex<D>) -> MutexGuard<'_, D> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug)]
struct DispatcherInner {
    handle: Handle,
    callbacks: mpsc::UnboundedSender<Callback>,
}

impl DispatcherInner {
    fn post(&self, callback: impl FnOnce() + Send + 'static) {
        if self.callbacks.send(Box::new(callback)).is_err() {
            warn!("Callback thread is gone, dropping callback");
        }
    }
}

/// Runs request work on the runtime and delivers results on the callback
/// thread.
///
/// Cloning is cheap; clones share the callback thread, which exits once
/// every clone and every in-flight request is gone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a dispatcher running work on `handle`.
    pub fn new(handle: Handle) -> io::Result<Self> {
        let (callbacks, mut queue) = mpsc::unbounded_channel::<Callback>();
        std::thread::Builder::new()
            .name(CALLBACK_THREAD_NAME.to_string())
            .spawn(move || {
                while let Some(callback) = queue.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                        warn!("Callback panicked");
                    }
                }
                debug!("Callback thread stopped");
            })?;
        Ok(Self {
            inner: Arc::new(DispatcherInner { handle, callbacks }),
        })
    }

    /// Creates a dispatcher on the current runtime.
    pub fn current() -> io::Result<Self> {
        let handle = Handle::try_current().map_err(io::Error::other)?;
        Self::new(handle)
    }

    /// Runs `callback` on the callback thread.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.post(callback);
    }

    /// Creates a scope terminated when `lifecycle` ends.
    pub fn bind_scope(&self, lifecycle: &dyn Lifecycle) -> LifecycleScope {
        let scope = LifecycleScope::new();
        let watcher = scope.clone();
        let ended = lifecycle.on_terminate();
        self.inner.handle.spawn(async move {
            tokio::select! {
                () = ended => {
                    watcher.terminate();
                }
                () = watcher.terminated() => {}
            }
        });
        scope
    }

    /// Dispatches `work` and reports to `handler`.
    ///
    /// The envelope is unwrapped first: a non-success code becomes a
    /// business failure.
    pub fn submit<T, F, H>(&self, scope: &LifecycleScope, work: F, handler: H) -> RequestHandle<()>
    where
        T: Send + 'static,
        F: Future<Output = Result<ApiResponse<T>, CallError>> + Send + 'static,
        H: ResponseHandler<T>,
    {
        self.spawn_request(scope, work, HandlerDelivery(handler))
    }

    /// Dispatches `work` and returns its unwrapped payload through the handle.
    pub fn enqueue<T, F>(&self, scope: &LifecycleScope, work: F) -> RequestHandle<Option<T>>
    where
        T: Send + 'static,
        F: Future<Output = Result<ApiResponse<T>, CallError>> + Send + 'static,
    {
        self.spawn_request(scope, work, ValueDelivery)
    }

    fn spawn_request<T, F, D>(&self, scope: &LifecycleScope, work: F, delivery: D) -> RequestHandle<D::Output>
    where
        T: Send + 'static,
        F: Future<Output = Result<ApiResponse<T>, CallError>> + Send + 'static,
        D: Delivery<T>,
    {
        let state = StateCell::new();
        let token = scope.child_token();
        let (tx, rx) = oneshot::channel();
        let delivery = Arc::new(Mutex::new(delivery));

        let starting = Arc::clone(&delivery);
        self.inner.post(move || {
            guarded("start", || lock(&starting).start());
        });

        let inner = Arc::clone(&self.inner);
        let task_state = state.clone();
        let task_token = token.clone();
        self.inner.handle.spawn(async move {
            task_state.set(RequestState::Dispatched);
            let settled = tokio::select! {
                biased;
                () = task_token.cancelled() => None,
                result = work => Some(unwrap_envelope(result)),
            };
            match &settled {
                Some(Ok(_)) => task_state.set(RequestState::Succeeded),
                Some(Err(error)) => {
                    debug!(kind = %error.kind(), code = error.code(), "Request failed");
                    task_state.set(RequestState::Failed);
                }
                None => debug!("Request cancelled before completion"),
            }

            inner.post(move || {
                let mut delivery = lock(&delivery);
                // The scope may have ended while this callback was queued.
                let outcome = match settled {
                    _ if task_token.is_cancelled() => Outcome::Cancelled,
                    Some(Ok(data)) => Outcome::Success(
                        guarded("success", || delivery.success(data)).unwrap_or_default(),
                    ),
                    Some(Err(error)) => {
                        guarded("failure", || delivery.failure(&error));
                        Outcome::Failure(error)
                    }
                    None => Outcome::Cancelled,
                };
                // A panicking handler must not skip completion.
                guarded("complete", || delivery.complete());
                task_state.set(RequestState::Completed);
                let _ = tx.send(outcome);
            });
        });

        RequestHandle {
            state,
            token,
            outcome: rx,
        }
    }
}

/// Runs one handler hook, containing a panic to that hook.
fn guarded<R>(hook: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(hook, "Response handler panicked");
            None
        }
    }
}

fn unwrap_envelope<T>(result: Result<ApiResponse<T>, CallError>) -> Result<Option<T>, ClassifiedError> {
    result
        .and_then(|envelope| envelope.into_result().map_err(CallError::from))
        .map_err(ErrorClassifier::classify)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ManualLifecycle;
    use portway_core::ErrorKind;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn push(&self, event: &str) {
            let thread = std::thread::current().name().unwrap_or("?").to_string();
            self.events.lock().unwrap().push(format!("{event}@{thread}"));
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ResponseHandler<u32> for Recorder {
        fn on_start(&mut self) {
            self.push("start");
        }

        fn on_success(&mut self, data: Option<u32>) {
            self.push(&format!("success:{}", data.unwrap_or_default()));
        }

        fn on_failure(&mut self, error: ClassifiedError) {
            self.push(&format!("failure:{}", error.code()));
        }

        fn on_complete(&mut self) {
            self.push("complete");
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_success_is_delivered_on_callback_thread() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let recorder = Recorder::default();

        let handle = dispatcher.submit(
            &scope,
            async { Ok::<_, CallError>(ApiResponse::success(7_u32)) },
            recorder.clone(),
        );
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(
            recorder.events(),
            vec![
                "start@portway-callback",
                "success:7@portway-callback",
                "complete@portway-callback"
            ]
        );
    }

    #[tokio::test]
    async fn test_business_failure_is_classified() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let recorder = Recorder::default();
        let envelope = ApiResponse::<u32> {
            code: 4001,
            msg: "token expired".to_string(),
            data: None,
        };

        let handle = dispatcher.submit(&scope, async move { Ok::<_, CallError>(envelope) }, recorder.clone());
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

        match outcome {
            Outcome::Failure(error) => {
                assert_eq!(error.kind(), ErrorKind::Business);
                assert_eq!(error.message(), "token expired");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(recorder.events()[1], "failure:4001@portway-callback");
    }

    #[tokio::test]
    async fn test_terminated_scope_suppresses_delivery() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let recorder = Recorder::default();

        let handle = dispatcher.submit(
            &scope,
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, CallError>(ApiResponse::success(1_u32))
            },
            recorder.clone(),
        );
        scope.terminate();
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

        assert!(outcome.is_cancelled());
        let events = recorder.events();
        assert_eq!(events, vec!["start@portway-callback", "complete@portway-callback"]);
    }

    #[tokio::test]
    async fn test_handle_cancel_and_state() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let handle = dispatcher.enqueue(&scope, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, CallError>(ApiResponse::success(1_u32))
        });
        assert!(matches!(handle.state(), RequestState::Created | RequestState::Dispatched));

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(!scope.is_terminated());
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_enqueue_returns_payload() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let handle = dispatcher.enqueue(&scope, async { Ok::<_, CallError>(ApiResponse::success("hi".to_string())) });
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();
        assert_eq!(outcome.into_result().unwrap().unwrap(), Some("hi".to_string()));
    }

    struct PanickingHandler {
        completes: Arc<AtomicU8>,
    }

    impl ResponseHandler<u32> for PanickingHandler {
        fn on_success(&mut self, _data: Option<u32>) {
            panic!("handler bug");
        }

        fn on_failure(&mut self, _error: ClassifiedError) {
            panic!("handler bug");
        }

        fn on_complete(&mut self) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_still_completes() {
        let dispatcher = Dispatcher::current().unwrap();
        let scope = LifecycleScope::new();
        let completes = Arc::new(AtomicU8::new(0));

        let handle = dispatcher.submit(
            &scope,
            async { Ok::<_, CallError>(ApiResponse::success(1_u32)) },
            PanickingHandler {
                completes: Arc::clone(&completes),
            },
        );
        let state = handle.state.clone();
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(completes.load(Ordering::SeqCst), 1);
        assert_eq!(state.get(), RequestState::Completed);

        // The callback thread survives and keeps delivering.
        let envelope = ApiResponse::<u32> {
            code: 500,
            msg: "down".to_string(),
            data: None,
        };
        let handle = dispatcher.submit(
            &scope,
            async move { Ok::<_, CallError>(envelope) },
            PanickingHandler {
                completes: Arc::clone(&completes),
            },
        );
        let outcome = tokio::time::timeout(WAIT, handle.outcome()).await.unwrap();
        assert!(matches!(outcome, Outcome::Failure(_)));
        assert_eq!(completes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bound_lifecycle_terminates_scope() {
        let dispatcher = Dispatcher::current().unwrap();
        let lifecycle = ManualLifecycle::new();
        let scope = dispatcher.bind_scope(&lifecycle);
        assert!(!scope.is_terminated());

        lifecycle.end();
        tokio::time::timeout(WAIT, scope.terminated()).await.unwrap();
        assert!(scope.is_terminated());
    }

    #[test]
    fn test_current_requires_runtime() {
        assert!(Dispatcher::current().is_err());
    }
}
