//! Blocking calls over asynchronous operations.
//!
//! [`SyncBridge`] owns its own multi-threaded tokio runtime. An operation is spawned on
//! that runtime and the calling thread parks on a single-use [`Signal`] until the
//! operation stores its outcome. Because the operation never runs on the calling thread,
//! parking the caller cannot stall it.
//!
//! The precondition is that nothing the operation waits on is driven by the blocked
//! thread. In particular, connections must be created on the bridge runtime (see
//! [`BlockingDatabase`](crate::BlockingDatabase)), not on a runtime owned by the caller.

use std::cell::Cell;
use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::error::AccessError;

thread_local! {
    static IN_BRIDGE_WORKER: Cell<bool> = const { Cell::new(false) };
}

enum SignalState<T, E> {
    Pending,
    Succeeded(T),
    Failed(E),
    Observed,
}

/// Single-use handoff between the operation (producer) and the blocked caller (consumer).
///
/// The producer stores under the mutex and then notifies; the consumer checks under the
/// same mutex before waiting. A notification sent after the consumer's check therefore
/// finds it already waiting, and one sent before is seen by the check itself.
pub struct Signal<T, E> {
    state: Mutex<SignalState<T, E>>,
    ready: Condvar,
}

impl<T, E> Default for Signal<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Signal<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Pending),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the outcome and wake the waiter. Only the first call has any effect; returns
    /// whether this call was it.
    pub fn complete(&self, outcome: Result<T, E>) -> bool {
        let mut state = self.lock();
        if !matches!(*state, SignalState::Pending) {
            return false;
        }
        *state = match outcome {
            Ok(value) => SignalState::Succeeded(value),
            Err(err) => SignalState::Failed(err),
        };
        drop(state);
        self.ready.notify_all();
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.lock(), SignalState::Pending)
    }

    /// Block until the outcome is stored, then take it.
    ///
    /// # Errors
    /// Returns the stored error, or `AccessError::Bridge` if the outcome was already taken.
    pub fn wait(&self) -> Result<T, E>
    where
        E: From<AccessError>,
    {
        let mut state = self.lock();
        while matches!(*state, SignalState::Pending) {
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        Self::take(&mut state)
    }

    /// Like [`Signal::wait`], giving up after `timeout`.
    ///
    /// # Errors
    /// Returns `AccessError::Bridge` on timeout, otherwise as [`Signal::wait`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, E>
    where
        E: From<AccessError>,
    {
        let state = self.lock();
        let (mut state, result) = self
            .ready
            .wait_timeout_while(state, timeout, |s| matches!(s, SignalState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && matches!(*state, SignalState::Pending) {
            return Err(AccessError::Bridge(format!("operation timed out after {timeout:?}")).into());
        }
        Self::take(&mut state)
    }

    fn take(state: &mut SignalState<T, E>) -> Result<T, E>
    where
        E: From<AccessError>,
    {
        match std::mem::replace(state, SignalState::Observed) {
            SignalState::Succeeded(value) => Ok(value),
            SignalState::Failed(err) => Err(err),
            SignalState::Pending | SignalState::Observed => {
                Err(AccessError::Bridge("outcome already observed".to_string()).into())
            }
        }
    }
}

// Marks the signal failed if the operation's task ends without completing it (panic,
// runtime shutdown).
struct CompletionGuard<T, E: From<AccessError>> {
    signal: Arc<Signal<T, E>>,
}

impl<T, E: From<AccessError>> Drop for CompletionGuard<T, E> {
    fn drop(&mut self) {
        let stored = self.signal.complete(Err(AccessError::Bridge(
            "operation ended without producing a result".to_string(),
        )
        .into()));
        if stored {
            debug!("bridged operation aborted");
        }
    }
}

/// Runs asynchronous operations to completion on behalf of threads that cannot suspend.
///
/// Dropping the bridge shuts its runtime down without waiting for spawned work, so it may
/// be dropped from inside an async context.
pub struct SyncBridge {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge").finish_non_exhaustive()
    }
}

impl SyncBridge {
    /// Bridge backed by a runtime with tokio's default worker count.
    ///
    /// # Errors
    /// Returns `AccessError::Bridge` if the runtime cannot be started.
    pub fn new() -> Result<Self, AccessError> {
        Self::build(Builder::new_multi_thread())
    }

    /// # Errors
    /// Returns `AccessError::Bridge` if the runtime cannot be started.
    pub fn with_worker_threads(workers: usize) -> Result<Self, AccessError> {
        let mut builder = Builder::new_multi_thread();
        builder.worker_threads(workers.max(1));
        Self::build(builder)
    }

    fn build(mut builder: Builder) -> Result<Self, AccessError> {
        let runtime = builder
            .thread_name("pg-access-bridge")
            .on_thread_start(|| IN_BRIDGE_WORKER.with(|flag| flag.set(true)))
            .enable_all()
            .build()
            .map_err(|e| AccessError::Bridge(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Handle to the runtime operations run on.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True on the bridge's own worker threads, where blocking would starve the runtime.
    #[must_use]
    pub fn on_worker_thread() -> bool {
        IN_BRIDGE_WORKER.with(Cell::get)
    }

    /// Start `op` and block the calling thread until it finishes.
    ///
    /// The operation's own error comes back unmodified.
    ///
    /// # Errors
    /// Returns the operation's error, or `AccessError::Bridge` (converted into `E`) when
    /// called from a bridge worker thread or when the operation panics.
    pub fn run_synchronously<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<AccessError> + Send + 'static,
    {
        let signal = self.start(op)?;
        signal.wait()
    }

    /// Like [`SyncBridge::run_synchronously`], but stops waiting after `timeout`.
    ///
    /// On timeout the operation keeps running on the bridge runtime and its outcome is
    /// discarded.
    ///
    /// # Errors
    /// As [`SyncBridge::run_synchronously`], plus `AccessError::Bridge` on timeout.
    pub fn run_synchronously_timeout<T, E, F>(&self, op: F, timeout: Duration) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<AccessError> + Send + 'static,
    {
        let signal = self.start(op)?;
        signal.wait_timeout(timeout)
    }

    fn start<T, E, F>(&self, op: F) -> Result<Arc<Signal<T, E>>, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<AccessError> + Send + 'static,
    {
        if Self::on_worker_thread() {
            return Err(AccessError::Bridge(
                "blocking call issued from a bridge worker thread".to_string(),
            )
            .into());
        }
        let signal = Arc::new(Signal::new());
        let guard = CompletionGuard {
            signal: Arc::clone(&signal),
        };
        self.handle.spawn(async move {
            let outcome = op.await;
            guard.signal.complete(outcome);
        });
        Ok(signal)
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("bridge runtime shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn returns_value_after_the_operation_resolves() {
        let bridge = SyncBridge::with_worker_threads(1).unwrap();
        let started = Instant::now();
        let value: Result<i32, AccessError> = bridge.run_synchronously(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(42)
        });
        assert_eq!(value.unwrap(), 42);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn reraises_the_operation_error() {
        let bridge = SyncBridge::with_worker_threads(1).unwrap();
        let err = bridge
            .run_synchronously(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<(), _>(AccessError::Execution("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, AccessError::Execution(msg) if msg == "boom"));
    }

    #[test]
    fn panicking_operation_fails_instead_of_hanging() {
        let bridge = SyncBridge::with_worker_threads(1).unwrap();
        let err = bridge
            .run_synchronously(async {
                if true {
                    panic!("operation panicked");
                }
                Ok::<(), AccessError>(())
            })
            .unwrap_err();
        assert!(matches!(err, AccessError::Bridge(_)));
    }

    #[test]
    fn timeout_is_reported_as_bridge_error() {
        let bridge = SyncBridge::with_worker_threads(1).unwrap();
        let err = bridge
            .run_synchronously_timeout(
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<(), AccessError>(())
                },
                Duration::from_millis(20),
            )
            .unwrap_err();
        assert!(matches!(err, AccessError::Bridge(msg) if msg.contains("timed out")));
    }

    #[test]
    fn rejects_calls_from_its_own_workers() {
        let bridge = Arc::new(SyncBridge::with_worker_threads(2).unwrap());
        let inner = Arc::clone(&bridge);
        let result: Result<Result<(), AccessError>, AccessError> =
            bridge.run_synchronously(async move {
                Ok(inner.run_synchronously(async { Ok::<(), AccessError>(()) }))
            });
        let nested = result.unwrap();
        assert!(matches!(nested, Err(AccessError::Bridge(_))));
    }

    #[test]
    fn signal_keeps_the_first_outcome_and_is_observed_once() {
        let signal: Signal<i32, AccessError> = Signal::new();
        assert!(signal.is_pending());
        assert!(signal.complete(Ok(1)));
        assert!(!signal.complete(Ok(2)));
        assert_eq!(signal.wait().unwrap(), 1);
        assert!(matches!(signal.wait(), Err(AccessError::Bridge(_))));
    }

    #[tokio::test]
    async fn can_be_dropped_inside_an_async_context() {
        let bridge = SyncBridge::with_worker_threads(1).unwrap();
        let pending = Arc::new(Signal::<(), AccessError>::new());
        let observed = Arc::clone(&pending);
        bridge.handle().spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            observed.complete(Ok(()));
        });
        drop(bridge);
        tokio::task::yield_now().await;
        assert!(pending.is_pending());
    }

    #[test]
    fn waiter_wakes_when_completed_from_another_thread() {
        let signal: Arc<Signal<&'static str, AccessError>> = Arc::new(Signal::new());
        let producer = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.complete(Ok("done"));
        });
        assert_eq!(signal.wait().unwrap(), "done");
        handle.join().unwrap();
    }
}
