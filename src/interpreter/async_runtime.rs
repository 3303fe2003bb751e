// File: src/interpreter/async_runtime.rs
//
// Tokio runtime wrapper shared by the interpreter.
// Provides a global, lazy-initialized tokio runtime used for every blocking
// wait the interpreter performs:
// - the event loop worker parking until a task, timer or cancellation arrives
// - the `time.sleep` builtin racing its duration against cancellation
//
// User code never runs inside the runtime; it is only entered to wait.

use once_cell::sync::Lazy;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Global tokio runtime instance, initialized lazily on first access
static RUNTIME: Lazy<Runtime> = Lazy::new(|| Runtime::new().expect("Failed to create tokio runtime"));

/// Async runtime wrapper providing blocking waits
pub struct AsyncRuntime;

impl AsyncRuntime {
    /// Get reference to the global tokio runtime
    pub fn runtime() -> &'static Runtime {
        &RUNTIME
    }

    /// Block the current thread until the future completes
    ///
    /// Must not be called from inside a tokio runtime context.
    pub fn block_on<F>(future: F) -> F::Output
    where
        F: std::future::Future,
    {
        Self::runtime().block_on(future)
    }

    /// Whether the current thread is already driving a tokio runtime,
    /// where `block_on` would panic
    pub fn in_runtime_context() -> bool {
        tokio::runtime::Handle::try_current().is_ok()
    }

    /// Create a future that completes after a duration
    pub async fn sleep(duration: Duration) {
        tokio::time::sleep(duration).await
    }

    /// Block for `duration` or until `token` is cancelled, whichever comes first.
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    pub fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        Self::block_on(async {
            tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = Self::sleep(duration) => true,
            }
        })
    }
}
