//! Background runtime bridge for the blocking façade.
//!
//! One [`SyncBridge`] owns one background thread running a
//! current-thread tokio runtime. The non-blocking client and its
//! receive loop live on that runtime for the bridge's lifetime;
//! blocking callers cross the domain boundary only through
//! [`SyncBridge::run`], which schedules a future onto the runtime and
//! parks the calling thread until the result comes back.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Bound on waiting for the background thread to drain on `stop()`.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SyncBridge
// ============================================================================

struct BridgeInner {
    handle: Handle,
    shutdown_tx: oneshot::Sender<()>,
    done_rx: std::sync::mpsc::Receiver<()>,
}

/// Bridge between blocking callers and the non-blocking client.
///
/// `start()` is idempotent; `run()` before `start()` fails with
/// [`Error::NotStarted`]; `stop()` after the runtime is gone is a
/// no-op. Multiple external threads may call `run()` concurrently:
/// each call is its own task and its result is delivered only to the
/// originating caller.
#[derive(Default)]
pub struct SyncBridge {
    inner: Mutex<Option<BridgeInner>>,
}

impl SyncBridge {
    /// Creates a bridge in the stopped state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the background runtime thread.
    ///
    /// Calling `start` on a running bridge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the runtime cannot be built.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Ok(());
        }

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        thread::Builder::new()
            .name("vibium-bridge".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    // Parks until stop() fires or the bridge is dropped;
                    // spawned tasks keep running meanwhile.
                    let _ = shutdown_rx.await;
                });
                let _ = done_tx.send(());
                debug!("Bridge runtime stopped");
            })?;

        *inner = Some(BridgeInner {
            handle,
            shutdown_tx,
            done_rx,
        });

        debug!("Bridge runtime started");
        Ok(())
    }

    /// Returns `true` while the background runtime is up.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Runs a future on the background runtime, blocking the calling
    /// thread until it completes.
    ///
    /// The operation's error crosses the boundary unchanged, kind and
    /// message intact.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] if the bridge is not running
    /// - [`Error::ChannelClosed`] if the runtime dropped the operation
    ///   (shutdown mid-call)
    /// - whatever the operation itself returns
    ///
    /// # Deadlocks
    ///
    /// Must not be called from within the bridge's own runtime thread:
    /// the call parks the thread the operation needs to run on, so it
    /// never completes. Handlers running on the runtime use the
    /// decision pattern in [`super::objects`] instead.
    pub fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = {
            let inner = self.inner.lock();
            match inner.as_ref() {
                Some(inner) => inner.handle.clone(),
                None => return Err(Error::NotStarted),
            }
        };

        let (result_tx, result_rx) = oneshot::channel();
        handle.spawn(async move {
            let _ = result_tx.send(operation.await);
        });

        result_rx.blocking_recv()?
    }

    /// Stops the background runtime.
    ///
    /// Signals shutdown, waits bounded time for the thread to drain,
    /// then releases the handle. No-op if already stopped.
    pub fn stop(&self) {
        let Some(inner) = self.inner.lock().take() else {
            return;
        };

        let _ = inner.shutdown_tx.send(());
        if inner.done_rx.recv_timeout(STOP_TIMEOUT).is_err() {
            warn!(
                timeout_ms = STOP_TIMEOUT.as_millis() as u64,
                "Bridge thread did not drain in time"
            );
        }
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        // Dropping the shutdown sender wakes the runtime; no bounded
        // wait here, the thread is detached.
        let _ = self.inner.lock().take();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_before_start_fails() {
        let bridge = SyncBridge::new();
        let err = bridge.run(async { Ok(42) }).expect_err("not started");
        assert!(matches!(err, Error::NotStarted));
    }

    #[test]
    fn test_start_is_idempotent() {
        let bridge = SyncBridge::new();
        bridge.start().expect("start");
        bridge.start().expect("second start is a no-op");
        assert!(bridge.is_running());
        bridge.stop();
    }

    #[test]
    fn test_run_returns_result() {
        let bridge = SyncBridge::new();
        bridge.start().expect("start");

        let value = bridge.run(async { Ok(1 + 2) }).expect("run");
        assert_eq!(value, 3);

        bridge.stop();
    }

    #[test]
    fn test_error_crosses_boundary_unchanged() {
        let bridge = SyncBridge::new();
        bridge.start().expect("start");

        let err = bridge
            .run(async { Err::<(), _>(Error::remote("no such alert", "dialog gone")) })
            .expect_err("error propagates");

        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(err.to_string(), "Remote error [no such alert]: dialog gone");

        bridge.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let bridge = SyncBridge::new();
        bridge.start().expect("start");
        bridge.stop();
        bridge.stop();
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_run_after_stop_fails() {
        let bridge = SyncBridge::new();
        bridge.start().expect("start");
        bridge.stop();

        let err = bridge.run(async { Ok(()) }).expect_err("stopped");
        assert!(matches!(err, Error::NotStarted));
    }

    #[test]
    fn test_concurrent_callers_get_their_own_results() {
        let bridge = std::sync::Arc::new(SyncBridge::new());
        bridge.start().expect("start");

        let mut threads = Vec::new();
        for n in 0..4u64 {
            let bridge = std::sync::Arc::clone(&bridge);
            threads.push(thread::spawn(move || {
                bridge.run(async move { Ok(n * 10) }).expect("run")
            }));
        }

        let results: Vec<u64> = threads
            .into_iter()
            .map(|t| t.join().expect("join"))
            .collect();
        assert_eq!(results, vec![0, 10, 20, 30]);

        bridge.stop();
    }
}
