// src/cancel.rs
// Cooperative cancellation shared by poll sequences and translation dispatches

use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken as Signal;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot cancellation flag with on-cancel callbacks.
///
/// Clones share the same flag. `cancel()` is idempotent: callbacks run exactly
/// once, on the first call. A callback registered after cancellation runs
/// immediately on the registering thread.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    signal: Signal,
    callbacks: Mutex<Vec<Callback>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if self.inner.signal.is_cancelled() {
            return;
        }
        self.inner.signal.cancel();

        // Drain under the lock, run outside it: a callback may touch the token.
        let callbacks = match self.inner.callbacks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    /// Resolves once the token is cancelled. Safe to race in `tokio::select!`.
    pub async fn cancelled(&self) {
        self.inner.signal.cancelled().await
    }

    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let run_now = {
            let mut guard = match self.inner.callbacks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Checked under the lock so a concurrent cancel() either sees this
            // callback in the list or we see the flag.
            if self.inner.signal.is_cancelled() {
                Some(callback)
            } else {
                guard.push(Box::new(callback));
                None
            }
        };

        if let Some(callback) = run_now {
            callback();
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
