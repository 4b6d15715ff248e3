//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::Waker;

/// Coordinator for graceful shutdown.
///
/// Cloned into every event loop. Loops register their poller's waker so a
/// trigger interrupts a blocking poll instead of waiting out its timeout.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    wakers: Mutex<Vec<Arc<Waker>>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake `waker` when shutdown is triggered. Wakes it immediately if
    /// shutdown already happened.
    pub fn subscribe(&self, waker: Arc<Waker>) {
        if let Ok(mut wakers) = self.inner.wakers.lock() {
            wakers.push(Arc::clone(&waker));
        }
        if self.is_triggered() {
            let _ = waker.wake();
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(wakers) = self.inner.wakers.lock() {
            for waker in wakers.iter() {
                if let Err(err) = waker.wake() {
                    tracing::warn!(error = %err, "Failed to wake event loop");
                }
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
