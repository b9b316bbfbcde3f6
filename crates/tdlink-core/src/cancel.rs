//! Cancellation token shared between a caller and the calls it issues.
//!
//! The same token type carries the client's shutdown signal: the dispatcher
//! cancels it exactly once when the engine reports its terminal state, and
//! every waiting `send` plus the consumption loop observe it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cancellation token for cooperative cancellation of async operations.
///
/// This token can be cloned and shared across tasks. When `cancel()` is called
/// on any clone, all clones observe the cancellation and every task parked in
/// [`CancellationToken::cancelled`] wakes up.
///
/// # Example
///
/// ```
/// use tdlink_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// assert!(token_clone.cancel());
/// assert!(token.is_cancelled());
/// // Only the first call flips the token.
/// assert!(!token.cancel());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// Returns `true` for the call that actually flipped the token; later calls
    /// are no-ops and return `false`.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        // A `Notified` created before the flag check still receives
        // `notify_waiters`, so no wakeup can slip between check and await.
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::TdError::Cancelled)
        } else {
            Ok(())
        }
    }
}
