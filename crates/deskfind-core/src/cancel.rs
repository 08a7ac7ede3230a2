//! Cooperative cancellation for search sessions.
//!
//! A session owns one token; the supervisor keeps a clone. Cancelling never
//! interrupts backend work that is already in flight, it only makes every
//! later resumption point observe the flag and discard what it got.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cancellation token shared between a session and its owner.
///
/// Clones observe the same state. Besides polling [`is_cancelled`], async code
/// can await [`cancelled`] to race a pending backend read against
/// cancellation.
///
/// # Example
///
/// ```
/// use deskfind_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let session_side = token.clone();
///
/// token.cancel();
/// assert!(session_side.is_cancelled());
/// ```
///
/// [`is_cancelled`]: CancellationToken::is_cancelled
/// [`cancelled`]: CancellationToken::cancelled
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every task waiting in [`cancelled`].
    ///
    /// Idempotent.
    ///
    /// [`cancelled`]: CancellationToken::cancelled
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel()
            // cannot slip between the check and the wait.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Return an error if cancelled, for early returns with `?`.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation observes cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Search was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::SearchError {
    fn from(_: CancelledError) -> Self {
        crate::error::SearchError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token2.cancel();

        assert!(token1.is_cancelled());
        assert_eq!(token1.check(), Err(CancelledError));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("already-cancelled token should resolve");
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task should not panic");
    }

    #[test]
    fn test_cancelled_error_display() {
        assert_eq!(CancelledError.to_string(), "Search was cancelled");
        let err: crate::error::SearchError = CancelledError.into();
        assert!(matches!(err, crate::error::SearchError::Cancelled));
    }
}
