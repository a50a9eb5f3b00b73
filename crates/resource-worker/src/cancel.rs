//! Cancellation for callers blocked in `ensure_cached`
//!
//! A cancelled token only releases the caller that is waiting on someone
//! else's populate. The thread running the populate always runs it to
//! completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Clones observe the same flag. [`CancelToken::never`] is a token that
/// cannot be cancelled; waits made with it block in full-length cycles.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    /// Create a token that can be cancelled.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { flag: None }
    }

    /// Request cancellation. No-op for [`CancelToken::never`].
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Whether this token could ever be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.flag.is_some()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_initial() {
        let token = CancelToken::new();
        assert!(token.can_cancel());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_default_is_cancellable() {
        let token = CancelToken::default();
        assert!(token.can_cancel());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_never_token() {
        let token = CancelToken::never();
        token.cancel();
        assert!(!token.can_cancel());
        assert!(!token.is_cancelled());
    }
}
