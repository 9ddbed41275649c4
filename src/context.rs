use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{CodeIntelError, Result};

/// Per-call deadline and cancellation signal.
///
/// Cloning shares the cancellation flag, so a handle kept by the caller
/// can abort work running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    canceled: Arc<AtomicBool>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            canceled: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_optional_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::new, Self::with_timeout)
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.canceled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Canceled)` once canceled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(CodeIntelError::Canceled)
        } else {
            Ok(())
        }
    }
}
