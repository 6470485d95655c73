//! Cooperative progress reporting and cancellation for long scans.

use std::sync::atomic::{AtomicBool, Ordering};

/// Polled by long running scans. Returning `false` from [`Progress::update`]
/// asks the scan to stop; the scan then fails with
/// [`Error::Cancelled`](crate::error::Error::Cancelled) and leaves previously
/// cached results untouched.
pub trait Progress: Sync {
    /// `fraction` is in `[0, 1]`. May be called from several threads.
    fn update(&self, message: &str, fraction: f32) -> bool;
}

impl<F> Progress for F
where
    F: Fn(&str, f32) -> bool + Sync,
{
    fn update(&self, message: &str, fraction: f32) -> bool {
        self(message, fraction)
    }
}

/// Never reports, never cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&self, _message: &str, _fraction: f32) -> bool {
        true
    }
}

/// Cancellation flag that can be flipped from another thread.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Progress for CancelToken {
    fn update(&self, _message: &str, _fraction: f32) -> bool {
        !self.is_cancelled()
    }
}
