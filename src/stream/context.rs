//! Session context: shared epoch and cooperative cancellation
//!
//! One `SessionContext` is created per session and cloned into every
//! source and sink, replacing any ambient/global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag: set exactly once, never reset.
///
/// Producers check it between iterations; consumers never need it because
/// termination reaches them structurally through the stream sentinel.
#[derive(Debug, Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request shutdown. Idempotent; the flag is sticky.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session shared state handed to every component.
///
/// The epoch is the instant all `t_rel` values are measured from, so the
/// independently-captured streams stay comparable.
#[derive(Debug, Clone)]
pub struct SessionContext {
    epoch: Instant,
    shutdown: ShutdownFlag,
}

impl SessionContext {
    /// Create a fresh context; the epoch is "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Seconds elapsed since the session epoch.
    pub fn elapsed(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_sticky() {
        let ctx = SessionContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn elapsed_is_monotone() {
        let ctx = SessionContext::new();
        let a = ctx.elapsed();
        let b = ctx.elapsed();
        assert!(b >= a);
    }
}
