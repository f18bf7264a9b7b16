//! Reentrancy guard for periodic passes.

use std::sync::atomic::{AtomicBool, Ordering};

/// Held for the duration of one pass; a second `enter` on the same flag
/// fails until the guard is dropped.
#[derive(Debug)]
pub struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    /// Returns `None` if a pass is already running.
    pub fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
