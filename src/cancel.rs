//! Cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag checked between stages and between per-run tasks.
///
/// Cancelling never interrupts a task that already started; the next task
/// or stage simply does not begin.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
