//! Single-flight cycle guard
//!
//! Two states, `idle` and `running`. Only [`CycleGuard::try_start`] and
//! [`CycleGuard::on_complete`] change them, both with atomic operations, so
//! at most one scrape cycle is in flight no matter how triggers race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Guards the `idle`/`running` cycle state
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `idle → running`. Returns false (and changes nothing) when a cycle is
    /// already running.
    pub fn try_start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `running → idle`, unconditionally
    pub fn on_complete(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a cycle, returning a permit that completes it when dropped.
    ///
    /// The permit makes `running → idle` hold even when the cycle future is
    /// cancelled or panics.
    pub fn acquire(&self) -> Option<CyclePermit> {
        self.try_start().then(|| CyclePermit {
            guard: self.clone(),
        })
    }
}

/// Proof that the holder owns the running cycle
#[derive(Debug)]
#[must_use = "dropping the permit ends the cycle"]
pub struct CyclePermit {
    guard: CycleGuard,
}

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.guard.on_complete();
    }
}
