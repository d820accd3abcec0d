use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::lifecycle::JointSignal;

/// Binary mutual exclusion around a shared resource.
///
/// Admits one holder at a time. Waiting honors a [`JointSignal`]; a waiter
/// that gives up leaves the holder and every other waiter untouched. No
/// ordering between waiters is promised.
#[derive(Debug)]
pub struct ExclusiveGate<T> {
    slot: Mutex<T>,
}

impl<T> ExclusiveGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(value),
        }
    }

    /// Wait for exclusive access unless `signal` fires first.
    ///
    /// Access is released when the returned guard is dropped.
    pub async fn acquire(&self, signal: &JointSignal<'_>) -> Result<MutexGuard<'_, T>> {
        signal.guard(self.slot.lock()).await
    }

    /// Wait for exclusive access with no cancellation.
    ///
    /// Used by teardown after the disposal signal has fired, when every
    /// other holder is already on its way out.
    pub async fn acquire_for_teardown(&self) -> MutexGuard<'_, T> {
        self.slot.lock().await
    }

    /// Take access only if nobody holds it right now.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        self.slot.try_lock().ok()
    }

    pub fn into_inner(self) -> T {
        self.slot.into_inner()
    }
}
