//!
//! Condition Variable
//!
//! A `Condition` is a mutex that threads can also wait on. It follows
//! monitor semantics:
//!
//! - `wait()` atomically releases the lock and suspends the caller; the lock
//!   is held again when `wait()` returns
//! - `signal()` wakes at most one waiter, in no particular order
//! - `broadcast()` wakes every current waiter
//!
//! Wakeups may be spurious, so callers re-check their predicate in a loop:
//!
//! ```
//! use strand_std_threads::{Condition, Locking};
//!
//! let cond = Condition::new();
//! let ready = std::sync::atomic::AtomicBool::new(true);
//! cond.lock();
//! while !ready.load(std::sync::atomic::Ordering::SeqCst) {
//!     cond.wait().unwrap();
//! }
//! cond.unlock();
//! ```
//!

use std::fmt;
use std::sync::{Condvar, PoisonError};

use crate::error::SyncError;
use crate::mutex::{HeldLock, Locking, Mutex};

#[derive(Default)]
pub struct Condition {
    mutex: Mutex,
    condvar: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until signaled. The calling thread must hold the lock; if it
    /// does not, nothing is released and `SyncError::NotLocked` is returned.
    pub fn wait(&self) -> Result<(), SyncError> {
        let HeldLock { guard, lock } = self.mutex.take_held().ok_or(SyncError::NotLocked)?;
        let guard = self
            .condvar
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner);
        self.mutex.hold(guard);
        drop(lock);
        Ok(())
    }

    pub fn signal(&self) {
        self.condvar.notify_one();
    }

    pub fn broadcast(&self) {
        self.condvar.notify_all();
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.mutex.is_held_by_current_thread()
    }
}

impl Locking for Condition {
    fn lock(&self) {
        self.mutex.lock();
    }

    fn try_lock(&self) -> bool {
        self.mutex.try_lock()
    }

    fn unlock(&self) {
        self.mutex.unlock();
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("held_by_current_thread", &self.is_held_by_current_thread())
            .finish()
    }
}
