//!
//! Mutex Implementation
//!
//! Provides a mutual exclusion primitive with an explicit `lock()` /
//! `unlock()` pair instead of a scoped guard.
//!
//! The native guard returned by `std::sync::Mutex` is parked in a
//! thread-local table keyed by the lock's address between `lock()` and
//! `unlock()`. Each parked guard also holds a reference to its lock, so a
//! `Mutex` value dropped while locked never leaves a dangling guard behind.
//!
//! Usage:
//! ```
//! use strand_std_threads::{Locking, Mutex};
//!
//! let m = Mutex::new();
//! m.lock();
//! // critical section
//! m.unlock();
//! ```
//!
//! Preconditions (not checked):
//! - `unlock()` on a lock the calling thread does not hold has no effect
//! - `lock()` on a lock the calling thread already holds deadlocks
//!

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, MutexGuard, PoisonError, TryLockError};

thread_local! {
    static HELD_LOCKS: RefCell<HashMap<usize, HeldLock>> = RefCell::new(HashMap::new());
}

/// A native guard parked between `lock()` and `unlock()`.
///
/// Field order matters: the guard is dropped before the lock it borrows.
pub(crate) struct HeldLock {
    pub(crate) guard: MutexGuard<'static, ()>,
    pub(crate) lock: Arc<std::sync::Mutex<()>>,
}

/// Exclusive locking with explicit release
pub trait Locking {
    /// Block until the calling thread owns the lock.
    fn lock(&self);

    /// Take the lock if it is free; never blocks.
    fn try_lock(&self) -> bool;

    /// Release a lock held by the calling thread.
    fn unlock(&self);

    /// Run `f` with the lock held, releasing it even if `f` panics.
    fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Release<'a, L: Locking + ?Sized>(&'a L);

        impl<L: Locking + ?Sized> Drop for Release<'_, L> {
            fn drop(&mut self) {
                self.0.unlock();
            }
        }

        self.lock();
        let _release = Release(self);
        f()
    }
}

pub struct Mutex {
    raw: Arc<std::sync::Mutex<()>>,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            raw: Arc::new(std::sync::Mutex::new(())),
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.raw) as usize
    }

    /// Whether the calling thread currently holds this lock
    pub fn is_held_by_current_thread(&self) -> bool {
        let key = self.key();
        HELD_LOCKS.with(|held| held.borrow().contains_key(&key))
    }

    /// Park a freshly acquired guard for the calling thread.
    pub(crate) fn hold(&self, guard: MutexGuard<'_, ()>) {
        // SAFETY: the guard borrows the mutex inside `self.raw`. The parked
        // entry keeps a clone of that Arc and drops the guard first, so the
        // mutex outlives the extended borrow.
        let guard: MutexGuard<'static, ()> = unsafe { std::mem::transmute(guard) };
        let entry = HeldLock {
            guard,
            lock: Arc::clone(&self.raw),
        };
        HELD_LOCKS.with(|held| {
            held.borrow_mut().insert(self.key(), entry);
        });
    }

    /// Remove the calling thread's parked guard, if any.
    pub(crate) fn take_held(&self) -> Option<HeldLock> {
        let key = self.key();
        HELD_LOCKS.with(|held| held.borrow_mut().remove(&key))
    }
}

impl Locking for Mutex {
    fn lock(&self) {
        // The mutex protects no data, so a poisoned lock is still usable.
        let guard = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        self.hold(guard);
    }

    fn try_lock(&self) -> bool {
        match self.raw.try_lock() {
            Ok(guard) => {
                self.hold(guard);
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                self.hold(poisoned.into_inner());
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    fn unlock(&self) {
        drop(self.take_held());
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("held_by_current_thread", &self.is_held_by_current_thread())
            .finish()
    }
}
