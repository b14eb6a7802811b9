//!
//! Thread-Local Storage Keys
//!
//! A `TlsKey` names one storage slot that every thread has its own copy of.
//! Keys are process-wide and never reuse an id.
//!
//! ## Registry
//!
//! Keys created with a destructor are appended to a global registry guarded
//! by its own lock. When a `Thread` terminates it calls
//! `TlsKey::call_all_destructors()`, which hands every non-null slot value of
//! that thread to its key's destructor, exactly once, then clears the slot.
//! Keys without a destructor are never registered; their values are simply
//! dropped with the thread.
//!
//! The pass runs once over the keys in creation order. A destructor that
//! stores a value for a key the pass already visited leaves that value in
//! place; it is dropped with the thread without a destructor call.
//!
//! Dropping the last handle to a key unregisters it. Values other threads
//! still hold for that key are then released without a destructor call.
//!
//! ## Slots
//!
//! Per-thread slots live in a thread-local map keyed by key id, so reads and
//! writes take no lock.
//!

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use strand_std_core::Object;
use tracing::{debug, trace};

/// Called with a thread's slot value when that thread terminates
pub type Destructor = Arc<dyn Fn(Object) + Send + Sync>;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SLOTS: RefCell<HashMap<u64, Object>> = RefCell::new(HashMap::new());
}

struct RegisteredKey {
    id: u64,
    destructor: Destructor,
}

struct KeyRegistry {
    keys: Vec<RegisteredKey>,
}

impl KeyRegistry {
    fn new() -> Self {
        Self { keys: Vec::new() }
    }

    fn register(&mut self, id: u64, destructor: Destructor) {
        self.keys.push(RegisteredKey { id, destructor });
    }

    fn unregister(&mut self, id: u64) -> Option<RegisteredKey> {
        let pos = self.keys.iter().position(|k| k.id == id)?;
        Some(self.keys.remove(pos))
    }

    fn snapshot(&self) -> Vec<(u64, Destructor)> {
        self.keys
            .iter()
            .map(|k| (k.id, Arc::clone(&k.destructor)))
            .collect()
    }
}

static KEY_REGISTRY: OnceLock<Mutex<KeyRegistry>> = OnceLock::new();

fn with_registry<R>(f: impl FnOnce(&mut KeyRegistry) -> R) -> R {
    let registry = KEY_REGISTRY.get_or_init(|| Mutex::new(KeyRegistry::new()));
    let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut registry)
}

struct KeyInner {
    id: u64,
    destructor: Option<Destructor>,
}

impl Drop for KeyInner {
    fn drop(&mut self) {
        if self.destructor.is_some() {
            // Dropped outside the registry lock: the destructor may own keys.
            let removed = with_registry(|registry| registry.unregister(self.id));
            drop(removed);
        }
        let stale = SLOTS
            .try_with(|slots| slots.borrow_mut().remove(&self.id))
            .ok()
            .flatten();
        drop(stale);
        debug!(key = self.id, "released TLS key");
    }
}

/// Handle to a process-wide thread-local storage key
#[derive(Clone)]
pub struct TlsKey {
    inner: Arc<KeyInner>,
}

impl TlsKey {
    pub fn new() -> Self {
        Self::create(None)
    }

    pub fn with_destructor(destructor: impl Fn(Object) + Send + Sync + 'static) -> Self {
        Self::create(Some(Arc::new(destructor)))
    }

    fn create(destructor: Option<Destructor>) -> Self {
        let id = NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed);
        if let Some(d) = &destructor {
            with_registry(|registry| registry.register(id, Arc::clone(d)));
        }
        debug!(key = id, destructor = destructor.is_some(), "created TLS key");
        Self {
            inner: Arc::new(KeyInner { id, destructor }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn has_destructor(&self) -> bool {
        self.inner.destructor.is_some()
    }

    /// Store `value` in the calling thread's slot. The previous value is
    /// dropped; `None` clears the slot.
    pub fn set(&self, value: Option<Object>) {
        let id = self.inner.id;
        let previous = SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            match value {
                Some(v) => slots.insert(id, v),
                None => slots.remove(&id),
            }
        });
        drop(previous);
    }

    /// The calling thread's value, `None` if unset
    pub fn get(&self) -> Option<Object> {
        SLOTS.with(|slots| slots.borrow().get(&self.inner.id).cloned())
    }

    /// Run the destructor of every registered key for the calling thread's
    /// non-null values, clearing each slot first. Called once per
    /// terminating thread.
    pub fn call_all_destructors() {
        let keys = with_registry(|registry| registry.snapshot());

        for (id, destructor) in keys {
            let value = SLOTS
                .try_with(|slots| slots.borrow_mut().remove(&id))
                .ok()
                .flatten();
            if let Some(value) = value {
                trace!(key = id, "calling TLS destructor");
                destructor(value);
            }
        }
    }
}

impl Default for TlsKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TlsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsKey")
            .field("id", &self.inner.id)
            .field("has_destructor", &self.has_destructor())
            .finish()
    }
}
