//!
//! strand-std-threads - Concurrency Primitives
//!
//! Portable threads and the synchronization primitives that go with them.
//! Every `Thread` maps one-to-one onto a native OS thread.
//!
//! ## Threads
//!
//! - `Thread::new(body)` / `Thread::with_object(body, object)` - Create a thread
//! - `thread.start()` - Spawn the native thread
//! - `thread.join()` - Wait for it and read its return value
//! - `Thread::terminate_with_object(value)` - Return early from inside a thread
//! - `Thread::current()` - The calling thread, `None` on the initial thread
//!
//! ## Thread-Local Storage
//!
//! - `TlsKey::new()` / `TlsKey::with_destructor(f)` - Create a key
//! - `key.set(value)` / `key.get()` - Per-thread slot access
//!
//! Destructors run on the terminating thread after its termination hook.
//!
//! ## Mutex and Condition
//!
//! - `Mutex::new()` - `lock()`, `try_lock()`, `unlock()`
//! - `Condition::new()` - a mutex plus `wait()`, `signal()`, `broadcast()`
//!
//! Locks are not RAII guards: every `lock()` is paired with an `unlock()`
//! on the same thread.
//!

pub mod condition;
pub mod error;
pub mod mutex;
pub mod thread;
pub mod tls;

pub use condition::*;
pub use error::*;
pub use mutex::*;
pub use thread::*;
pub use tls::*;
