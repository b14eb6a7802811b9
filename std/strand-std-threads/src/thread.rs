//!
//! Portable Threads
//!
//! A `Thread` is a handle to one native OS thread and its lifecycle:
//!
//! ```text
//! NotRunning --start()--> Running --(body returns | terminate)--> WaitingForJoin
//! ```
//!
//! The body is anything implementing `ThreadBody`; closures taking the
//! optional payload and returning an optional value qualify. Whatever the
//! body returns (or passes to `terminate_with_object`) is what `join()`
//! returns, as often as it is asked.
//!
//! ## Termination
//!
//! On the terminating thread, after the body finishes:
//! 1. the return value is stored and the state becomes `WaitingForJoin`
//! 2. `ThreadBody::handle_termination` runs
//! 3. `TlsKey::call_all_destructors` runs
//!
//! `terminate()` unwinds the body without invoking the panic hook. A body
//! that panics still goes through termination; `join()` then reports
//! `ThreadError::Panicked`.
//!
//! Native threads are named `<name_prefix>-<id>` with the optional stack size
//! from `strand_std_core::config::current()`.
//!

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use strand_std_core::date::{self, Date};
use strand_std_core::{Object, config};
use tracing::{debug, warn};

use crate::error::ThreadError;
use crate::tls::TlsKey;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Thread>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NotRunning,
    Running,
    WaitingForJoin,
}

/// The code a `Thread` runs
pub trait ThreadBody: Send + 'static {
    /// The main routine. Receives the thread's payload; the returned value is
    /// what `join()` yields.
    fn main(&mut self, object: Option<Object>) -> Option<Object>;

    /// Runs on the thread after `main` returns or the thread terminates,
    /// before thread-local destructors.
    fn handle_termination(&mut self) {}
}

impl<F> ThreadBody for F
where
    F: FnMut(Option<Object>) -> Option<Object> + Send + 'static,
{
    fn main(&mut self, object: Option<Object>) -> Option<Object> {
        self(object)
    }
}

/// Unwind payload used by `terminate_with_object`
struct Termination(Option<Object>);

#[derive(Clone)]
enum Outcome {
    Returned(Option<Object>),
    Panicked(String),
}

struct ThreadInner {
    id: u64,
    name: String,
    object: Option<Object>,
    state: Mutex<ThreadState>,
    body: Mutex<Option<Box<dyn ThreadBody>>>,
    outcome: Mutex<Option<Outcome>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadInner>,
}

impl Thread {
    pub fn new(body: impl ThreadBody) -> Self {
        Self::create(Box::new(body), None)
    }

    pub fn with_object(body: impl ThreadBody, object: Object) -> Self {
        Self::create(Box::new(body), Some(object))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(Option<Object>) -> Option<Object> + Send + 'static,
    {
        Self::new(f)
    }

    fn create(body: Box<dyn ThreadBody>, object: Option<Object>) -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", config::current().threads.name_prefix, id);
        Self {
            inner: Arc::new(ThreadInner {
                id,
                name,
                object,
                state: Mutex::new(ThreadState::NotRunning),
                body: Mutex::new(Some(body)),
                outcome: Mutex::new(None),
                handle: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn object(&self) -> Option<&Object> {
        self.inner.object.as_ref()
    }

    pub fn state(&self) -> ThreadState {
        *lock(&self.inner.state)
    }

    /// Spawn the native thread. On a spawn failure the thread stays
    /// `NotRunning` and keeps its body, so `start()` can be retried.
    pub fn start(&self) -> Result<(), ThreadError> {
        let threads = &config::current().threads;
        let mut builder = std::thread::Builder::new().name(self.inner.name.clone());
        if let Some(size) = threads.stack_size {
            builder = builder.stack_size(size);
        }
        self.launch(|thread| builder.spawn(move || thread.run()))
    }

    fn launch(
        &self,
        spawn: impl FnOnce(Thread) -> io::Result<JoinHandle<()>>,
    ) -> Result<(), ThreadError> {
        let mut state = lock(&self.inner.state);
        match *state {
            ThreadState::NotRunning => {}
            ThreadState::Running => {
                return Err(ThreadError::StillRunning {
                    thread: self.clone(),
                });
            }
            ThreadState::WaitingForJoin => {
                return Err(ThreadError::AlreadyStarted {
                    name: self.inner.name.clone(),
                });
            }
        }

        *state = ThreadState::Running;
        match spawn(self.clone()) {
            Ok(handle) => {
                *lock(&self.inner.handle) = Some(handle);
                debug!(thread = %self.inner.name, "started thread");
                Ok(())
            }
            Err(source) => {
                *state = ThreadState::NotRunning;
                Err(ThreadError::Spawn {
                    name: self.inner.name.clone(),
                    source,
                })
            }
        }
    }

    fn run(self) {
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));

        let mut body = lock(&self.inner.body).take();
        let object = self.inner.object.clone();

        let outcome = match body.as_mut() {
            Some(body) => match panic::catch_unwind(AssertUnwindSafe(|| body.main(object))) {
                Ok(value) => Outcome::Returned(value),
                Err(payload) => match payload.downcast::<Termination>() {
                    Ok(termination) => Outcome::Returned(termination.0),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(thread = %self.inner.name, %message, "thread body panicked");
                        Outcome::Panicked(message)
                    }
                },
            },
            None => Outcome::Returned(None),
        };

        *lock(&self.inner.outcome) = Some(outcome);
        *lock(&self.inner.state) = ThreadState::WaitingForJoin;

        if let Some(body) = body.as_mut() {
            let hook = panic::catch_unwind(AssertUnwindSafe(|| body.handle_termination()));
            if let Err(payload) = hook {
                if !payload.is::<Termination>() {
                    let message = panic_message(payload.as_ref());
                    warn!(thread = %self.inner.name, %message, "termination handler panicked");
                }
            }
        }
        drop(body);

        TlsKey::call_all_destructors();

        CURRENT.with(|current| current.borrow_mut().take());
        debug!(thread = %self.inner.name, "thread terminated");
    }

    /// Wait for the thread to finish and return its result. Joining again
    /// returns the same result.
    pub fn join(&self) -> Result<Option<Object>, ThreadError> {
        if self.state() == ThreadState::NotRunning {
            return Err(ThreadError::NotStarted {
                name: self.inner.name.clone(),
            });
        }
        if Thread::current().is_some_and(|current| current.id() == self.id()) {
            return Err(ThreadError::JoinSelf {
                name: self.inner.name.clone(),
            });
        }

        let join_failure = {
            let mut handle = lock(&self.inner.handle);
            match handle.take() {
                Some(handle) => handle.join().err(),
                None => None,
            }
        };

        let outcome = lock(&self.inner.outcome).clone();
        match outcome {
            Some(Outcome::Returned(value)) => Ok(value),
            Some(Outcome::Panicked(message)) => Err(ThreadError::Panicked {
                name: self.inner.name.clone(),
                message,
            }),
            None => Err(ThreadError::Panicked {
                name: self.inner.name.clone(),
                message: join_failure
                    .map(|payload| panic_message(payload.as_ref()))
                    .unwrap_or_else(|| "thread exited without a result".to_string()),
            }),
        }
    }

    /// Release this handle. Fails, handing the thread back, while it is
    /// still running so the caller can join it first.
    pub fn dispose(self) -> Result<(), ThreadError> {
        if self.state() == ThreadState::Running {
            return Err(ThreadError::StillRunning { thread: self });
        }
        Ok(())
    }

    /// The calling thread, or `None` on a thread not started through `Thread`
    pub fn current() -> Option<Thread> {
        CURRENT
            .try_with(|current| current.borrow().clone())
            .ok()
            .flatten()
    }

    /// End the calling thread's body now; `join()` will return `None`.
    pub fn terminate() -> ! {
        Self::terminate_with_object(None)
    }

    /// End the calling thread's body now; `join()` will return `object`.
    ///
    /// Must be called from inside the body of a running `Thread`. On any
    /// other thread this panics.
    pub fn terminate_with_object(object: Option<Object>) -> ! {
        if Self::current().is_none() {
            panic!("Thread::terminate called outside of a started Thread");
        }
        panic::resume_unwind(Box::new(Termination(object)))
    }

    pub fn set_object_for_key(key: &TlsKey, object: Option<Object>) {
        key.set(object);
    }

    pub fn object_for_key(key: &TlsKey) -> Option<Object> {
        key.get()
    }

    pub fn sleep_for_time_interval(seconds: i64) {
        Self::sleep_for_time_interval_micros(seconds, 0);
    }

    pub fn sleep_for_time_interval_micros(seconds: i64, microseconds: u32) {
        Self::sleep(date::interval_from_parts(seconds, microseconds));
    }

    pub fn sleep(duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    /// Sleep until `date` has passed; returns at once for past dates.
    pub fn sleep_until_date(date: Date) {
        loop {
            let remaining = date::until(date);
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining);
        }
    }

    pub fn yield_now() {
        std::thread::yield_now();
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use strand_std_core::{downcast, object, same_object};

    #[test]
    fn test_join_returns_body_value() {
        let thread = Thread::from_fn(|_| Some(object(42_i64)));
        assert_eq!(thread.state(), ThreadState::NotRunning);

        thread.start().expect("spawn");
        let value = thread.join().expect("join").expect("value");
        assert_eq!(downcast::<i64>(&value), Some(&42));
        assert_eq!(thread.state(), ThreadState::WaitingForJoin);
    }

    #[test]
    fn test_payload_reaches_body() {
        let payload = object(String::from("payload"));
        let thread = Thread::with_object(|object: Option<Object>| object, Arc::clone(&payload));
        assert!(same_object(thread.object(), Some(&payload)));

        thread.start().unwrap();
        let value = thread.join().unwrap();
        assert!(same_object(value.as_ref(), Some(&payload)));
    }

    #[test]
    fn test_failed_spawn_can_be_retried() {
        let thread = Thread::from_fn(|_| Some(object("retried")));

        let err = thread
            .launch(|_| Err(io::Error::new(io::ErrorKind::WouldBlock, "no threads left")))
            .unwrap_err();
        assert!(matches!(err, ThreadError::Spawn { .. }));
        assert_eq!(thread.state(), ThreadState::NotRunning);
        assert!(matches!(thread.join(), Err(ThreadError::NotStarted { .. })));

        thread.start().expect("second start");
        let value = thread.join().unwrap().expect("value");
        assert_eq!(downcast::<&str>(&value), Some(&"retried"));
    }

    #[test]
    fn test_join_never_started() {
        let thread = Thread::from_fn(|_| None);
        assert!(matches!(thread.join(), Err(ThreadError::NotStarted { .. })));
    }

    #[test]
    fn test_join_twice_same_value() {
        let thread = Thread::from_fn(|_| Some(object(5_u32)));
        thread.start().unwrap();
        let first = thread.join().unwrap();
        let second = thread.join().unwrap();
        assert!(same_object(first.as_ref(), second.as_ref()));
    }

    #[test]
    fn test_start_twice() {
        let thread = Thread::from_fn(|_| None);
        thread.start().unwrap();
        thread.join().unwrap();
        assert!(matches!(thread.start(), Err(ThreadError::AlreadyStarted { .. })));
    }

    #[test]
    fn test_terminate_with_object() {
        let thread = Thread::from_fn(|_| {
            Thread::terminate_with_object(Some(object("early")));
        });
        thread.start().unwrap();
        let value = thread.join().unwrap().expect("value");
        assert_eq!(downcast::<&str>(&value), Some(&"early"));
    }

    #[test]
    fn test_terminate_returns_none() {
        let thread = Thread::from_fn(|_| {
            Thread::terminate();
        });
        thread.start().unwrap();
        assert!(thread.join().unwrap().is_none());
    }

    #[test]
    fn test_panicking_body() {
        let thread = Thread::from_fn(|_| panic!("body failed"));
        thread.start().unwrap();
        match thread.join() {
            Err(ThreadError::Panicked { message, .. }) => assert_eq!(message, "body failed"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(thread.join(), Err(ThreadError::Panicked { .. })));
    }

    #[test]
    fn test_current_thread() {
        assert!(Thread::current().is_none());

        let thread = Thread::from_fn(|_| {
            let current = Thread::current().expect("inside a Thread");
            Some(object(current.id()))
        });
        thread.start().unwrap();
        let value = thread.join().unwrap().unwrap();
        assert_eq!(downcast::<u64>(&value), Some(&thread.id()));
    }

    #[test]
    fn test_join_self() {
        let thread = Thread::from_fn(|_| {
            let me = Thread::current().unwrap();
            let failed = matches!(me.join(), Err(ThreadError::JoinSelf { .. }));
            Some(object(failed))
        });
        thread.start().unwrap();
        let value = thread.join().unwrap().unwrap();
        assert_eq!(downcast::<bool>(&value), Some(&true));
    }

    #[test]
    fn test_dispose_running_thread() {
        let gate = Arc::new(Mutex::new(()));
        let held = lock(&gate);

        let inner = Arc::clone(&gate);
        let thread = Thread::from_fn(move |_| {
            drop(lock(&inner));
            None
        });
        thread.start().unwrap();

        let thread = match thread.dispose() {
            Err(ThreadError::StillRunning { thread }) => thread,
            other => panic!("unexpected {other:?}"),
        };

        drop(held);
        thread.join().unwrap();
        assert!(thread.dispose().is_ok());
    }

    #[test]
    fn test_thread_name_uses_prefix() {
        let thread = Thread::from_fn(|_| {
            let name = std::thread::current().name().map(str::to_string);
            name.map(object)
        });
        assert!(thread.name().starts_with(&config::current().threads.name_prefix));

        thread.start().unwrap();
        let value = thread.join().unwrap().unwrap();
        assert_eq!(downcast::<String>(&value).map(String::as_str), Some(thread.name()));
    }

    #[test]
    fn test_sleep_for_time_interval() {
        let start = Instant::now();
        Thread::sleep_for_time_interval_micros(0, 20_000);
        assert!(start.elapsed() >= Duration::from_millis(20));

        let start = Instant::now();
        Thread::sleep_for_time_interval(-1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_until_date() {
        let target = date::advance(date::now(), Duration::from_millis(30));
        Thread::sleep_until_date(target);
        assert!(date::now() >= target);

        let start = Instant::now();
        Thread::sleep_until_date(date::now() - chrono::TimeDelta::seconds(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "outside of a started Thread")]
    fn test_terminate_outside_thread() {
        Thread::terminate();
    }
}
