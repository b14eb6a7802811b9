//!
//! Timer
//!
//! A timer is a shared handle; clones refer to the same timer, so a queue and
//! the code that created the timer can both hold it.
//!
//! Firing a terminal timer (a one-shot that already fired, or one that was
//! invalidated) is a no-op and `fire()` returns `false`.
//!
//! The target runs with no internal lock held; it may read, fire or
//! invalidate its own timer.
//!

use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strand_std_core::Object;
use strand_std_core::date::{self, Date};
use tracing::{debug, trace};

use crate::queue::TimerQueue;

/// The target of a timer, tagged with how many objects it takes
pub enum TimerAction {
    Nullary(Box<dyn FnMut() + Send>),
    Unary(Box<dyn FnMut(Option<Object>) + Send>, Option<Object>),
    Binary(
        Box<dyn FnMut(Option<Object>, Option<Object>) + Send>,
        Option<Object>,
        Option<Object>,
    ),
}

impl TimerAction {
    pub fn new(f: impl FnMut() + Send + 'static) -> Self {
        Self::Nullary(Box::new(f))
    }

    pub fn with_object(f: impl FnMut(Option<Object>) + Send + 'static, object: Option<Object>) -> Self {
        Self::Unary(Box::new(f), object)
    }

    pub fn with_objects(
        f: impl FnMut(Option<Object>, Option<Object>) + Send + 'static,
        object1: Option<Object>,
        object2: Option<Object>,
    ) -> Self {
        Self::Binary(Box::new(f), object1, object2)
    }

    pub fn arity(&self) -> u8 {
        match self {
            Self::Nullary(_) => 0,
            Self::Unary(..) => 1,
            Self::Binary(..) => 2,
        }
    }

    fn invoke(&mut self) {
        match self {
            Self::Nullary(f) => f(),
            Self::Unary(f, object) => f(object.clone()),
            Self::Binary(f, object1, object2) => f(object1.clone(), object2.clone()),
        }
    }
}

impl fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerAction").field("arity", &self.arity()).finish()
    }
}

struct TimerState {
    fire_date: Date,
    valid: bool,
    // Taken out while the target runs.
    action: Option<TimerAction>,
}

struct TimerInner {
    interval: Duration,
    repeats: bool,
    arity: u8,
    state: Mutex<TimerState>,
}

#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    /// A timer first due at `fire_date`. It repeats every `interval` when
    /// `repeats` is set and `interval` is non-zero.
    pub fn with_fire_date(fire_date: Date, interval: Duration, repeats: bool, action: TimerAction) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                interval,
                repeats,
                arity: action.arity(),
                state: Mutex::new(TimerState {
                    fire_date,
                    valid: true,
                    action: Some(action),
                }),
            }),
        }
    }

    /// A timer first due `interval` from now
    pub fn with_time_interval(interval: Duration, repeats: bool, action: TimerAction) -> Self {
        Self::with_fire_date(date::advance(date::now(), interval), interval, repeats, action)
    }

    /// Like `with_time_interval`, and adds the timer to the calling thread's
    /// current queue.
    pub fn scheduled_with_time_interval(interval: Duration, repeats: bool, action: TimerAction) -> Self {
        let timer = Self::with_time_interval(interval, repeats, action);
        TimerQueue::current().add_timer(timer.clone());
        debug!(fire_date = %timer.fire_date(), ?interval, repeats, "scheduled timer");
        timer
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke the target if the timer is still valid. A repeating timer then
    /// moves its fire date forward by one interval from the previous fire
    /// date; a one-shot timer becomes terminal. Returns whether the target
    /// ran.
    ///
    /// A target that panics invalidates the timer and the panic resumes in
    /// the caller.
    pub fn fire(&self) -> bool {
        let (mut action, scheduled) = {
            let mut state = self.state();
            if !state.valid {
                trace!("fire on terminal timer ignored");
                return false;
            }
            match state.action.take() {
                Some(action) => (action, state.fire_date),
                None => return false,
            }
        };

        trace!(fire_date = %scheduled, arity = self.inner.arity, "firing timer");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action.invoke())) {
            self.invalidate();
            drop(action);
            panic::resume_unwind(payload);
        }

        let mut state = self.state();
        state.action = Some(action);
        if state.valid && self.repeats() {
            state.fire_date = date::advance(scheduled, self.inner.interval);
        } else {
            state.valid = false;
        }
        true
    }

    /// Make the timer terminal without firing it
    pub fn invalidate(&self) {
        self.state().valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.state().valid
    }

    /// The next date the timer fires; after a one-shot fired, the date it
    /// fired for.
    pub fn fire_date(&self) -> Date {
        self.state().fire_date
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Whether firing reschedules the timer
    pub fn repeats(&self) -> bool {
        self.inner.repeats && !self.inner.interval.is_zero()
    }

    /// How many objects the target takes
    pub fn arity(&self) -> u8 {
        self.inner.arity
    }

    /// Order by fire date only
    pub fn compare(&self, other: &Timer) -> Ordering {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ordering::Equal;
        }
        self.fire_date().cmp(&other.fire_date())
    }

    pub fn ptr_eq(&self, other: &Timer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Timer")
            .field("fire_date", &state.fire_date)
            .field("interval", &self.inner.interval)
            .field("repeats", &self.repeats())
            .field("valid", &state.valid)
            .finish()
    }
}
