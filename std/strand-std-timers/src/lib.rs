///
/// strand-std-timers — Timers with fire dates
///
/// A `Timer` carries a fire date, an optional repeat interval and a target
/// invoked with zero, one or two objects. Calling `fire()` invokes the target
/// and either reschedules the timer (repeating) or makes it terminal
/// (one-shot).
///
/// ## Scheduling
///
/// Timers do not run themselves. A scheduler picks the timer with the
/// earliest fire date (`Timer::compare`) and calls `fire()` when it is due.
/// `TimerQueue` is the bundled one: a sorted list that is polled with
/// `fire_due(now)`. Timers with equal fire dates fire in insertion order.
///
/// `Timer::scheduled_with_time_interval` adds the new timer to the calling
/// thread's `TimerQueue::current()`.
///
/// ## Drift
///
/// A repeating timer's next fire date is its previous fire date plus the
/// interval, regardless of how late `fire()` was actually called.
///

pub mod queue;
pub mod timer;

pub use queue::TimerQueue;
pub use timer::{Timer, TimerAction};
