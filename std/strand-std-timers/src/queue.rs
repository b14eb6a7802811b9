///
/// Polled timer queue
///
/// Keeps timers sorted by fire date. Timers with the same fire date stay in
/// the order they were added, and a repeating timer that is put back after
/// firing goes behind timers already waiting for its new date.
///
/// Nothing here sleeps or spawns: the owner asks `next_fire_date()`, waits
/// however it likes, then calls `fire_due(now)`.
///
/// A queued timer may also be fired or invalidated directly; the queue reads
/// each timer's fire date again before answering.
///
/// If a target panics inside `fire_due`, the timers not yet fired in that
/// call go back into the queue before the panic resumes.
///

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strand_std_core::date::Date;
use tracing::trace;

use crate::timer::Timer;

thread_local! {
    static CURRENT_QUEUE: Arc<TimerQueue> = Arc::new(TimerQueue::new());
}

struct TimerEntry {
    fire_date: Date,
    timer: Timer,
}

#[derive(Default)]
pub struct TimerQueue {
    entries: Mutex<Vec<TimerEntry>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The calling thread's queue, used by the scheduled timer constructors
    pub fn current() -> Arc<TimerQueue> {
        CURRENT_QUEUE.with(Arc::clone)
    }

    fn entries(&self) -> MutexGuard<'_, Vec<TimerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entries with their timers' current fire dates, re-sorted if any moved
    fn refreshed(&self) -> MutexGuard<'_, Vec<TimerEntry>> {
        let mut entries = self.entries();
        let mut moved = false;
        for entry in entries.iter_mut() {
            let fire_date = entry.timer.fire_date();
            if fire_date != entry.fire_date {
                entry.fire_date = fire_date;
                moved = true;
            }
        }
        if moved {
            // Stable, so ties keep their queue order.
            entries.sort_by_key(|e| e.fire_date);
        }
        entries
    }

    pub fn add_timer(&self, timer: Timer) {
        let fire_date = timer.fire_date();
        let mut entries = self.entries();
        let pos = entries.partition_point(|e| e.fire_date <= fire_date);
        entries.insert(pos, TimerEntry { fire_date, timer });
    }

    /// Earliest fire date among valid timers
    pub fn next_fire_date(&self) -> Option<Date> {
        self.refreshed()
            .iter()
            .find(|e| e.timer.is_valid())
            .map(|e| e.fire_date)
    }

    /// Fire every valid timer due at `now`, earliest first, then put the
    /// ones that are still valid back. Invalid timers are dropped. Returns
    /// the number of timers fired.
    pub fn fire_due(&self, now: Date) -> usize {
        let due: Vec<Timer> = {
            let mut entries = self.refreshed();
            let split = entries.partition_point(|e| e.fire_date <= now);
            entries.drain(..split).map(|e| e.timer).collect()
        };

        let mut fired = 0;
        let mut due = due.into_iter();
        while let Some(timer) = due.next() {
            match panic::catch_unwind(AssertUnwindSafe(|| timer.fire())) {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(payload) => {
                    for rest in due.by_ref().filter(Timer::is_valid) {
                        self.add_timer(rest);
                    }
                    panic::resume_unwind(payload);
                }
            }
            if timer.is_valid() {
                self.add_timer(timer);
            }
        }

        if fired > 0 {
            trace!(fired, "fired due timers");
        }
        fired
    }

    pub fn contains(&self, timer: &Timer) -> bool {
        self.entries().iter().any(|e| e.timer.ptr_eq(timer))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
