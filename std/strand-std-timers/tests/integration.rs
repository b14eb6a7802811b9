///
/// # Integration Tests for strand-std-timers
///
/// Drives timer queues from real threads: a worker sleeps until the next fire
/// date and fires what is due, the way an outer scheduler would.
///

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use strand_std_core::{date, downcast, object};
use strand_std_threads::Thread;
use strand_std_timers::{Timer, TimerAction, TimerQueue};

fn drain(queue: &TimerQueue, rounds: usize) -> usize {
    let mut fired = 0;
    for _ in 0..rounds {
        let Some(next) = queue.next_fire_date() else {
            break;
        };
        Thread::sleep_until_date(next);
        fired += queue.fire_due(date::now());
    }
    fired
}

#[test]
fn test_repeating_timer_on_worker_thread() {
    let ticks = Arc::new(AtomicUsize::new(0));

    let worker = {
        let ticks = Arc::clone(&ticks);
        Thread::from_fn(move |_| {
            let t = Arc::clone(&ticks);
            let timer = Timer::scheduled_with_time_interval(
                Duration::from_millis(10),
                true,
                TimerAction::new(move || {
                    t.fetch_add(1, Ordering::SeqCst);
                }),
            );
            let first = timer.fire_date();

            let fired = drain(&TimerQueue::current(), 3);
            let drift_free = timer.fire_date() == date::advance(first, Duration::from_millis(30));
            timer.invalidate();
            Some(object((fired, drift_free)))
        })
    };

    worker.start().unwrap();
    let value = worker.join().unwrap().unwrap();
    assert_eq!(downcast::<(usize, bool)>(&value), Some(&(3, true)));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_one_shot_timers_fire_once_each() {
    let queue = TimerQueue::new();
    let hits = Arc::new(AtomicUsize::new(0));

    for delay in [15_u64, 5, 10] {
        let h = Arc::clone(&hits);
        queue.add_timer(Timer::with_time_interval(
            Duration::from_millis(delay),
            false,
            TimerAction::with_object(
                move |o| {
                    let step = o.as_ref().and_then(|o| downcast::<u64>(o).copied()).unwrap_or(0);
                    h.fetch_add(step as usize, Ordering::SeqCst);
                },
                Some(object(delay)),
            ),
        ));
    }

    assert_eq!(drain(&queue, 10), 3);
    assert!(queue.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 30);
}

#[test]
fn test_queues_are_per_thread() {
    let timer = Timer::scheduled_with_time_interval(Duration::from_secs(60), false, TimerAction::new(|| {}));

    let queued = timer.clone();
    let other = Thread::from_fn(move |_| Some(object(TimerQueue::current().contains(&queued))));
    other.start().unwrap();
    let seen = other.join().unwrap().unwrap();

    assert_eq!(downcast::<bool>(&seen), Some(&false));
    assert!(TimerQueue::current().contains(&timer));
    timer.invalidate();
}
