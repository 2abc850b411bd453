//! Corrects `DeadlineQueue` after a simulated sleep
use alarm_clock::{Deadline, DeadlineQueue, TickSource};
use alarm_clock_port_std::{enter_sleep, pend_tick, use_port};
use std::{thread, time::Duration};

use_port!(unsafe struct Port);

static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
static WAKE: Deadline<Port> = Deadline::new(|_, _| {});

#[test]
fn correct_after_sleep() {
    let _ = env_logger::builder().is_test(true).try_init();

    Port::attach_callback(|| QUEUE.advance().unwrap());
    unsafe { Port::enable() };
    QUEUE.schedule(&WAKE, 100).unwrap();

    let token = enter_sleep::<Port>();
    assert!(!Port::is_enabled());

    // The tick doesn't advance during the sleep
    pend_tick::<Port>();
    assert_eq!(QUEUE.tick_count().unwrap(), 0);

    thread::sleep(Duration::from_millis(300));
    let elapsed = token.wake();
    assert!(Port::is_enabled());
    assert!(elapsed >= 30, "{}", elapsed);

    QUEUE.correct_for_elapsed(elapsed).unwrap();

    // An overshoot beyond the nearest deadline makes it ready
    assert_eq!(
        QUEUE.remaining_ticks(&WAKE).unwrap(),
        Some(100u32.saturating_sub(elapsed))
    );
    assert_eq!(QUEUE.tick_count().unwrap(), elapsed.min(100));
}
