//! Drives `DeadlineQueue` by the timer thread
use alarm_clock::{time, Deadline, DeadlineQueue, TickSource};
use alarm_clock_port_std::{start_timer, stop_timer, use_port};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use_port!(unsafe struct Port, ticks_per_second = 1000);

static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
static FIRED: AtomicUsize = AtomicUsize::new(0);
static PERIODIC: Deadline<Port> = Deadline::new(periodic);

const PERIOD_TICKS: u32 = time::ticks_from_millis::<Port>(5);

fn periodic(this: &'static Deadline<Port>, queue: &'static DeadlineQueue<Port>) {
    FIRED.fetch_add(1, Ordering::SeqCst);
    queue.schedule(this, PERIOD_TICKS).unwrap();
}

#[test]
fn periodic_deadline() {
    let _ = env_logger::builder().is_test(true).try_init();

    Port::attach_callback(|| QUEUE.advance().unwrap());
    unsafe { Port::enable() };

    QUEUE.schedule(&PERIODIC, PERIOD_TICKS).unwrap();
    start_timer::<Port>().unwrap();
    // Starting twice is harmless
    start_timer::<Port>().unwrap();

    let timeout = Instant::now() + Duration::from_secs(10);
    while FIRED.load(Ordering::SeqCst) < 3 {
        assert!(Instant::now() < timeout, "timed out");
        QUEUE.drain_ready().unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    stop_timer::<Port>();
    let tick_count = QUEUE.tick_count().unwrap();
    assert!(tick_count >= 3 * PERIOD_TICKS, "{}", tick_count);

    // No more ticks after the timer is stopped
    thread::sleep(Duration::from_millis(20));
    assert_eq!(QUEUE.tick_count().unwrap(), tick_count);
    assert!(PERIODIC.is_scheduled().unwrap());
}
