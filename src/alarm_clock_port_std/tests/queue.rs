//! Drives `DeadlineQueue` by simulated tick interrupts
use alarm_clock::{Deadline, DeadlineQueue, ResultCode, ScheduleError, TickSource};
use alarm_clock_port_std::{pend_tick, use_port};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Mutex,
    },
    thread,
    time::Duration,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn nearest_deadline_fires_first() {
    use_port!(unsafe struct Port);
    static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
    static FIRED: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    static D1: Deadline<Port> = Deadline::with_param(record, 1);
    static D2: Deadline<Port> = Deadline::with_param(record, 2);

    fn record(deadline: &'static Deadline<Port>, _: &'static DeadlineQueue<Port>) {
        FIRED.lock().unwrap().push(deadline.param());
    }

    init_logger();
    Port::attach_callback(|| QUEUE.advance().unwrap());
    unsafe { Port::enable() };

    QUEUE.schedule(&D1, 50).unwrap();
    QUEUE.schedule(&D2, 30).unwrap();

    for _ in 0..30 {
        pend_tick::<Port>();
    }
    assert!(QUEUE.drain_ready().unwrap());
    assert_eq!(*FIRED.lock().unwrap(), [2]);

    for _ in 0..19 {
        pend_tick::<Port>();
    }
    assert!(!QUEUE.drain_ready().unwrap());

    pend_tick::<Port>();
    assert!(QUEUE.drain_ready().unwrap());
    assert_eq!(*FIRED.lock().unwrap(), [2, 1]);
    assert_eq!(QUEUE.tick_count().unwrap(), 50);
}

#[test]
fn ties_fire_in_insertion_order() {
    use_port!(unsafe struct Port);
    static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
    static FIRED: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    static D1: Deadline<Port> = Deadline::with_param(record, 1);
    static D2: Deadline<Port> = Deadline::with_param(record, 2);

    fn record(deadline: &'static Deadline<Port>, _: &'static DeadlineQueue<Port>) {
        FIRED.lock().unwrap().push(deadline.param());
    }

    init_logger();
    Port::attach_callback(|| QUEUE.advance().unwrap());
    unsafe { Port::enable() };

    QUEUE.schedule(&D1, 10).unwrap();
    QUEUE.schedule(&D2, 10).unwrap();

    for _ in 0..10 {
        pend_tick::<Port>();
    }
    assert!(QUEUE.drain_ready().unwrap());
    assert_eq!(*FIRED.lock().unwrap(), [1, 2]);
}

#[test]
fn disabled_ticks_are_lost() {
    use_port!(unsafe struct Port);
    static COUNT: AtomicUsize = AtomicUsize::new(0);

    Port::attach_callback(|| {
        COUNT.fetch_add(1, Ordering::Relaxed);
    });

    pend_tick::<Port>();
    assert_eq!(COUNT.load(Ordering::Relaxed), 0);

    unsafe { Port::enable() };
    pend_tick::<Port>();
    assert_eq!(COUNT.load(Ordering::Relaxed), 1);

    unsafe { Port::disable() };
    pend_tick::<Port>();
    assert_eq!(COUNT.load(Ordering::Relaxed), 1);
}

#[test]
fn tick_is_deferred_while_locked() {
    use_port!(unsafe struct Port);
    static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
    static D1: Deadline<Port> = Deadline::new(|_, _| {});

    init_logger();
    Port::attach_callback(|| QUEUE.advance().unwrap());
    unsafe { Port::enable() };
    QUEUE.schedule(&D1, 2).unwrap();

    unsafe {
        assert!(Port::try_enter_tick_lock());
        assert!(Port::is_tick_lock_active());
        // Re-entrance fails
        assert!(!Port::try_enter_tick_lock());
    }

    // Foreground operations are refused while the lock is held
    assert_eq!(QUEUE.schedule(&D1, 1), Err(ScheduleError::BadContext));
    assert_eq!(
        ResultCode::from(QUEUE.schedule(&D1, 1)),
        ResultCode::BadContext
    );

    pend_tick::<Port>();

    // Leaving the lock delivers the deferred tick
    unsafe { Port::leave_tick_lock() };
    assert!(!Port::is_tick_lock_active());
    assert_eq!(QUEUE.tick_count().unwrap(), 1);
    assert_eq!(QUEUE.remaining_ticks(&D1).unwrap(), Some(1));
}

#[test]
fn lock_owned_by_another_thread_blocks() {
    use_port!(unsafe struct Port);
    static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
    static RELEASED: AtomicBool = AtomicBool::new(false);

    init_logger();
    let (entered_send, entered_recv) = mpsc::channel();

    let thread = thread::spawn(move || {
        unsafe { assert!(Port::try_enter_tick_lock()) };
        entered_send.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        RELEASED.store(true, Ordering::SeqCst);
        unsafe { Port::leave_tick_lock() };
    });

    entered_recv.recv().unwrap();
    // The lock is owned by the other thread, not by this one
    assert!(!Port::is_tick_lock_active());

    // Waits for the other thread to release the lock
    assert_eq!(QUEUE.peek_next_ticks().unwrap(), 0);
    assert!(RELEASED.load(Ordering::SeqCst));

    thread.join().unwrap();
}
