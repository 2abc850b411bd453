#![doc = include_str!("./lib.md")]
#![deny(unsafe_op_in_unsafe_fn)]
use alarm_clock::{time::ticks_from_duration, TickSource};
use spin::Mutex as SpinMutex;
use std::{
    marker::PhantomData,
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

/// Used by `use_port!`
#[doc(hidden)]
pub extern crate alarm_clock;

/// Implemented on a port type by [`use_port!`].
///
/// # Safety
///
/// Only meant to be implemented by [`use_port!`].
#[doc(hidden)]
pub unsafe trait PortInstance: TickSource {
    fn port_state() -> &'static State;
}

/// The internal state of the port.
#[doc(hidden)]
pub struct State {
    /// The thread currently owning the tick lock.
    tick_lock_owner: SpinMutex<Option<thread::ThreadId>>,
    /// A tick was pended by the tick lock's owner.
    tick_pended: AtomicBool,
    enabled: AtomicBool,
    handler: SpinMutex<Option<fn()>>,
    timer: SpinMutex<Option<Timer>>,
}

struct Timer {
    /// Dropping this stops the timer thread.
    stop_send: mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl State {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            tick_lock_owner: SpinMutex::new(None),
            tick_pended: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            handler: SpinMutex::new(None),
            timer: SpinMutex::new(None),
        }
    }

    pub fn enable(&self) {
        log::trace!("enable");
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        log::trace!("disable");
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn attach_callback(&self, handler: fn()) {
        log::trace!("attach_callback({:p})", handler);
        *self.handler.lock() = Some(handler);
    }

    pub fn try_enter_tick_lock(&self) -> bool {
        let current = thread::current().id();
        loop {
            let mut owner = self.tick_lock_owner.lock();
            match *owner {
                None => {
                    *owner = Some(current);
                    return true;
                }
                Some(thread_id) if thread_id == current => return false,
                Some(_) => {}
            }
            drop(owner);
            thread::yield_now();
        }
    }

    pub fn leave_tick_lock(&self) {
        let mut owner = self.tick_lock_owner.lock();
        assert_eq!(
            *owner,
            Some(thread::current().id()),
            "the tick lock is not owned by the current thread"
        );
        *owner = None;
        drop(owner);

        if self.tick_pended.swap(false, Ordering::SeqCst) {
            log::trace!("delivering a deferred tick");
            self.pend_tick();
        }
    }

    pub fn is_tick_lock_active(&self) -> bool {
        *self.tick_lock_owner.lock() == Some(thread::current().id())
    }

    pub fn pend_tick(&self) {
        if !self.is_enabled() {
            log::trace!("pend_tick: the tick is disabled, ignoring");
            return;
        }

        if self.is_tick_lock_active() {
            log::trace!("pend_tick: deferred until the tick lock is released");
            self.tick_pended.store(true, Ordering::SeqCst);
            return;
        }

        // Don't hold `self.handler` while the handler is running
        let handler = *self.handler.lock();
        if let Some(handler) = handler {
            handler();
        } else {
            log::trace!("pend_tick: no handler attached");
        }
    }

    pub fn start_timer<Traits: PortInstance>(&'static self) -> std::io::Result<()> {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(());
        }

        let period = Duration::from_secs(1) / Traits::TICKS_PER_SECOND;
        let (stop_send, stop_recv) = mpsc::channel::<()>();

        log::debug!("starting the timer thread (period = {:?})", period);

        let thread = thread::Builder::new()
            .name("tick timer".to_owned())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    let timeout = next.saturating_duration_since(Instant::now());
                    match stop_recv.recv_timeout(timeout) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                    self.pend_tick();
                    next += period;
                }
                log::debug!("the timer thread is exiting");
            })?;

        *timer = Some(Timer { stop_send, thread });
        Ok(())
    }

    pub fn stop_timer(&self) {
        let timer = if let Some(timer) = self.timer.lock().take() {
            timer
        } else {
            return;
        };

        drop(timer.stop_send);

        if timer.thread.thread().id() == thread::current().id() {
            // Called by the handler. The thread will exit on its own.
            return;
        }

        if let Err(e) = timer.thread.join() {
            // The handler panicked
            panic::resume_unwind(e);
        }
    }
}

/// Deliver a tick to `Traits`'s handler on the calling thread.
///
/// The tick is discarded if the tick is disabled. If the calling thread owns
/// the tick lock, the delivery is deferred until it leaves the lock.
pub fn pend_tick<Traits: PortInstance>() {
    Traits::port_state().pend_tick();
}

/// Start a background thread delivering ticks at the rate of
/// `Traits::TICKS_PER_SECOND`. Does nothing if the timer is already running.
pub fn start_timer<Traits: PortInstance>() -> std::io::Result<()> {
    Traits::port_state().start_timer::<Traits>()
}

/// Stop the timer thread started by [`start_timer`] and wait for it to exit.
///
/// If the handler panicked on the timer thread, the panic is propagated to
/// the caller.
pub fn stop_timer<Traits: PortInstance>() {
    Traits::port_state().stop_timer();
}

/// Simulate entering a deep sleep mode. The tick is disabled until the
/// returned [`SleepToken`] is woken up.
pub fn enter_sleep<Traits: PortInstance>() -> SleepToken<Traits> {
    let state = Traits::port_state();
    let was_enabled = state.is_enabled();
    state.disable();
    log::debug!("entering sleep");

    SleepToken {
        start: Instant::now(),
        was_enabled,
        _phantom: PhantomData,
    }
}

/// Represents a simulated sleep started by [`enter_sleep`].
#[must_use = "call `wake` to restore the tick"]
#[derive(Debug)]
pub struct SleepToken<Traits> {
    start: Instant,
    was_enabled: bool,
    _phantom: PhantomData<fn() -> Traits>,
}

impl<Traits: PortInstance> SleepToken<Traits> {
    /// Leave the sleep mode. Returns the number of whole ticks that have
    /// elapsed since [`enter_sleep`], to be passed to
    /// [`DeadlineQueue::correct_for_elapsed`].
    ///
    /// The tick is re-enabled if it was enabled before the sleep.
    ///
    /// [`DeadlineQueue::correct_for_elapsed`]: alarm_clock::DeadlineQueue::correct_for_elapsed
    pub fn wake(self) -> u32 {
        let elapsed = self.start.elapsed();
        let ticks = ticks_from_duration::<Traits>(elapsed);
        log::debug!("woke up after {:?} ({} ticks)", elapsed, ticks);

        if self.was_enabled {
            Traits::port_state().enable();
        }
        ticks
    }
}

/// Define a type implementing [`alarm_clock::TickSource`] backed by the
/// simulator.
///
/// The tick rate can be specified by `ticks_per_second = ...`. The default
/// is [`alarm_clock::TickSource::TICKS_PER_SECOND`].
///
/// # Safety
///
/// Every use defines a separate port instance. Don't use the same port type
/// from more than one test running in parallel.
#[macro_export]
macro_rules! use_port {
    (unsafe $vis:vis struct $Name:ident $(, ticks_per_second = $tps:expr)?) => {
        $vis struct $Name;

        const _: () = {
            use $crate::{alarm_clock::TickSource, PortInstance, State};

            static PORT_STATE: State = State::new();

            unsafe impl PortInstance for $Name {
                #[inline]
                fn port_state() -> &'static State {
                    &PORT_STATE
                }
            }

            unsafe impl TickSource for $Name {
                $( const TICKS_PER_SECOND: u32 = $tps; )?

                unsafe fn enable() {
                    PORT_STATE.enable()
                }

                unsafe fn disable() {
                    PORT_STATE.disable()
                }

                fn is_enabled() -> bool {
                    PORT_STATE.is_enabled()
                }

                fn attach_callback(handler: fn()) {
                    PORT_STATE.attach_callback(handler)
                }

                unsafe fn try_enter_tick_lock() -> bool {
                    PORT_STATE.try_enter_tick_lock()
                }

                unsafe fn leave_tick_lock() {
                    PORT_STATE.leave_tick_lock()
                }

                fn is_tick_lock_active() -> bool {
                    PORT_STATE.is_tick_lock_active()
                }
            }
        };
    };
}
