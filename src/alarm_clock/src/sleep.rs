//! Measuring time across a sleep
//!
//! While the tick is stopped for a deep sleep, time is usually kept by a
//! narrow asynchronous counter that keeps running in the sleep mode (e.g., an
//! 8-bit timer clocked by a 32.768kHz crystal). [`AsyncCounter`] extends such
//! a counter with a software overflow count, and [`ticks_from_counts`]
//! converts the measured counts to ticks for
//! [`DeadlineQueue::correct_for_elapsed`].
//!
//! ```rust,ignore
//! static COUNTER: AsyncCounter = AsyncCounter::new();
//!
//! fn counter_overflow_handler() {
//!     COUNTER.overflow();
//! }
//!
//! unsafe { MyPort::disable() };
//! COUNTER.count(read_hw_counter(), true);
//! enter_deep_sleep();
//! let counts = COUNTER.count(read_hw_counter(), false);
//! unsafe { MyPort::enable() };
//! QUEUE.correct_for_elapsed(ticks_from_counts::<MyPort>(counts, 256))?;
//! ```
//!
//! [`DeadlineQueue::correct_for_elapsed`]: crate::DeadlineQueue::correct_for_elapsed
use core::sync::atomic::{AtomicU32, Ordering};

use crate::{utils::Init, TickSource};

/// The number of values an 8-bit hardware counter can take.
const HW_COUNTER_RANGE: u32 = 256;

/// Software extension of an 8-bit asynchronous hardware counter.
///
/// Only atomic loads and stores are used, so this works on targets without
/// atomic read-modify-write operations. [`Self::overflow`] must not preempt
/// itself.
#[derive(Debug)]
pub struct AsyncCounter {
    overflows: AtomicU32,
}

impl Init for AsyncCounter {
    const INIT: Self = Self::new();
}

impl AsyncCounter {
    pub const fn new() -> Self {
        Self {
            overflows: Init::INIT,
        }
    }

    /// Record an overflow of the hardware counter. Meant to be called by the
    /// counter's overflow interrupt handler.
    pub fn overflow(&self) {
        let x = self.overflows.load(Ordering::Relaxed);
        self.overflows.store(x.wrapping_add(1), Ordering::Relaxed);
    }

    /// Get the number of overflows recorded so far.
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Combine the recorded overflows with the current value of the hardware
    /// counter, `hw_value`.
    ///
    /// If `reset_overflows` is `true`, the overflow count is cleared first,
    /// so the result is just `hw_value`. Do this when starting a measurement.
    pub fn count(&self, hw_value: u8, reset_overflows: bool) -> u32 {
        if reset_overflows {
            self.overflows.store(0, Ordering::Relaxed);
        }
        self.overflows()
            .wrapping_mul(HW_COUNTER_RANGE)
            .wrapping_add(hw_value as u32)
    }
}

/// Convert `counts` of a counter running at `counter_hz` to ticks, rounding
/// toward zero. Saturates at `u32::MAX`.
///
/// # Panics
///
/// Panics if `counter_hz` is zero.
pub const fn ticks_from_counts<Traits: TickSource>(counts: u32, counter_hz: u32) -> u32 {
    let ticks = counts as u64 * Traits::TICKS_PER_SECOND as u64 / counter_hz as u64;
    if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Deadline, DeadlineQueue};

    test_port!(struct Port);

    #[test]
    fn count_with_overflows() {
        let counter = AsyncCounter::new();
        assert_eq!(counter.count(17, true), 17);
        counter.overflow();
        counter.overflow();
        assert_eq!(counter.overflows(), 2);
        assert_eq!(counter.count(3, false), 2 * 256 + 3);

        // Reset starts a new measurement
        assert_eq!(counter.count(40, true), 40);
        assert_eq!(counter.overflows(), 0);
    }

    #[test]
    fn counts_to_ticks() {
        assert_eq!(ticks_from_counts::<Port>(256, 256), 100);
        assert_eq!(ticks_from_counts::<Port>(640, 256), 250);
        assert_eq!(ticks_from_counts::<Port>(2, 256), 0);
        assert_eq!(ticks_from_counts::<Port>(u32::MAX, 1), u32::MAX);
    }

    #[test]
    fn correct_queue_after_sleep() {
        static QUEUE: DeadlineQueue<Port> = DeadlineQueue::new();
        static WAKE: Deadline<Port> = Deadline::new(|_, _| {});

        let counter = AsyncCounter::new();
        QUEUE.schedule(&WAKE, 300).unwrap();

        // Sleep for 2.5 seconds, measured by a 256Hz counter
        counter.count(0, true);
        for _ in 0..2 {
            counter.overflow();
        }
        let counts = counter.count(128, false);
        let ticks = ticks_from_counts::<Port>(counts, 256);
        assert_eq!(ticks, 250);

        QUEUE.correct_for_elapsed(ticks).unwrap();
        assert_eq!(QUEUE.remaining_ticks(&WAKE).unwrap(), Some(50));
    }
}
