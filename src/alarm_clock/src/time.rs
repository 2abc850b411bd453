//! Conversion between ticks and other time units
//!
//! The results are rounded toward zero and saturate at `u32::MAX`.
//!
//! ```rust,ignore
//! use alarm_clock::time::ticks_from_millis;
//! QUEUE.schedule(&BLINK, ticks_from_millis::<MyPort>(500))?;
//! ```
use core::time::Duration;

use crate::TickSource;

const fn saturate(x: u64) -> u32 {
    if x > u32::MAX as u64 {
        u32::MAX
    } else {
        x as u32
    }
}

/// Calculate `value * TICKS_PER_SECOND / per_second`.
const fn to_ticks<Traits: TickSource>(value: u32, per_second: u64) -> u32 {
    saturate(value as u64 * Traits::TICKS_PER_SECOND as u64 / per_second)
}

/// Calculate `ticks * per_second / TICKS_PER_SECOND`.
const fn from_ticks<Traits: TickSource>(ticks: u32, per_second: u64) -> u32 {
    saturate(ticks as u64 * per_second / Traits::TICKS_PER_SECOND as u64)
}

pub const fn ticks_from_secs<Traits: TickSource>(secs: u32) -> u32 {
    to_ticks::<Traits>(secs, 1)
}

pub const fn secs_from_ticks<Traits: TickSource>(ticks: u32) -> u32 {
    from_ticks::<Traits>(ticks, 1)
}

/// Convert deciseconds (0.1s) to ticks.
pub const fn ticks_from_decis<Traits: TickSource>(decis: u32) -> u32 {
    to_ticks::<Traits>(decis, 10)
}

pub const fn decis_from_ticks<Traits: TickSource>(ticks: u32) -> u32 {
    from_ticks::<Traits>(ticks, 10)
}

/// Convert centiseconds (0.01s) to ticks.
pub const fn ticks_from_centis<Traits: TickSource>(centis: u32) -> u32 {
    to_ticks::<Traits>(centis, 100)
}

pub const fn centis_from_ticks<Traits: TickSource>(ticks: u32) -> u32 {
    from_ticks::<Traits>(ticks, 100)
}

pub const fn ticks_from_millis<Traits: TickSource>(millis: u32) -> u32 {
    to_ticks::<Traits>(millis, 1000)
}

pub const fn millis_from_ticks<Traits: TickSource>(ticks: u32) -> u32 {
    from_ticks::<Traits>(ticks, 1000)
}

/// Convert a [`Duration`] to ticks.
pub const fn ticks_from_duration<Traits: TickSource>(duration: Duration) -> u32 {
    let tps = Traits::TICKS_PER_SECOND as u64;
    let whole = duration.as_secs().saturating_mul(tps);
    let frac = duration.subsec_nanos() as u64 * tps / 1_000_000_000;
    saturate(whole.saturating_add(frac))
}

#[cfg(test)]
mod tests {
    use super::*;

    test_port!(struct Centi);
    test_port!(struct Milli, ticks_per_second = 1000);
    test_port!(struct Slow, ticks_per_second = 8);

    #[test]
    fn default_rate() {
        assert_eq!(<Centi as TickSource>::TICKS_PER_SECOND, 100);
        assert_eq!(ticks_from_secs::<Centi>(3), 300);
        assert_eq!(ticks_from_decis::<Centi>(3), 30);
        assert_eq!(ticks_from_centis::<Centi>(3), 3);
        assert_eq!(ticks_from_millis::<Centi>(35), 3);
        assert_eq!(secs_from_ticks::<Centi>(299), 2);
        assert_eq!(decis_from_ticks::<Centi>(299), 29);
        assert_eq!(centis_from_ticks::<Centi>(299), 299);
        assert_eq!(millis_from_ticks::<Centi>(299), 2990);
    }

    #[test]
    fn other_rates() {
        assert_eq!(ticks_from_millis::<Milli>(1234), 1234);
        assert_eq!(ticks_from_decis::<Milli>(2), 200);
        assert_eq!(ticks_from_millis::<Slow>(1000), 8);
        assert_eq!(ticks_from_millis::<Slow>(999), 7);
        assert_eq!(millis_from_ticks::<Slow>(3), 375);
    }

    #[test]
    fn saturation() {
        assert_eq!(ticks_from_secs::<Milli>(u32::MAX), u32::MAX);
        assert_eq!(millis_from_ticks::<Centi>(u32::MAX), u32::MAX);
        assert_eq!(
            ticks_from_duration::<Centi>(Duration::from_secs(u64::MAX)),
            u32::MAX
        );
    }

    #[test]
    fn duration() {
        assert_eq!(ticks_from_duration::<Centi>(Duration::from_millis(1234)), 123);
        assert_eq!(ticks_from_duration::<Slow>(Duration::from_millis(1250)), 10);
        assert_eq!(ticks_from_duration::<Milli>(Duration::ZERO), 0);
    }

    #[test]
    fn usable_in_const() {
        const TIMEOUT: u32 = ticks_from_secs::<Centi>(5);
        assert_eq!(TIMEOUT, 500);
    }
}
