#![doc = include_str!("./lib.md")]
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
pub mod utils;

#[cfg(test)]
#[macro_use]
mod test_port;

mod deadline;
mod duty;
mod error;
mod klock;
mod queue;
pub mod sleep;
pub mod time;

pub use self::{deadline::*, duty::*, error::*, queue::*};

/// Implemented by a port. Provides the periodic tick interrupt and the means
/// to mask it.
///
/// All methods are static. A port is usually a zero-sized marker type
/// generated by the port crate's `use_port!` macro.
///
/// # Safety
///
/// These methods are only meant to be called by this crate, except for
/// `attach_callback`, `enable`, and `disable`, which the application calls to
/// set up the tick.
///
/// The port must call the attached handler at most once per tick, never while
/// the tick lock is active, and never reentrantly.
pub unsafe trait TickSource: Sized + Send + Sync + 'static {
    /// The nominal frequency of the tick, measured in hertz.
    const TICKS_PER_SECOND: u32 = 100;

    /// Start delivering ticks to the attached handler.
    ///
    /// # Safety
    ///
    /// The caller must be prepared for the handler to be called at any point
    /// after this method returns.
    unsafe fn enable();

    /// Stop delivering ticks.
    ///
    /// # Safety
    ///
    /// Timekeeping stops. Pending deadlines won't expire until the tick is
    /// enabled again (see [`DeadlineQueue::correct_for_elapsed`]).
    unsafe fn disable();

    /// Return a flag indicating whether the tick is being delivered.
    fn is_enabled() -> bool;

    /// Register the function to be called on every tick. Replaces the
    /// previously attached handler.
    fn attach_callback(handler: fn());

    /// Mask the tick and return `true` if the tick lock is currently inactive.
    /// Return `false` otherwise and leave the state unchanged.
    ///
    /// # Safety
    ///
    /// This is only meant to be called by this crate.
    unsafe fn try_enter_tick_lock() -> bool;

    /// Unmask the tick.
    ///
    /// # Safety
    ///
    /// The tick lock must be active, and it must have been entered by this
    /// crate.
    unsafe fn leave_tick_lock();

    /// Return a flag indicating whether the tick lock is currently active.
    fn is_tick_lock_active() -> bool;
}
