//! Deadlines
use core::{fmt, ptr};

use crate::{
    error::QueryError,
    klock::{lock_tick, TickLockCell, TickLockToken},
    utils::{intrusive_list::StaticLink, Init},
    DeadlineQueue, TickSource,
};

/// The callback function of a [`Deadline`]. Receives the expired deadline and
/// the queue that dispatched it, so that it can reschedule itself.
pub type DeadlineFn<Traits> = fn(&'static Deadline<Traits>, &'static DeadlineQueue<Traits>);

/// The scheduling state of a [`Deadline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineState {
    /// Not a member of any queue.
    Unscheduled,
    /// Waiting in a queue's pending chain.
    Pending,
    /// Expired, waiting in a queue's ready chain to be dispatched by
    /// [`DeadlineQueue::drain_ready`].
    Ready,
}

impl Init for DeadlineState {
    const INIT: Self = Self::Unscheduled;
}

/// A schedulable unit carrying a relative tick count and a callback.
///
/// `Deadline` is intrusive: the link used by [`DeadlineQueue`] is embedded in
/// it, so scheduling never allocates. A deadline belongs to at most one queue
/// at a time.
pub struct Deadline<Traits: TickSource> {
    callback: DeadlineFn<Traits>,
    param: usize,

    /// Ticks relative to the preceding entry of the pending chain. Meaningless
    /// unless the state is `Pending`.
    pub(crate) delta: TickLockCell<Traits, u32>,

    pub(crate) link: TickLockCell<Traits, Option<StaticLink<Self>>>,

    pub(crate) state: TickLockCell<Traits, DeadlineState>,

    /// The queue this deadline is currently scheduled in.
    pub(crate) owner: TickLockCell<Traits, Option<&'static DeadlineQueue<Traits>>>,
}

impl<Traits: TickSource> Deadline<Traits> {
    /// Construct a `Deadline` that calls `callback` when it expires.
    pub const fn new(callback: DeadlineFn<Traits>) -> Self {
        Self::with_param(callback, 0)
    }

    /// Construct a `Deadline` carrying an arbitrary user parameter, which can
    /// be retrieved by [`Self::param`] from inside `callback`.
    pub const fn with_param(callback: DeadlineFn<Traits>, param: usize) -> Self {
        Self {
            callback,
            param,
            delta: Init::INIT,
            link: Init::INIT,
            state: Init::INIT,
            owner: Init::INIT,
        }
    }

    /// Get the user parameter specified at construction time.
    #[inline]
    pub fn param(&self) -> usize {
        self.param
    }

    /// Get the current scheduling state.
    pub fn state(&self) -> Result<DeadlineState, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.state.get(&*lock))
    }

    /// Return a flag indicating whether the deadline is a member of some queue
    /// (pending or ready).
    pub fn is_scheduled(&self) -> Result<bool, QueryError> {
        Ok(self.state()? != DeadlineState::Unscheduled)
    }

    pub(crate) fn callback(&self) -> DeadlineFn<Traits> {
        self.callback
    }

    /// Return a flag indicating whether `self` is scheduled in `queue`.
    pub(crate) fn is_owned_by(
        &self,
        queue: &DeadlineQueue<Traits>,
        lock: &TickLockToken<Traits>,
    ) -> bool {
        matches!(self.owner.get(lock), Some(owner) if ptr::eq(owner, queue))
    }
}

impl<Traits: TickSource> fmt::Debug for Deadline<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("self", &(self as *const _))
            .field("param", &self.param)
            .field("state", &self.state)
            .field("delta", &self.delta)
            .field(
                "owner",
                &self.owner.debug_fmt_with_ref(|x, f| {
                    fmt::Debug::fmt(&x.map(|q| q as *const DeadlineQueue<Traits>), f)
                }),
            )
            .finish()
    }
}
