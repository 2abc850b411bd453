//! The deadline queue
//!
//! # Pending chain
//!
//! Pending deadlines are kept in an intrusive singly linked list sorted by
//! their absolute expiration time. Each entry only stores the number of ticks
//! relative to the preceding entry (*delta encoding*):
//!
//! ```text
//!   schedule(A, 3), schedule(B, 5), schedule(C, 5), schedule(D, 9)
//!
//!   pending:  A(3) ──> B(2) ──> C(0) ──> D(4)
//!   expires:  t+3      t+5      t+5      t+9
//! ```
//!
//! This makes [`DeadlineQueue::advance`] O(1) plus the number of deadlines
//! expiring on that tick: only the head's delta is decremented, and expired
//! entries are always at the front. The cost is moved to
//! [`DeadlineQueue::schedule`], which walks the chain to find the insertion
//! point.
//!
//! The head's delta is never zero while it's pending. Entries with equal
//! expiration times are ordered by insertion (a new entry goes after the
//! existing ones), so they expire in that order.
//!
//! # Ready chain
//!
//! Expired deadlines are moved to the back of the ready chain. Their callbacks
//! are called by [`DeadlineQueue::drain_ready`] with the tick lock released,
//! so the callbacks can do anything including rescheduling themselves.
use core::fmt;

use crate::{
    deadline::{Deadline, DeadlineState},
    error::{AdvanceError, CancelError, DrainReadyError, QueryError, ScheduleError},
    klock::{lock_tick, TickLockCell, TickLockTokenRefMut},
    utils::{
        intrusive_list::{Ident, ListAccessorCell, Static, StaticListHead},
        Init,
    },
    TickSource,
};


/// A queue of [`Deadline`]s advanced by the tick.
pub struct DeadlineQueue<Traits: TickSource> {
    pending: TickLockCell<Traits, StaticListHead<Deadline<Traits>>>,

    ready: TickLockCell<Traits, StaticListHead<Deadline<Traits>>>,

    /// Incremented by every tick. Wraps around. Never compared against
    /// deadlines.
    tick_count: TickLockCell<Traits, u32>,
}

/// Get a `ListAccessorCell` used to access a deadline chain.
macro_rules! list_accessor {
    ($head:expr, $key:expr) => {
        ListAccessorCell::new($head, &Static, |deadline| &deadline.link, $key)
    };
}

/// Unwrap the result of a linked list operation. Chain operations only fail
/// when the chain is corrupted, which is a bug.
#[track_caller]
fn expect_consistent<T, E: fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(x) => x,
        Err(e) => panic!("deadline chain is corrupted: {:?}", e),
    }
}

impl<Traits: TickSource> Init for DeadlineQueue<Traits> {
    const INIT: Self = Self::new();
}

impl<Traits: TickSource> DeadlineQueue<Traits> {
    /// Construct an empty `DeadlineQueue`.
    pub const fn new() -> Self {
        Self::with_tick_count(0)
    }

    /// Construct an empty `DeadlineQueue` whose tick counter starts from
    /// `start`.
    pub const fn with_tick_count(start: u32) -> Self {
        Self {
            pending: Init::INIT,
            ready: Init::INIT,
            tick_count: TickLockCell::new(start),
        }
    }

    /// Schedule `deadline` to expire `ticks` ticks from now.
    ///
    /// Deadlines expiring on the same tick expire in the order they were
    /// scheduled. `ticks == 0` makes `deadline` ready immediately; its
    /// callback will be called by the next [`Self::drain_ready`].
    ///
    /// `deadline` must not be scheduled already. This is checked by a debug
    /// assertion; in a release build, the call is ignored and
    /// `BadObjectState` is returned.
    pub fn schedule(
        &'static self,
        deadline: &'static Deadline<Traits>,
        ticks: u32,
    ) -> Result<(), ScheduleError> {
        let mut lock = lock_tick::<Traits>()?;

        if deadline.state.get(&*lock) != DeadlineState::Unscheduled {
            debug_assert!(false, "{:p} is already scheduled", deadline);
            return Err(ScheduleError::BadObjectState);
        }

        log::trace!("schedule {:p} in {:p} after {} tick(s)", deadline, self, ticks);

        if ticks == 0 {
            self.push_ready(lock.borrow_mut(), deadline);
        } else {
            self.insert_pending(lock.borrow_mut(), deadline, ticks);
        }

        deadline.owner.replace(&mut *lock, Some(self));

        Ok(())
    }

    /// Insert `deadline` into the pending chain, `ticks` ticks from now.
    fn insert_pending(
        &self,
        mut lock: TickLockTokenRefMut<'_, Traits>,
        deadline: &'static Deadline<Traits>,
        ticks: u32,
    ) {
        debug_assert_ne!(ticks, 0);

        // Find the insertion point. `budget` is the number of ticks relative
        // to `prev` (or now if `prev` is `None`).
        let mut budget = ticks;
        let mut prev = None;
        let mut cursor = self.pending.read(&*lock).first;
        while let Some(Ident(entry)) = cursor {
            let delta = entry.delta.get(&*lock);
            if budget < delta {
                break;
            }
            budget -= delta;
            prev = cursor;
            cursor = expect_consistent(list_accessor!(&self.pending, lock.borrow_mut()).next(Ident(entry)));
        }

        // `budget < next.delta`, so this doesn't underflow
        if let Some(Ident(next)) = cursor {
            next.delta.replace_with(&mut *lock, |x| *x - budget);
        }

        deadline.delta.replace(&mut *lock, budget);
        expect_consistent(
            list_accessor!(&self.pending, lock.borrow_mut()).insert_after(Ident(deadline), prev),
        );
        deadline.state.replace(&mut *lock, DeadlineState::Pending);
    }

    /// Append `deadline` to the ready chain.
    fn push_ready(&self, mut lock: TickLockTokenRefMut<'_, Traits>, deadline: &'static Deadline<Traits>) {
        expect_consistent(list_accessor!(&self.ready, lock.borrow_mut()).push_back(Ident(deadline)));
        deadline.state.replace(&mut *lock, DeadlineState::Ready);
    }

    /// Unschedule `deadline`. Its callback won't be called unless it's
    /// scheduled again.
    ///
    /// This is no-op if `deadline` is not scheduled. It's also no-op if
    /// `deadline` is scheduled in another queue, which is checked by a debug
    /// assertion.
    pub fn cancel(&'static self, deadline: &'static Deadline<Traits>) -> Result<(), CancelError> {
        let mut lock = lock_tick::<Traits>()?;

        let state = deadline.state.get(&*lock);
        if state == DeadlineState::Unscheduled {
            return Ok(());
        }

        if !deadline.is_owned_by(self, &*lock) {
            debug_assert!(false, "{:p} is not scheduled in {:p}", deadline, self);
            return Ok(());
        }

        log::trace!("cancel {:p} ({:?}) in {:p}", deadline, state, self);

        if state == DeadlineState::Pending {
            // Give the delta to the following entry so that its absolute
            // expiration time stays the same
            let next = expect_consistent(
                list_accessor!(&self.pending, lock.borrow_mut()).next(Ident(deadline)),
            );
            if let Some(Ident(next)) = next {
                let delta = deadline.delta.get(&*lock);
                next.delta.replace_with(&mut *lock, |x| *x + delta);
            }
            expect_consistent(list_accessor!(&self.pending, lock.borrow_mut()).remove(Ident(deadline)));
        } else {
            expect_consistent(list_accessor!(&self.ready, lock.borrow_mut()).remove(Ident(deadline)));
        }

        deadline.state.replace(&mut *lock, DeadlineState::Unscheduled);
        deadline.owner.replace(&mut *lock, None);

        Ok(())
    }

    /// Advance the queue by one tick, moving every deadline that expires on
    /// this tick to the ready chain. Meant to be called by the tick handler.
    ///
    /// This doesn't call any callbacks (see [`Self::drain_ready`]).
    pub fn advance(&'static self) -> Result<(), AdvanceError> {
        let mut lock = lock_tick::<Traits>()?;
        self.advance_inner(lock.borrow_mut());
        Ok(())
    }

    fn advance_inner(&self, mut lock: TickLockTokenRefMut<'_, Traits>) {
        self.tick_count.replace_with(&mut *lock, |x| x.wrapping_add(1));

        let Some(Ident(head)) = self.pending.read(&*lock).first else {
            return;
        };

        let delta = head.delta.get(&*lock);
        debug_assert_ne!(delta, 0);
        head.delta.replace(&mut *lock, delta - 1);

        // Cascade: move every entry whose delta is zero
        while let Some(Ident(head)) = self.pending.read(&*lock).first {
            if head.delta.get(&*lock) != 0 {
                break;
            }
            expect_consistent(list_accessor!(&self.pending, lock.borrow_mut()).pop_front());
            self.push_ready(lock.borrow_mut(), head);
        }
    }

    /// Compensate for `elapsed_ticks` ticks that passed while the tick was
    /// suspended (e.g., during a deep sleep), measured by some other clock.
    ///
    /// This consumes up to `elapsed_ticks - 1` ticks from the head of the
    /// pending chain without letting it expire, and then performs one
    /// ordinary [`Self::advance`]. So at most the deadlines expiring on the
    /// next tick can become ready. If `elapsed_ticks` is greater than the
    /// number of ticks remaining until the first deadline, the excess is not
    /// applied to the rest of the chain.
    ///
    /// This is no-op if `elapsed_ticks == 0`.
    pub fn correct_for_elapsed(&'static self, elapsed_ticks: u32) -> Result<(), AdvanceError> {
        let mut lock = lock_tick::<Traits>()?;

        if elapsed_ticks == 0 {
            return Ok(());
        }

        let consumed = if let Some(Ident(head)) = self.pending.read(&*lock).first {
            let delta = head.delta.get(&*lock);
            let consumed = (delta - 1).min(elapsed_ticks - 1);
            head.delta.replace(&mut *lock, delta - consumed);
            consumed
        } else {
            0
        };

        log::debug!(
            "{:p}: correcting for {} elapsed tick(s), consumed {}",
            self,
            elapsed_ticks,
            consumed
        );

        self.tick_count
            .replace_with(&mut *lock, |x| x.wrapping_add(consumed));
        self.advance_inner(lock.borrow_mut());

        Ok(())
    }

    /// Call the callbacks of the ready deadlines in the order they became
    /// ready until the ready chain is empty. Return `true` if at least one
    /// callback was called. Must be called outside the tick handler.
    ///
    /// The tick lock is released while a callback is running. A deadline is
    /// unscheduled before its callback is called, so the callback can
    /// reschedule it. Deadlines that become ready during the call (made ready
    /// by a callback, or expired by a tick) are dispatched by the same call.
    /// A callback that always reschedules itself with zero ticks makes this
    /// method loop forever.
    ///
    /// Returns `BadContext` if called from inside a tick-locked context, such
    /// as a tick handler.
    pub fn drain_ready(&'static self) -> Result<bool, DrainReadyError> {
        let mut lock = lock_tick::<Traits>()?;
        let mut fired = false;

        loop {
            // The accessor borrows `lock`, so don't keep it in the loop
            // header
            let next = expect_consistent(list_accessor!(&self.ready, lock.borrow_mut()).pop_front());
            let Some(Ident(deadline)) = next else {
                break;
            };

            deadline.state.replace(&mut *lock, DeadlineState::Unscheduled);
            deadline.owner.replace(&mut *lock, None);

            drop(lock);

            log::trace!("dispatching {:p} from {:p}", deadline, self);
            (deadline.callback())(deadline, self);
            fired = true;

            lock = lock_tick::<Traits>()?;
        }

        Ok(fired)
    }

    /// Get the number of ticks until the first pending deadline expires.
    /// Return `0` if there are no pending deadlines.
    pub fn peek_next_ticks(&self) -> Result<u32, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(match self.pending.read(&*lock).first {
            Some(Ident(head)) => head.delta.get(&*lock),
            None => 0,
        })
    }

    /// Get the pending deadline that expires first.
    pub fn first(&self) -> Result<Option<&'static Deadline<Traits>>, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.pending.read(&*lock).first.map(|Ident(x)| x))
    }

    /// Return a flag indicating whether there are deadlines waiting to be
    /// dispatched by [`Self::drain_ready`].
    pub fn has_ready(&self) -> Result<bool, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(!self.ready.read(&*lock).is_empty())
    }

    /// Get the number of ticks until `deadline` expires.
    ///
    /// Returns `Some(0)` if `deadline` is ready and `None` if `deadline` is
    /// not scheduled in this queue.
    pub fn remaining_ticks(
        &self,
        deadline: &'static Deadline<Traits>,
    ) -> Result<Option<u32>, QueryError> {
        let mut lock = lock_tick::<Traits>()?;

        if !deadline.is_owned_by(self, &*lock) {
            return Ok(None);
        }

        match deadline.state.get(&*lock) {
            DeadlineState::Unscheduled => Ok(None),
            DeadlineState::Ready => Ok(Some(0)),
            DeadlineState::Pending => {
                let accessor = list_accessor!(&self.pending, lock.borrow_mut());
                let mut sum = 0u32;
                for entry in accessor.iter() {
                    let (Ident(entry), _) = expect_consistent(entry);
                    sum += entry.delta.get(&**accessor.cell_key());
                    if core::ptr::eq(entry, deadline) {
                        return Ok(Some(sum));
                    }
                }
                panic!("{:p} is pending but not in the pending chain", deadline);
            }
        }
    }

    /// Get the current value of the tick counter, which is incremented by
    /// [`Self::advance`] and [`Self::correct_for_elapsed`] and wraps around.
    pub fn tick_count(&self) -> Result<u32, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.tick_count.get(&*lock))
    }

    /// Call `f` with the delta of each pending deadline, from the head.
    #[doc(hidden)]
    pub fn pending_deltas(&self, mut f: impl FnMut(u32)) -> Result<(), QueryError> {
        let mut lock = lock_tick::<Traits>()?;
        let accessor = list_accessor!(&self.pending, lock.borrow_mut());
        for entry in accessor.iter() {
            let (Ident(entry), _) = expect_consistent(entry);
            f(entry.delta.get(&**accessor.cell_key()));
        }
        Ok(())
    }
}

impl<Traits: TickSource> fmt::Debug for DeadlineQueue<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        struct Deltas<'a, Traits: TickSource>(&'a DeadlineQueue<Traits>);

        impl<Traits: TickSource> fmt::Debug for Deltas<'_, Traits> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let mut list = f.debug_list();
                let _ = self.0.pending_deltas(|delta| {
                    list.entry(&delta);
                });
                list.finish()
            }
        }

        f.debug_struct("DeadlineQueue")
            .field("self", &(self as *const _))
            .field("pending", &Deltas(self))
            .field("ready", &self.ready)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}
