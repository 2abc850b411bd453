//! Tick lock, the critical section guarding the state shared with the tick
//! handler
use core::{fmt, ops};
use tokenlock::UnsyncTokenLock;

use crate::{
    error::BadContextError,
    utils::{intrusive_list::CellLike, Init},
    TickSource,
};

pub(crate) struct TickLockTag<Traits>(Traits);

/// The key that "unlocks" [`TickLockCell`].
pub(crate) type TickLockToken<Traits> = tokenlock::UnsyncSingletonToken<TickLockTag<Traits>>;

/// The keyhole type for [`UnsyncTokenLock`] that can be "unlocked" by
/// [`TickLockToken`].
pub(crate) type TickLockKeyhole<Traits> = tokenlock::SingletonTokenId<TickLockTag<Traits>>;

/// Cell type that can be accessed by [`TickLockToken`] (which can be obtained
/// by [`lock_tick`]).
pub(crate) struct TickLockCell<Traits, T: ?Sized>(UnsyncTokenLock<T, TickLockKeyhole<Traits>>);

impl<Traits, T> TickLockCell<Traits, T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(UnsyncTokenLock::new(TickLockKeyhole::INIT, x))
    }
}

impl<Traits: TickSource, T: ?Sized> TickLockCell<Traits, T> {
    /// Return a debug formatting proxy of the cell. The given closure is used
    /// to format the borrowed contents. Note that the tick lock is active
    /// when the closure is called.
    pub(crate) fn debug_fmt_with_ref<'a, F: 'a + Fn(&T, &mut fmt::Formatter) -> fmt::Result>(
        &'a self,
        f: F,
    ) -> impl fmt::Debug + 'a {
        struct DebugFmtWithRef<'a, Traits, T: ?Sized, F> {
            cell: &'a TickLockCell<Traits, T>,
            f: F,
        }

        impl<Traits: TickSource, T: ?Sized, F: Fn(&T, &mut fmt::Formatter) -> fmt::Result>
            fmt::Debug for DebugFmtWithRef<'_, Traits, T, F>
        {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if let Ok(lock) = lock_tick::<Traits>() {
                    f.write_str("TickLockCell(")?;
                    (self.f)(self.cell.0.read(&*lock), f)?;
                    f.write_str(")")
                } else {
                    f.write_str("TickLockCell(< locked >)")
                }
            }
        }

        DebugFmtWithRef { cell: self, f }
    }
}

impl<Traits: TickSource, T: fmt::Debug> fmt::Debug for TickLockCell<Traits, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.debug_fmt_with_ref(|x, f| x.fmt(f)).fmt(f)
    }
}

impl<Traits, T: Init> Init for TickLockCell<Traits, T> {
    const INIT: Self = Self(Init::INIT);
}

impl<Traits, T> ops::Deref for TickLockCell<Traits, T> {
    type Target = UnsyncTokenLock<T, TickLockKeyhole<Traits>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a, Element: Clone, Traits: TickSource> CellLike<TickLockTokenRefMut<'a, Traits>>
    for TickLockCell<Traits, Element>
{
    type Target = Element;

    fn get(&self, key: &TickLockTokenRefMut<'a, Traits>) -> Self::Target {
        self.0.get(&**key)
    }
    fn set(&self, key: &mut TickLockTokenRefMut<'a, Traits>, value: Self::Target) {
        self.0.replace(&mut **key, value);
    }
    fn modify<T>(
        &self,
        key: &mut TickLockTokenRefMut<'a, Traits>,
        f: impl FnOnce(&mut Self::Target) -> T,
    ) -> T {
        f(self.0.write(&mut **key))
    }
}

/// Attempt to enter a tick lock state and get an RAII guard.
/// Return `BadContext` if the tick lock is already active.
pub(crate) fn lock_tick<Traits: TickSource>() -> Result<TickLockGuard<Traits>, BadContextError> {
    // Safety: `try_enter_tick_lock` is only meant to be called by this crate
    if unsafe { Traits::try_enter_tick_lock() } {
        // Safety: We just entered a tick lock state. This also means there
        //         are no instances of `TickLockGuard` existing at this point.
        Ok(unsafe { assume_tick_lock() })
    } else {
        Err(BadContextError::BadContext)
    }
}

/// Assume a tick lock state and get `TickLockGuard`.
///
/// # Safety
///
/// The system must be really in a tick lock state. There must be no instances
/// of `TickLockGuard` existing at the point of the call.
unsafe fn assume_tick_lock<Traits: TickSource>() -> TickLockGuard<Traits> {
    debug_assert!(Traits::is_tick_lock_active());

    TickLockGuard {
        // Safety: There are no other instances of `TickLockToken`; this is
        //         upheld by the caller.
        token: unsafe { TickLockToken::new_unchecked() },
    }
}

/// RAII guard for a tick lock state.
///
/// [`TickLockToken`] can be borrowed from this type.
pub(crate) struct TickLockGuard<Traits: TickSource> {
    token: TickLockToken<Traits>,
}

impl<Traits: TickSource> TickLockGuard<Traits> {
    /// Construct a [`TickLockTokenRefMut`] by borrowing `self`.
    pub(crate) fn borrow_mut(&mut self) -> TickLockTokenRefMut<'_, Traits> {
        self.token.borrow_mut()
    }
}

impl<Traits: TickSource> Drop for TickLockGuard<Traits> {
    fn drop(&mut self) {
        // Safety: The tick lock is currently active, and it's us who are
        //         currently controlling the tick lock state
        unsafe {
            Traits::leave_tick_lock();
        }
    }
}

impl<Traits: TickSource> ops::Deref for TickLockGuard<Traits> {
    type Target = TickLockToken<Traits>;
    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl<Traits: TickSource> ops::DerefMut for TickLockGuard<Traits> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}

/// Borrowed version of [`TickLockGuard`]. This is equivalent to
/// `&'a mut TickLockGuard` but does not consume memory.
///
/// When you pass `&'a mut _` to a function, the compiler automatically
/// reborrows it. This does not happen with `TickLockTokenRefMut`. You have to
/// call [`borrow_mut`] manually.
///
/// [`borrow_mut`]: tokenlock::UnsyncSingletonTokenRefMut::borrow_mut
pub(crate) type TickLockTokenRefMut<'a, Traits> =
    tokenlock::UnsyncSingletonTokenRefMut<'a, TickLockTag<Traits>>;
