/// Provides the initial value of a type as an associated constant, so that
/// it can be used in `const fn` constructors of `static` objects.
pub trait Init {
    const INIT: Self;
}

impl<T> Init for Option<T> {
    const INIT: Self = None;
}

impl Init for u32 {
    const INIT: Self = 0;
}

impl Init for core::sync::atomic::AtomicU32 {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new(0);
}

impl<T: Init, I: Init> Init for tokenlock::UnsyncTokenLock<T, I> {
    const INIT: Self = Self::new(I::INIT, T::INIT);
}

impl<Tag: ?Sized> Init for tokenlock::SingletonTokenId<Tag> {
    const INIT: Self = Self::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn initial_values() {
        assert_eq!(<u32 as Init>::INIT, 0);
        assert_eq!(<Option<u8> as Init>::INIT, None);
        assert_eq!(<AtomicU32 as Init>::INIT.load(Ordering::Relaxed), 0);
    }
}
