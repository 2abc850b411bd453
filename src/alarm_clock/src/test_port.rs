//! Minimal in-crate `TickSource` implementations for unit tests
//!
//! Each test declares its own port type, so tests running in parallel don't
//! share any state. The tick lock is thread-local.

/// Define a unit struct implementing [`crate::TickSource`] for testing.
///
/// The generated type has an inherent method `tick()`, which calls the
/// attached handler if the tick is enabled and the tick lock is inactive.
macro_rules! test_port {
    ($vis:vis struct $Name:ident $(, ticks_per_second = $tps:expr)?) => {
        $vis struct $Name;

        const _: () = {
            use std::cell::Cell;

            std::thread_local! {
                static TICK_LOCK: Cell<bool> = Cell::new(false);
                static ENABLED: Cell<bool> = Cell::new(false);
                static HANDLER: Cell<Option<fn()>> = Cell::new(None);
            }

            unsafe impl $crate::TickSource for $Name {
                $( const TICKS_PER_SECOND: u32 = $tps; )?

                unsafe fn enable() {
                    ENABLED.with(|x| x.set(true));
                }

                unsafe fn disable() {
                    ENABLED.with(|x| x.set(false));
                }

                fn is_enabled() -> bool {
                    ENABLED.with(|x| x.get())
                }

                fn attach_callback(handler: fn()) {
                    HANDLER.with(|x| x.set(Some(handler)));
                }

                unsafe fn try_enter_tick_lock() -> bool {
                    TICK_LOCK.with(|x| !x.replace(true))
                }

                unsafe fn leave_tick_lock() {
                    TICK_LOCK.with(|x| {
                        assert!(x.get());
                        x.set(false);
                    });
                }

                fn is_tick_lock_active() -> bool {
                    TICK_LOCK.with(|x| x.get())
                }
            }

            impl $Name {
                #[allow(dead_code)]
                $vis fn tick() {
                    if !<Self as $crate::TickSource>::is_enabled()
                        || <Self as $crate::TickSource>::is_tick_lock_active()
                    {
                        return;
                    }
                    if let Some(handler) = HANDLER.with(|x| x.get()) {
                        handler();
                    }
                }
            }
        };
    };
}
