//! Error types
use core::{fmt, mem::transmute};

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use alarm_clock::ResultCode;
            /// assert_eq!(ResultCode::BadObjectState.as_str(), "BadObjectState");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that the operations of this crate
    /// can produce.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// The current context disallows the operation. In this crate, this
        /// always means the tick lock is already held by the caller.
        BadContext = -25,
        /// A target object is in a state that disallows the operation.
        BadObjectState = -41,
        /// The duty controller is already attached to a pin or a group.
        AlreadyAttached = -42,
        /// The output pin reported an error.
        PinFailure = -57,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident $(: $($subty:ident),* $(,)*)? {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                // Safety: `ResultCode` and `$name` has the same representation
                //         type, and the representation of `ResultCode` is a
                //         superset of `x`.
                unsafe { transmute(x) }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }

        $($(
            $subty!(impl From<_> for $name);
        )*)?

        #[allow(unused_macros)]
        macro_rules! $name {
            (impl From<_> for $dest_ty:ty) => {
                impl From<$name> for $dest_ty {
                    #[inline]
                    fn from(x: $name) -> Self {
                        match x {
                            $(
                                $name::$vname => Self::$vname,
                            )*
                        }
                    }
                }
            };
        }
    };
}

define_error! {
    mod bad_context_error {}
    /// The tick lock is already held by the current context.
    pub enum BadContextError {
        BadContext,
    }
}

define_error! {
    mod schedule_error {}
    /// Error type for [`DeadlineQueue::schedule`].
    ///
    /// [`DeadlineQueue::schedule`]: crate::DeadlineQueue::schedule
    pub enum ScheduleError: BadContextError {
        /// The tick lock is active.
        BadContext,
        /// The deadline is already scheduled.
        BadObjectState,
    }
}

define_error! {
    mod cancel_error {}
    /// Error type for [`DeadlineQueue::cancel`].
    ///
    /// [`DeadlineQueue::cancel`]: crate::DeadlineQueue::cancel
    pub enum CancelError: BadContextError {
        /// The tick lock is active.
        BadContext,
    }
}

define_error! {
    mod advance_error {}
    /// Error type for [`DeadlineQueue::advance`] and
    /// [`DeadlineQueue::correct_for_elapsed`].
    ///
    /// [`DeadlineQueue::advance`]: crate::DeadlineQueue::advance
    /// [`DeadlineQueue::correct_for_elapsed`]: crate::DeadlineQueue::correct_for_elapsed
    pub enum AdvanceError: BadContextError {
        /// The tick lock is active.
        BadContext,
    }
}

define_error! {
    mod drain_ready_error {}
    /// Error type for [`DeadlineQueue::drain_ready`].
    ///
    /// [`DeadlineQueue::drain_ready`]: crate::DeadlineQueue::drain_ready
    pub enum DrainReadyError: BadContextError {
        /// The tick lock is active. `drain_ready` was called from a tick
        /// handler or from inside another tick-locked operation.
        BadContext,
    }
}

define_error! {
    mod query_error {}
    /// Error type for the read-only queries of [`DeadlineQueue`].
    ///
    /// [`DeadlineQueue`]: crate::DeadlineQueue
    pub enum QueryError: BadContextError {
        /// The tick lock is active.
        BadContext,
    }
}

define_error! {
    mod set_level_error {}
    /// Error type for [`DutyController::set_level`].
    ///
    /// [`DutyController::set_level`]: crate::DutyController::set_level
    pub enum SetLevelError: BadContextError {
        /// The tick lock is active.
        BadContext,
    }
}

define_error! {
    mod detach_error {}
    /// Error type for [`DutyController::detach`] and [`DutyGroup::detach`].
    ///
    /// [`DutyController::detach`]: crate::DutyController::detach
    /// [`DutyGroup::detach`]: crate::DutyGroup::detach
    pub enum DetachError: BadContextError {
        /// The tick lock is active.
        BadContext,
    }
}

/// Error type for [`DutyController::attach`] and [`DutyGroup::attach`].
///
/// `E` is the error type of the output pin. The pin is dropped on failure.
///
/// [`DutyController::attach`]: crate::DutyController::attach
/// [`DutyGroup::attach`]: crate::DutyGroup::attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError<E> {
    /// The tick lock is active.
    BadContext,
    /// The controller already has a pin, or is already a member of a group.
    AlreadyAttached,
    /// The output pin couldn't be driven low.
    Pin(E),
}

impl<E> From<BadContextError> for AttachError<E> {
    #[inline]
    fn from(x: BadContextError) -> Self {
        match x {
            BadContextError::BadContext => Self::BadContext,
        }
    }
}

/// Error type for [`DutyController::step`] and [`DutyGroup::step_all`].
///
/// `E` is the error type of the output pin.
///
/// [`DutyController::step`]: crate::DutyController::step
/// [`DutyGroup::step_all`]: crate::DutyGroup::step_all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepError<E> {
    /// The tick lock is active.
    BadContext,
    /// The output pin failed to change its state.
    Pin(E),
}

impl<E> From<BadContextError> for StepError<E> {
    #[inline]
    fn from(x: BadContextError) -> Self {
        match x {
            BadContextError::BadContext => Self::BadContext,
        }
    }
}

impl<E> StepError<E> {
    /// Get the [`ResultCode`] corresponding to `self`, discarding the pin
    /// error.
    #[inline]
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::BadContext => ResultCode::BadContext,
            Self::Pin(_) => ResultCode::PinFailure,
        }
    }
}

impl<E> AttachError<E> {
    /// Get the [`ResultCode`] corresponding to `self`, discarding the pin
    /// error.
    #[inline]
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::BadContext => ResultCode::BadContext,
            Self::AlreadyAttached => ResultCode::AlreadyAttached,
            Self::Pin(_) => ResultCode::PinFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_names() {
        assert_eq!(ResultCode::BadContext.as_str(), "BadContext");
        assert_eq!(format!("{:?}", ScheduleError::BadObjectState), "BadObjectState");
        assert!(ResultCode::AlreadyAttached.is_err());
        assert!(ResultCode::Success.is_ok());
    }

    #[test]
    fn bad_context_converts() {
        assert_eq!(
            ScheduleError::from(BadContextError::BadContext),
            ScheduleError::BadContext
        );
        assert_eq!(
            StepError::<()>::from(BadContextError::BadContext),
            StepError::BadContext
        );
        assert_eq!(StepError::Pin(()).result_code(), ResultCode::PinFailure);
        assert_eq!(
            AttachError::<()>::AlreadyAttached.result_code(),
            ResultCode::AlreadyAttached
        );
    }
}
