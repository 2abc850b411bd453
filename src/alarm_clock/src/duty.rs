//! Soft PWM with a logarithmic brightness curve
//!
//! A [`DutyController`] divides time into periods of `PERIOD` ticks. The
//! output pin is driven high at the start of a period (unless the duty is
//! zero) and low after `duty_ticks` ticks:
//!
//! ```text
//!            ┌──────┐               ┌──────┐
//!   pin   ───┘      └───────────────┘      └────────
//!   phase    0    duty_ticks    PERIOD-1   0
//! ```
//!
//! The duty is derived from an 8-bit level by `round(PERIOD ^ (level /
//! STEPS))` so that equal steps of the level look like equal steps of
//! brightness. With the default parameters, levels `STEPS` and above are
//! fully saturated.
use core::fmt;
use embedded_hal::digital::v2::OutputPin;
use num_traits::float::Float;

use crate::{
    error::{AttachError, DetachError, QueryError, SetLevelError, StepError},
    klock::{lock_tick, TickLockCell, TickLockTokenRefMut},
    utils::{
        intrusive_list::{Ident, ItemError, ListAccessorCell, Static, StaticLink, StaticListHead},
        Init,
    },
    TickSource,
};

/// A soft PWM channel driving one output pin.
///
/// `PERIOD` is the length of a PWM period in ticks. `STEPS` is the number of
/// brightness steps between off and fully on.
pub struct DutyController<
    Traits: TickSource,
    Pin: 'static,
    const PERIOD: u32 = 2048,
    const STEPS: u32 = 100,
> {
    /// The number of ticks the pin stays high in a period. Always less than
    /// `PERIOD`.
    duty_ticks: TickLockCell<Traits, u32>,

    /// Always less than `PERIOD`.
    phase: TickLockCell<Traits, u32>,

    pin: TickLockCell<Traits, Option<Pin>>,

    /// Link in a [`DutyGroup`].
    link: TickLockCell<Traits, Option<StaticLink<Self>>>,
}

impl<Traits: TickSource, Pin: 'static, const PERIOD: u32, const STEPS: u32>
    DutyController<Traits, Pin, PERIOD, STEPS>
{
    const VALID_PARAMETERS: () = {
        assert!(PERIOD >= 2, "`PERIOD` must be at least 2");
        assert!(STEPS >= 1, "`STEPS` must be at least 1");
    };

    /// Construct a `DutyController` with no pin attached and zero duty.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_PARAMETERS;

        Self {
            duty_ticks: Init::INIT,
            phase: Init::INIT,
            pin: TickLockCell::new(None),
            link: Init::INIT,
        }
    }

    /// Calculate the duty for `level`.
    ///
    /// The result is `0` for `level == 0`, non-decreasing in `level`, and
    /// never exceeds `PERIOD - 1`.
    pub fn duty_ticks_for_level(level: u8) -> u32 {
        if level == 0 {
            return 0;
        }

        // `2 ^ (level / r)` where `r = STEPS * log10(2) / log10(PERIOD)`
        let r = STEPS as f32 * core::f32::consts::LOG10_2 / Float::log10(PERIOD as f32);
        let duty = Float::round(Float::powf(2.0f32, level as f32 / r));

        let max = PERIOD - 1;
        if duty >= max as f32 {
            max
        } else {
            duty as u32
        }
    }

    /// Set the brightness level. Takes effect from the next period.
    pub fn set_level(&self, level: u8) -> Result<(), SetLevelError> {
        let duty_ticks = Self::duty_ticks_for_level(level);
        let mut lock = lock_tick::<Traits>()?;
        self.duty_ticks.replace(&mut *lock, duty_ticks);
        Ok(())
    }

    /// Get the current duty, measured in ticks.
    pub fn duty_ticks(&self) -> Result<u32, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.duty_ticks.get(&*lock))
    }

    /// Get the position in the current period.
    pub fn phase(&self) -> Result<u32, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.phase.get(&*lock))
    }

    /// Release the pin. Returns `None` if no pin is attached.
    ///
    /// The pin keeps its last state. `self` stays a member of its
    /// [`DutyGroup`], if any, but [`Self::step`] won't drive anything.
    pub fn detach(&self) -> Result<Option<Pin>, DetachError> {
        let mut lock = lock_tick::<Traits>()?;
        Ok(self.pin.write(&mut *lock).take())
    }
}

impl<Traits: TickSource, Pin: OutputPin + 'static, const PERIOD: u32, const STEPS: u32>
    DutyController<Traits, Pin, PERIOD, STEPS>
{
    /// Attach an output pin. The pin is driven low, and a new period starts.
    pub fn attach(&self, pin: Pin) -> Result<(), AttachError<Pin::Error>> {
        let mut lock = lock_tick::<Traits>()?;
        self.attach_inner(lock.borrow_mut(), pin)
    }

    fn attach_inner(
        &self,
        mut lock: TickLockTokenRefMut<'_, Traits>,
        mut pin: Pin,
    ) -> Result<(), AttachError<Pin::Error>> {
        if self.pin.read(&*lock).is_some() {
            return Err(AttachError::AlreadyAttached);
        }

        pin.set_low().map_err(AttachError::Pin)?;
        self.pin.replace(&mut *lock, Some(pin));
        self.phase.replace(&mut *lock, 0);
        Ok(())
    }

    /// Advance by one tick. Meant to be called by the tick handler.
    pub fn step(&self) -> Result<(), StepError<Pin::Error>> {
        let mut lock = lock_tick::<Traits>()?;
        self.step_inner(lock.borrow_mut()).map_err(StepError::Pin)
    }

    fn step_inner(&self, mut lock: TickLockTokenRefMut<'_, Traits>) -> Result<(), Pin::Error> {
        let duty_ticks = self.duty_ticks.get(&*lock);
        let phase = self.phase.get(&*lock) + 1;

        if phase == PERIOD {
            // Start a new period
            self.phase.replace(&mut *lock, 0);
            if let Some(pin) = self.pin.write(&mut *lock) {
                if duty_ticks > 0 {
                    pin.set_high()?;
                } else {
                    pin.set_low()?;
                }
            }
        } else {
            self.phase.replace(&mut *lock, phase);
            if phase == duty_ticks {
                if let Some(pin) = self.pin.write(&mut *lock) {
                    pin.set_low()?;
                }
            }
        }

        Ok(())
    }
}

impl<Traits: TickSource, Pin: 'static, const PERIOD: u32, const STEPS: u32> Init
    for DutyController<Traits, Pin, PERIOD, STEPS>
{
    const INIT: Self = Self::new();
}

impl<Traits: TickSource, Pin: 'static, const PERIOD: u32, const STEPS: u32> fmt::Debug
    for DutyController<Traits, Pin, PERIOD, STEPS>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DutyController")
            .field("self", &(self as *const _))
            .field("duty_ticks", &self.duty_ticks)
            .field("phase", &self.phase)
            .field(
                "pin",
                &self.pin.debug_fmt_with_ref(|x, f| {
                    f.write_str(if x.is_some() { "Some(_)" } else { "None" })
                }),
            )
            .finish()
    }
}

/// A set of [`DutyController`]s stepped together by [`Self::step_all`].
pub struct DutyGroup<
    Traits: TickSource,
    Pin: 'static,
    const PERIOD: u32 = 2048,
    const STEPS: u32 = 100,
> {
    members: TickLockCell<Traits, StaticListHead<DutyController<Traits, Pin, PERIOD, STEPS>>>,
}

/// Get a `ListAccessorCell` used to access a group's member chain.
macro_rules! list_accessor {
    ($head:expr, $key:expr) => {
        ListAccessorCell::new($head, &Static, |controller| &controller.link, $key)
    };
}

impl<Traits: TickSource, Pin: 'static, const PERIOD: u32, const STEPS: u32> Init
    for DutyGroup<Traits, Pin, PERIOD, STEPS>
{
    const INIT: Self = Self::new();
}

impl<Traits: TickSource, Pin: 'static, const PERIOD: u32, const STEPS: u32>
    DutyGroup<Traits, Pin, PERIOD, STEPS>
{
    /// Construct an empty `DutyGroup`.
    pub const fn new() -> Self {
        Self {
            members: Init::INIT,
        }
    }

    /// Remove `controller` from the group and release its pin.
    ///
    /// Only the pin is released if `controller` is not a member of this
    /// group.
    pub fn detach(
        &self,
        controller: &'static DutyController<Traits, Pin, PERIOD, STEPS>,
    ) -> Result<Option<Pin>, DetachError> {
        let mut lock = lock_tick::<Traits>()?;

        match list_accessor!(&self.members, lock.borrow_mut()).remove(Ident(controller)) {
            // Not ours
            Ok(_) | Err(ItemError::NotLinked) => {}
            Err(e @ ItemError::Inconsistent(_)) => panic!("duty group is corrupted: {:?}", e),
        }

        Ok(controller.pin.write(&mut *lock).take())
    }

    /// Get the number of the members.
    pub fn len(&self) -> Result<usize, QueryError> {
        let mut lock = lock_tick::<Traits>()?;
        Ok(list_accessor!(&self.members, lock.borrow_mut()).iter().count())
    }

    /// Return a flag indicating whether the group has no members.
    pub fn is_empty(&self) -> Result<bool, QueryError> {
        let lock = lock_tick::<Traits>()?;
        Ok(self.members.read(&*lock).is_empty())
    }
}

impl<Traits: TickSource, Pin: OutputPin + 'static, const PERIOD: u32, const STEPS: u32>
    DutyGroup<Traits, Pin, PERIOD, STEPS>
{
    /// Attach `pin` to `controller` (see [`DutyController::attach`]) and add
    /// `controller` to the group.
    pub fn attach(
        &self,
        controller: &'static DutyController<Traits, Pin, PERIOD, STEPS>,
        pin: Pin,
    ) -> Result<(), AttachError<Pin::Error>> {
        let mut lock = lock_tick::<Traits>()?;

        if controller.link.read(&*lock).is_some() {
            return Err(AttachError::AlreadyAttached);
        }

        controller.attach_inner(lock.borrow_mut(), pin)?;

        list_accessor!(&self.members, lock.borrow_mut())
            .push_back(Ident(controller))
            .unwrap_or_else(|e| panic!("duty group is corrupted: {:?}", e));

        Ok(())
    }

    /// Step every member by one tick. Meant to be called by the tick handler.
    ///
    /// All members are stepped even if some of their pins fail. The first
    /// failure is reported.
    pub fn step_all(&self) -> Result<(), StepError<Pin::Error>> {
        let mut lock = lock_tick::<Traits>()?;
        let mut result = Ok(());

        let mut cursor = self.members.read(&*lock).first;
        while let Some(Ident(controller)) = cursor {
            if let Err(e) = controller.step_inner(lock.borrow_mut()) {
                if result.is_ok() {
                    result = Err(StepError::Pin(e));
                }
            }
            cursor = controller.link.read(&*lock).as_ref().and_then(|link| link.next);
        }

        result
    }
}
