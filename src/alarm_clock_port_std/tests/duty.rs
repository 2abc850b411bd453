//! Drives `DutyGroup` by simulated tick interrupts
use alarm_clock::{DutyController, DutyGroup, TickSource};
use alarm_clock_port_std::{pend_tick, use_port};
use core::convert::Infallible;
use embedded_hal::digital::v2::OutputPin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use_port!(unsafe struct Port);

struct SharedPin(&'static AtomicBool);

impl OutputPin for SharedPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.store(true, Ordering::Relaxed);
        Ok(())
    }
}

type Controller = DutyController<Port, SharedPin, 16, 4>;

static GROUP: DutyGroup<Port, SharedPin, 16, 4> = DutyGroup::new();
static DIM: Controller = Controller::new();
static BRIGHT: Controller = Controller::new();
static DIM_LEVEL: AtomicBool = AtomicBool::new(true);
static BRIGHT_LEVEL: AtomicBool = AtomicBool::new(true);
static DIM_HIGH: AtomicU32 = AtomicU32::new(0);
static BRIGHT_HIGH: AtomicU32 = AtomicU32::new(0);

fn tick() {
    GROUP.step_all().unwrap();
    for (level, high) in [(&DIM_LEVEL, &DIM_HIGH), (&BRIGHT_LEVEL, &BRIGHT_HIGH)] {
        if level.load(Ordering::Relaxed) {
            high.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[test]
fn group_driven_by_ticks() {
    let _ = env_logger::builder().is_test(true).try_init();

    Port::attach_callback(tick);
    unsafe { Port::enable() };

    GROUP.attach(&DIM, SharedPin(&DIM_LEVEL)).unwrap();
    GROUP.attach(&BRIGHT, SharedPin(&BRIGHT_LEVEL)).unwrap();
    assert_eq!(GROUP.len().unwrap(), 2);
    assert!(!DIM_LEVEL.load(Ordering::Relaxed));

    DIM.set_level(2).unwrap();
    BRIGHT.set_level(255).unwrap();
    assert_eq!(DIM.duty_ticks().unwrap(), 4);
    assert_eq!(BRIGHT.duty_ticks().unwrap(), 15);

    // Run until the end of the first period
    for _ in 0..15 {
        pend_tick::<Port>();
    }
    assert_eq!(DIM_HIGH.load(Ordering::Relaxed), 0);

    for _ in 0..16 * 4 {
        pend_tick::<Port>();
    }
    assert_eq!(DIM_HIGH.load(Ordering::Relaxed), 4 * 4);
    assert_eq!(BRIGHT_HIGH.load(Ordering::Relaxed), 4 * 15);

    let pin = GROUP.detach(&DIM).unwrap();
    assert!(pin.is_some());
    assert_eq!(GROUP.len().unwrap(), 1);
}
