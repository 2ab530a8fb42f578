//! Actuator output line driver.
//!
//! Active-high digital output (relay / SSR / valve driver) shared between
//! the actuator task that time-proportions it and the supervisor that
//! must be able to force it off from another thread at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::SafeOff;
use crate::control::ActuatorKind;
use crate::error::{ActuatorError, Result};

pub struct SharedLine<P> {
    kind: ActuatorKind,
    pin: Mutex<P>,
    asserted: AtomicBool,
}

impl<P: OutputPin> SharedLine<P> {
    pub fn new(kind: ActuatorKind, pin: P) -> Self {
        Self {
            kind,
            pin: Mutex::new(pin),
            asserted: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> ActuatorKind {
        self.kind
    }

    /// Drive the line; `true` = actuator on.
    pub fn set(&self, on: bool) -> Result<()> {
        let mut pin = self.pin.lock().map_err(|_| ActuatorError::LinePoisoned)?;
        let res = if on { pin.set_high() } else { pin.set_low() };
        if res.is_err() {
            warn!("Actuator: {} line write failed", self.kind);
            return Err(ActuatorError::GpioWriteFailed.into());
        }
        self.asserted.store(on, Ordering::Release);
        Ok(())
    }

    /// Last level successfully written.
    pub fn is_asserted(&self) -> bool {
        self.asserted.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> Option<P> {
        self.pin.into_inner().ok()
    }
}

impl<P: OutputPin + Send> SafeOff for SharedLine<P> {
    fn force_off(&self) -> Result<()> {
        // A poisoned lock still guards a usable pin; off must always be tried.
        let mut pin = self
            .pin
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pin.set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.asserted.store(false, Ordering::Release);
        info!("Actuator: {} line forced off", self.kind);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct FakePin {
        high: bool,
        writes: u32,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> core::result::Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> core::result::Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn set_tracks_level() {
        let line = SharedLine::new(ActuatorKind::Cool, FakePin::default());
        line.set(true).unwrap();
        assert!(line.is_asserted());
        line.set(false).unwrap();
        assert!(!line.is_asserted());
        assert_eq!(line.into_inner().unwrap().writes, 2);
    }

    #[test]
    fn force_off_from_another_thread() {
        let line = std::sync::Arc::new(SharedLine::new(ActuatorKind::Heat, FakePin::default()));
        line.set(true).unwrap();
        let l2 = line.clone();
        std::thread::spawn(move || l2.force_off().unwrap()).join().unwrap();
        assert!(!line.is_asserted());
        assert_eq!(line.name(), "heat");
    }
}
