//! Edge-detecting trigger input.
//!
//! ## Hardware
//!
//! Active-high digital input from an external instrument. A window may
//! start on a rising edge; the input is sampled every `poll_interval`
//! until the edge arrives or the timeout runs out.
//!
//! A line that is already high when the wait begins does not count: the
//! driver needs to see it low first. Cancellation is checked on every
//! poll, so a long timeout never holds up shutdown.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::InputPin;
use log::warn;

use crate::app::ports::TriggerSource;
use crate::channels::CancelToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct EdgeTrigger<P> {
    pin: P,
    poll_interval: Duration,
    /// Suppresses repeated read-failure warnings.
    read_failed: bool,
}

impl<P: InputPin> EdgeTrigger<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_failed: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn level(&mut self) -> Option<bool> {
        match self.pin.is_high() {
            Ok(high) => {
                self.read_failed = false;
                Some(high)
            }
            Err(_) => {
                if !self.read_failed {
                    warn!("Trigger: input read failed");
                    self.read_failed = true;
                }
                None
            }
        }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: InputPin> TriggerSource for EdgeTrigger<P> {
    fn wait_for_trigger(&mut self, timeout: Duration, cancel: &CancelToken) -> bool {
        // `None`: the timeout is too large to represent, wait indefinitely
        let deadline = Instant::now().checked_add(timeout);
        let mut was_low = false;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match self.level() {
                Some(false) => was_low = true,
                Some(true) if was_low => return true,
                _ => {}
            }
            let now = Instant::now();
            let nap = match deadline {
                Some(d) if now >= d => return false,
                Some(d) => self.poll_interval.min(d - now),
                None => self.poll_interval,
            };
            thread::sleep(nap);
        }
    }
}
