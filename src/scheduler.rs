//! Time-proportioning actuator scheduler.
//!
//! One instance per actuator line. Each period the task polls its handoff
//! slot (never blocking), keeps the previous duty if nothing new arrived,
//! and splits the period into an ON phase and an OFF phase.
//!
//! ```text
//!   period T:  |<── duty·T ── ON ──>|<── (1-duty)·T ── OFF ──>|
//!                                   ^                          ^
//!                          cancel checked here         and here
//! ```
//!
//! Cancellation is only honoured at phase boundaries, so shutdown latency
//! is bounded by one period. The line is driven OFF on every exit path.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal::digital::OutputPin;
use log::{debug, info};

use crate::channels::{CancelToken, Handoff};
use crate::control::{clamp_duty, ActuatorKind, DutyCycleCommand};
use crate::drivers::actuator::SharedLine;
use crate::error::{ConfigError, Result};

// ═══════════════════════════════════════════════════════════════
//  Parameters
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorParams {
    /// Time-proportioning period `T`.
    pub period: Duration,
    /// Wait before the first actuation, so the first command can arrive.
    pub grace: Duration,
}

impl ActuatorParams {
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("actuator period must be positive"));
        }
        Ok(())
    }
}

/// Split `period` into ON and OFF phases for `duty` (clamped to [0, 1]).
pub fn phases(duty: f64, period: Duration) -> (Duration, Duration) {
    let on = period.mul_f64(clamp_duty(duty));
    (on, period.saturating_sub(on))
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorStats {
    pub periods: u64,
    pub commands_taken: u64,
}

pub struct ActuatorScheduler<P> {
    line: Arc<SharedLine<P>>,
    handoff: Arc<Handoff<DutyCycleCommand>>,
    params: ActuatorParams,
    current_duty: f64,
    stats: ActuatorStats,
}

impl<P: OutputPin> ActuatorScheduler<P> {
    pub fn new(
        line: Arc<SharedLine<P>>,
        handoff: Arc<Handoff<DutyCycleCommand>>,
        params: ActuatorParams,
    ) -> Self {
        Self {
            line,
            handoff,
            params,
            current_duty: 0.0,
            stats: ActuatorStats::default(),
        }
    }

    pub fn kind(&self) -> ActuatorKind {
        self.line.kind()
    }

    /// Slot this scheduler takes commands from.
    pub fn handoff(&self) -> &Arc<Handoff<DutyCycleCommand>> {
        &self.handoff
    }

    pub fn current_duty(&self) -> f64 {
        self.current_duty
    }

    pub fn stats(&self) -> ActuatorStats {
        self.stats
    }

    /// Replace the duty if a command is pending; otherwise keep the last.
    pub fn take_pending(&mut self) -> bool {
        match self.handoff.poll() {
            Some(cmd) => {
                self.current_duty = cmd.for_actuator(self.kind());
                self.stats.commands_taken += 1;
                debug!("Actuator[{}]: duty -> {:.3}", self.kind(), self.current_duty);
                true
            }
            None => false,
        }
    }

    fn drive(&self, on: bool) -> Result<()> {
        if self.line.is_asserted() == on {
            return Ok(());
        }
        self.line.set(on)
    }

    /// Run one ON/OFF period. Returns `false` if cancelled at a boundary.
    pub fn run_period(&mut self, cancel: &CancelToken) -> Result<bool> {
        self.take_pending();
        let (on, off) = phases(self.current_duty, self.params.period);

        if !on.is_zero() {
            self.drive(true)?;
            thread::sleep(on);
        }
        if cancel.is_cancelled() {
            return Ok(false);
        }
        if !off.is_zero() {
            self.drive(false)?;
            thread::sleep(off);
        }
        self.stats.periods += 1;
        Ok(!cancel.is_cancelled())
    }

    /// Task body: grace delay, then periods until cancelled.
    pub fn run(mut self, cancel: &CancelToken) -> Result<ActuatorStats> {
        let kind = self.kind();
        self.line.set(false)?;
        info!("Actuator[{}]: grace {:?}, period {:?}", kind, self.params.grace, self.params.period);

        let mut outcome = Ok(());
        if !cancel.sleep(self.params.grace) {
            loop {
                match self.run_period(cancel) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
        }

        let off = self.line.set(false);
        info!("Actuator[{}]: stopped after {} period(s)", kind, self.stats.periods);
        outcome.and(off).map(|()| self.stats)
    }
}
