//! Measurement task: the sampling engine and the control law as one
//! task body.
//!
//! ```text
//!  SamplePort ──▶ ┌──────────────────────────────┐ ──▶ RecordSink
//!                 │        MeasurementTask       │
//! TriggerSource ─▶│  window · estimate · law     │ ──▶ Handoff (cool)
//!                 └──────────────────────────────┘ ──▶ Handoff (heat)
//! ```
//!
//! Per window: optional trigger wait, one averaging window, a record
//! (every `record_every`-th accepted window), one control update, and a
//! blocking send to both actuator slots. Rejected windows produce no
//! update; the actuators keep their previous duty.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::channels::{CancelToken, Handoff, SendStatus};
use crate::control::law::{ControlTerms, ThermalController};
use crate::control::DutyCycleCommand;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::sampling::{SamplingEngine, WindowOutcome};

use super::ports::{RecordSink, SamplePort, TriggerSource};

/// Handoff slots shared with the two actuator tasks.
#[derive(Clone, Default)]
pub struct CommandSlots {
    pub cool: Arc<Handoff<DutyCycleCommand>>,
    pub heat: Arc<Handoff<DutyCycleCommand>>,
}

impl CommandSlots {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasurementStats {
    pub windows_accepted: u64,
    pub windows_rejected: u64,
    pub records_written: u64,
    pub commands_sent: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A command went to both actuators.
    Commanded(DutyCycleCommand, ControlTerms),
    /// Window discarded; no control update this cycle.
    Rejected(Error),
    /// Cancellation observed.
    Stopped,
}

pub struct MeasurementTask<S, R, T> {
    engine: SamplingEngine<S>,
    controller: ThermalController,
    sink: R,
    trigger: T,
    trigger_timeout: Option<Duration>,
    record_every: u32,
    slots: CommandSlots,
    stats: MeasurementStats,
}

impl<S: SamplePort, R: RecordSink, T: TriggerSource> MeasurementTask<S, R, T> {
    pub fn new(
        engine: SamplingEngine<S>,
        controller: ThermalController,
        sink: R,
        trigger: T,
        slots: CommandSlots,
    ) -> Self {
        Self {
            engine,
            controller,
            sink,
            trigger,
            trigger_timeout: None,
            record_every: 1,
            slots,
            stats: MeasurementStats::default(),
        }
    }

    /// Wait for the trigger (up to `timeout`) before every window.
    pub fn with_trigger_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.trigger_timeout = timeout;
        self
    }

    /// Record every n-th accepted window (n ≥ 1).
    pub fn with_record_every(mut self, n: u32) -> Self {
        self.record_every = n.max(1);
        self
    }

    pub fn stats(&self) -> MeasurementStats {
        self.stats
    }

    pub fn slots(&self) -> &CommandSlots {
        &self.slots
    }

    pub fn controller(&self) -> &ThermalController {
        &self.controller
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    fn send(&mut self, cmd: DutyCycleCommand, cancel: &CancelToken) -> SendStatus {
        for slot in [&self.slots.cool, &self.slots.heat] {
            if slot.send_blocking(cmd, cancel) == SendStatus::Cancelled {
                return SendStatus::Cancelled;
            }
        }
        self.stats.commands_sent += 1;
        SendStatus::Delivered
    }

    /// One window through to one command.
    pub fn step(&mut self, cancel: &CancelToken) -> Result<StepOutcome> {
        let triggered = match self.trigger_timeout {
            Some(timeout) => self.trigger.wait_for_trigger(timeout, cancel),
            None => false,
        };

        let reading = match self.engine.run_window(cancel)? {
            WindowOutcome::Ready(r) => r,
            WindowOutcome::Rejected(e) => {
                self.stats.windows_rejected += 1;
                return Ok(StepOutcome::Rejected(e));
            }
            WindowOutcome::Cancelled => return Ok(StepOutcome::Stopped),
        };

        if self.stats.windows_accepted % u64::from(self.record_every) == 0 {
            self.sink.write(&Record::now(&reading, triggered));
            self.stats.records_written += 1;
        }
        self.stats.windows_accepted += 1;

        let estimate = self.controller.estimate(&reading)?;
        let (cmd, terms) = match self.controller.update(estimate) {
            Ok(out) => out,
            Err(e) if e.is_transient() => {
                warn!("Measure: control update skipped: {}", e);
                self.stats.windows_rejected += 1;
                return Ok(StepOutcome::Rejected(e));
            }
            Err(e) => return Err(e),
        };
        info!(
            "Measure: T={:.3} err={:+.3} -> cool={:.3} heat={:.3}{}",
            terms.estimate,
            terms.error,
            cmd.cool(),
            cmd.heat(),
            if triggered { " [triggered]" } else { "" }
        );

        match self.send(cmd, cancel) {
            SendStatus::Delivered => Ok(StepOutcome::Commanded(cmd, terms)),
            SendStatus::Cancelled => Ok(StepOutcome::Stopped),
        }
    }

    /// Task body: prime the sensors, then step until cancelled.
    pub fn run(mut self, cancel: &CancelToken) -> Result<MeasurementStats> {
        match self.engine.prime() {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!("Measure: priming failed, continuing: {}", e),
            Err(e) => return Err(e),
        }
        info!("Measure: started with {} channel(s)", self.engine.source().channels().len());

        while self.step(cancel)? != StepOutcome::Stopped {}

        info!(
            "Measure: stopped after {} window(s), {} rejected",
            self.stats.windows_accepted, self.stats.windows_rejected
        );
        Ok(self.stats)
    }
}
