//! Task supervisor.
//!
//! Owns the cancellation signal, the two command slots, the three task
//! threads and a handle on every actuator line that must end up OFF.
//!
//! ## Lifecycle
//!
//! 1. Tasks are built against [`Supervisor::slots`]. `start()` refuses
//!    tasks wired to any other slot, forces every line OFF, then spawns
//!    `measure`, `cool` and `heat`.
//! 2. A task that returns `Err` (or panics) raises the cancellation signal,
//!    so the other tasks wind down and [`Supervisor::wait`] returns.
//! 3. `stop()` raises the signal, joins every task until the shutdown
//!    deadline, abandons whatever is still running, and then forces every
//!    line OFF regardless of how the joins went.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::app::ports::{RecordSink, SafeOff, SamplePort, TriggerSource};
use crate::app::service::{CommandSlots, MeasurementTask};
use crate::channels::CancelToken;
use crate::drivers::task::spawn_task;
use crate::error::{Error, Result};
use crate::scheduler::ActuatorScheduler;

/// How often `stop()` re-checks unfinished tasks while joining.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Outcome of [`Supervisor::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that returned `Ok`.
    pub joined: Vec<&'static str>,
    /// Tasks that returned `Err` or panicked.
    pub failed: Vec<&'static str>,
    /// Tasks still running at the deadline (detached).
    pub abandoned: Vec<&'static str>,
    pub lines_forced_off: usize,
}

impl ShutdownReport {
    /// Every task finished cleanly and every line was driven off.
    pub fn is_clean(&self, line_count: usize) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty() && self.lines_forced_off == line_count
    }
}

/// Raises the signal if the owning thread unwinds.
struct CancelOnPanic(CancelToken);

impl Drop for CancelOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

pub struct Supervisor {
    cancel: CancelToken,
    slots: CommandSlots,
    lines: Vec<Arc<dyn SafeOff>>,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(lines: Vec<Arc<dyn SafeOff>>, shutdown_timeout: Duration) -> Self {
        Self {
            cancel: CancelToken::new(),
            slots: CommandSlots::new(),
            lines,
            tasks: Vec::new(),
            shutdown_timeout,
        }
    }

    /// Shared signal; cancelling it stops every task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Handoff slots between the measurement task and the actuators.
    pub fn slots(&self) -> CommandSlots {
        self.slots.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Drive every line off; returns how many writes succeeded.
    pub fn force_all_off(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| match line.force_off() {
                Ok(()) => true,
                Err(e) => {
                    error!("Supervisor: could not force {} off: {}", line.name(), e);
                    false
                }
            })
            .count()
    }

    /// Spawn one task body. An `Err` or panic in `body` cancels everything.
    pub fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce(&CancelToken) -> Result<()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = spawn_task(name, move || {
            let _guard = CancelOnPanic(cancel.clone());
            let outcome = body(&cancel);
            if let Err(e) = &outcome {
                error!("Supervisor: task '{}' failed: {}", name, e);
                cancel.cancel();
            }
            outcome
        })?;
        self.tasks.push((name, handle));
        Ok(())
    }

    /// Force the lines off, then spawn the measurement task and both
    /// actuator tasks.
    pub fn start<S, R, T, PC, PH>(
        &mut self,
        measure: MeasurementTask<S, R, T>,
        cool: ActuatorScheduler<PC>,
        heat: ActuatorScheduler<PH>,
    ) -> Result<()>
    where
        S: SamplePort + Send + 'static,
        R: RecordSink + Send + 'static,
        T: TriggerSource + Send + 'static,
        PC: OutputPin + Send + 'static,
        PH: OutputPin + Send + 'static,
    {
        let wired = Arc::ptr_eq(&measure.slots().cool, &self.slots.cool)
            && Arc::ptr_eq(&measure.slots().heat, &self.slots.heat)
            && Arc::ptr_eq(cool.handoff(), &self.slots.cool)
            && Arc::ptr_eq(heat.handoff(), &self.slots.heat);
        if !wired {
            return Err(Error::Task("tasks are not wired to the supervisor's slots"));
        }

        let forced = self.force_all_off();
        info!("Supervisor: {} line(s) off, starting tasks", forced);

        let spawned = self
            .spawn("measure", move |cancel| measure.run(cancel).map(drop))
            .and_then(|()| self.spawn("cool", move |cancel| cool.run(cancel).map(drop)))
            .and_then(|()| self.spawn("heat", move |cancel| heat.run(cancel).map(drop)));
        if let Err(e) = spawned {
            error!("Supervisor: start failed: {}", e);
            self.cancel.cancel();
            return Err(e);
        }
        Ok(())
    }

    /// Block until cancellation is requested, by a failing task or by
    /// another holder of the token.
    pub fn wait(&self) {
        while !self.cancel.sleep(Duration::from_secs(60)) {}
    }

    /// Cancel, join within the shutdown timeout, then force every line off.
    pub fn stop(mut self) -> ShutdownReport {
        info!("Supervisor: stopping {} task(s)", self.tasks.len());
        self.cancel.cancel();

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut report = ShutdownReport::default();
        let mut pending = core::mem::take(&mut self.tasks);

        while !pending.is_empty() {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, h)| h.is_finished());
            for (name, handle) in finished {
                match handle.join() {
                    Ok(Ok(())) => report.joined.push(name),
                    Ok(Err(e)) => {
                        warn!("Supervisor: '{}' ended with error: {}", name, e);
                        report.failed.push(name);
                    }
                    Err(_) => {
                        warn!("Supervisor: '{}' panicked", name);
                        report.failed.push(name);
                    }
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        for (name, _handle) in pending {
            warn!("Supervisor: '{}' did not stop in {:?}, abandoning", name, self.shutdown_timeout);
            report.abandoned.push(name);
        }

        report.lines_forced_off = self.force_all_off();
        info!(
            "Supervisor: stopped (joined={}, failed={}, abandoned={}, lines off={}/{})",
            report.joined.len(),
            report.failed.len(),
            report.abandoned.len(),
            report.lines_forced_off,
            self.lines.len()
        );
        report
    }
}
