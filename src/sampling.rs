//! Fixed-cadence sampling and window averaging.
//!
//! ```text
//!   Idle ──▶ Sampling ──(avg_period elapsed)──▶ Averaging ──┬──▶ Ready
//!    ▲          │ tick every meas_period                    └──▶ Rejected
//!    └──────────┴────────── bus error / cancel ─────────────────────┘
//! ```
//!
//! Each tick reads every channel once through the [`SamplePort`]. Ticks
//! are scheduled on absolute deadlines (`deadline += meas_period`) so read
//! time does not accumulate as drift. A window closes once `avg_period` of
//! wall-clock time has passed since its first tick. If a tick overruns its
//! slot the schedule is re-anchored to now rather than bursting to catch
//! up. How the engine waits for a deadline is a [`WaitPolicy`]: spinning
//! gives sub-millisecond jitter at the cost of a busy core.
//!
//! [`triggered_trace`] is the one-shot counterpart: wait for a trigger
//! edge, then capture raw timestamped rows with no averaging.

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{SamplePort, TriggerSource};
use crate::channels::CancelToken;
use crate::error::{ConfigError, Error, Result};

/// How to wait for the next tick deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum WaitPolicy {
    /// Busy-wait until the deadline.
    Spin,
    /// Sleep until the deadline.
    Sleep,
    /// Sleep until `spin_margin_us` before the deadline, then spin.
    Hybrid { spin_margin_us: u64 },
}

impl WaitPolicy {
    pub fn wait_until(self, deadline: Instant) {
        match self {
            Self::Spin => spin_until(deadline),
            Self::Sleep => sleep_until(deadline),
            Self::Hybrid { spin_margin_us } => {
                if let Some(early) = deadline.checked_sub(Duration::from_micros(spin_margin_us)) {
                    sleep_until(early);
                }
                spin_until(deadline);
            }
        }
    }
}

fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        core::hint::spin_loop();
    }
}

fn sleep_until(deadline: Instant) {
    if let Some(left) = deadline.checked_duration_since(Instant::now()) {
        thread::sleep(left);
    }
}

/// Validated sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub meas_period: Duration,
    pub avg_period: Duration,
    pub wait_policy: WaitPolicy,
    pub discard_leading_ticks: u32,
}

impl SamplingParams {
    /// Ticks in one full window.
    pub fn ticks_per_window(&self) -> u32 {
        if self.meas_period.is_zero() {
            return 0;
        }
        self.avg_period
            .as_nanos()
            .div_ceil(self.meas_period.as_nanos())
            .min(u128::from(u32::MAX)) as u32
    }

    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.meas_period.is_zero() {
            return Err(ConfigError::Invalid("meas_period must be positive"));
        }
        if self.avg_period < self.meas_period {
            return Err(ConfigError::Invalid("avg_period must be at least meas_period"));
        }
        if self.discard_leading_ticks >= self.ticks_per_window() {
            return Err(ConfigError::Invalid("discard_leading_ticks leaves an empty window"));
        }
        Ok(())
    }
}

/// Per-channel window means, bias already subtracted.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedReading {
    values: Vec<f64>,
    ticks: u32,
    stale: u32,
}

impl AveragedReading {
    pub fn new(values: Vec<f64>, ticks: u32, stale: u32) -> Self {
        Self {
            values,
            ticks,
            stale,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, channel: usize) -> Option<f64> {
        self.values.get(channel).copied()
    }

    /// Ticks averaged into each value.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Samples flagged stale by their device during the window.
    pub fn stale_samples(&self) -> u32 {
        self.stale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Sampling,
    Averaging,
    Ready,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Ready(AveragedReading),
    /// Window discarded (bus error or outlier); sampling restarts.
    Rejected(Error),
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub windows_ready: u64,
    pub windows_rejected: u64,
    pub ticks: u64,
}

/// Running per-channel sums for one window.
#[derive(Debug, Clone)]
struct Accumulator {
    sums: Vec<f64>,
    ticks: u32,
    stale: u32,
}

impl Accumulator {
    fn new(channels: usize) -> Self {
        Self {
            sums: vec![0.0; channels],
            ticks: 0,
            stale: 0,
        }
    }
}

/// Turn window sums into an [`AveragedReading`]: mean, then bias, then
/// sanity bound. Any bad channel rejects the whole window.
pub fn average_window<S: SamplePort + ?Sized>(
    source: &S,
    sums: &[f64],
    ticks: u32,
    stale: u32,
) -> Result<AveragedReading> {
    if ticks == 0 {
        return Err(ConfigError::Invalid("empty averaging window").into());
    }
    let n = f64::from(ticks);
    let mut values = Vec::with_capacity(sums.len());
    for (channel, (sum, d)) in sums.iter().zip(source.channels()).enumerate() {
        let value = sum / n - d.bias();
        if !value.is_finite() || value.abs() > d.bound() {
            return Err(Error::OutlierRejected { channel, value });
        }
        values.push(value);
    }
    Ok(AveragedReading::new(values, ticks, stale))
}

pub struct SamplingEngine<S> {
    source: S,
    params: SamplingParams,
    state: EngineState,
    stats: EngineStats,
}

impl<S: SamplePort> SamplingEngine<S> {
    pub fn new(source: S, params: SamplingParams) -> Self {
        Self {
            source,
            params,
            state: EngineState::Idle,
            stats: EngineStats::default(),
        }
    }

    /// Request first conversions from pipelined sensors.
    pub fn prime(&mut self) -> Result<()> {
        self.source.prime()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn tick(&mut self, acc: &mut Accumulator, keep: bool) -> Result<()> {
        for index in 0..acc.sums.len() {
            let sample = self.source.read(index)?;
            if keep {
                acc.sums[index] += sample.value;
                acc.stale += u32::from(sample.stale);
            }
        }
        if keep {
            acc.ticks += 1;
        }
        self.stats.ticks += 1;
        Ok(())
    }

    fn reject(&mut self, e: Error) -> WindowOutcome {
        self.state = EngineState::Rejected;
        self.stats.windows_rejected += 1;
        warn!("Sampler: window discarded: {}", e);
        self.state = EngineState::Idle;
        WindowOutcome::Rejected(e)
    }

    /// Sample one full window and average it.
    ///
    /// Cancellation is checked before every tick. Transient failures come
    /// back as [`WindowOutcome::Rejected`]; anything else is an `Err`.
    pub fn run_window(&mut self, cancel: &CancelToken) -> Result<WindowOutcome> {
        self.state = EngineState::Sampling;
        let mut acc = Accumulator::new(self.source.channels().len());
        let start = Instant::now();
        let mut deadline = start;
        let mut seen = 0u32;
        let mut overran = false;

        loop {
            if cancel.is_cancelled() {
                self.state = EngineState::Idle;
                return Ok(WindowOutcome::Cancelled);
            }
            let keep = seen >= self.params.discard_leading_ticks;
            match self.tick(&mut acc, keep) {
                Ok(()) => {}
                Err(e) if e.is_transient() => return Ok(self.reject(e)),
                Err(e) => {
                    self.state = EngineState::Idle;
                    return Err(e);
                }
            }
            seen += 1;
            deadline += self.params.meas_period;
            let now = Instant::now();
            if now > deadline {
                if !overran {
                    warn!(
                        "Sampler: tick took longer than meas_period ({:?}), slipping schedule",
                        self.params.meas_period
                    );
                    overran = true;
                }
                deadline = now;
            }
            self.params.wait_policy.wait_until(deadline);
            if start.elapsed() >= self.params.avg_period {
                break;
            }
        }

        self.state = EngineState::Averaging;
        match average_window(&self.source, &acc.sums, acc.ticks, acc.stale) {
            Ok(reading) => {
                self.state = EngineState::Ready;
                self.stats.windows_ready += 1;
                if reading.stale_samples() > 0 {
                    info!(
                        "Sampler: {} stale sample(s) in window of {} tick(s)",
                        reading.stale_samples(),
                        reading.ticks()
                    );
                }
                self.state = EngineState::Idle;
                Ok(WindowOutcome::Ready(reading))
            }
            Err(e) if e.is_transient() => Ok(self.reject(e)),
            Err(e) => {
                self.state = EngineState::Idle;
                Err(e)
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Triggered trace
// ───────────────────────────────────────────────────────────────

/// When a [`triggered_trace`] stops, and how its rows are paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLimits {
    pub max_samples: Option<usize>,
    pub max_duration: Option<Duration>,
    /// Row `k` is taken no earlier than `k * interval` after the start.
    /// `None` reads back-to-back.
    pub interval: Option<Duration>,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_samples: Some(10),
            max_duration: None,
            interval: None,
        }
    }
}

impl TraceLimits {
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        let samples = self.max_samples.is_some_and(|n| n > 0);
        let duration = self.max_duration.is_some_and(|d| !d.is_zero());
        if !samples && !duration {
            return Err(ConfigError::Invalid("trace needs a sample or duration limit"));
        }
        if self.interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Invalid("trace interval must be positive"));
        }
        Ok(())
    }
}

/// One trace row: raw channel values, no bias or bound applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    /// Time since the trace started, taken before the first read.
    pub offset: Duration,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    /// `false` if the wait timed out and the trace started anyway.
    pub triggered: bool,
    pub rows: Vec<TraceRow>,
}

/// Wait up to `timeout` for a trigger edge, then read every channel of
/// `source` once per row until a limit in `limits` is reached.
///
/// Cancellation ends the trace early with the rows taken so far. Any read
/// error aborts the trace.
pub fn triggered_trace<S, T>(
    source: &mut S,
    trigger: &mut T,
    timeout: Duration,
    limits: TraceLimits,
    wait_policy: WaitPolicy,
    cancel: &CancelToken,
) -> Result<Trace>
where
    S: SamplePort + ?Sized,
    T: TriggerSource + ?Sized,
{
    limits.validate()?;
    let mut trace = Trace {
        triggered: trigger.wait_for_trigger(timeout, cancel),
        rows: Vec::new(),
    };
    if !trace.triggered {
        info!("Trace: no trigger within {:?}, starting anyway", timeout);
    }

    let channels = source.channels().len();
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if limits.max_samples.is_some_and(|n| trace.rows.len() >= n) {
            break;
        }
        let offset = start.elapsed();
        if limits.max_duration.is_some_and(|d| offset >= d) {
            break;
        }

        let mut values = Vec::with_capacity(channels);
        for index in 0..channels {
            values.push(source.read(index)?.value);
        }
        trace.rows.push(TraceRow { offset, values });

        if let Some(interval) = limits.interval {
            let k = u32::try_from(trace.rows.len()).unwrap_or(u32::MAX);
            if let Some(next) = interval.checked_mul(k).and_then(|d| start.checked_add(d)) {
                wait_policy.wait_until(next);
            }
        }
    }
    info!("Trace: {} row(s) in {:?}", trace.rows.len(), start.elapsed());
    Ok(trace)
}
