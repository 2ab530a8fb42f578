//! Filtered-error thermal control law.
//!
//! ```text
//!   error   = estimate - setpoint
//!   P       = (error >= 0 ? cool_gain : heat_gain) * error
//!   I       = integral_gain / tau * Σ history[i] * exp(-i / tau)
//!   D       = derivative_gain * derivative_time * -slope(history[0..window])
//!   scaled  = tanh(P + I + D)
//!   cool    = max(scaled, 0)
//!   heat    = heat_bias + (1 - heat_bias) * max(-scaled, 0)
//! ```
//!
//! The history is most-recent-first, so a least-squares fit against
//! `t = 0..window` runs backwards in time; its slope is negated to get
//! the forward-time rate of change.

use heapless::Vec;
use log::debug;
use serde::{Deserialize, Serialize};

use super::history::{ErrorHistory, MAX_HISTORY};
use super::DutyCycleCommand;
use crate::error::{ConfigError, Error, Result};
use crate::sampling::AveragedReading;

/// Most channels that can be averaged into the scalar estimate.
pub const MAX_ESTIMATE_CHANNELS: usize = 16;

/// Control-law tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlParams {
    /// Target temperature (°C)
    pub setpoint: f64,
    /// Proportional gain when too warm
    pub cool_gain: f64,
    /// Proportional gain when too cold
    pub heat_gain: f64,
    pub derivative_gain: f64,
    /// Derivative horizon, in windows
    pub derivative_time: f64,
    pub integral_gain: f64,
    /// Integral decay constant, in windows
    pub tau: f64,
    pub history_length: usize,
    /// Entries used for the slope fit
    pub derivative_window: usize,
    /// Heater floor duty
    pub heat_bias: f64,
    /// Channels averaged into the temperature estimate
    pub estimate_channels: Vec<usize, MAX_ESTIMATE_CHANNELS>,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            setpoint: 22.75,
            cool_gain: 1.5,
            heat_gain: 1.0,
            derivative_gain: 3.0,
            derivative_time: 3.0,
            integral_gain: 0.0,
            tau: 5.0,
            history_length: 20,
            derivative_window: 4,
            heat_bias: 0.20,
            estimate_channels: Vec::from_slice(&[5, 9]).unwrap_or_default(),
        }
    }
}

impl ControlParams {
    /// `channel_count` is the number of channels in each reading.
    pub fn validate(&self, channel_count: usize) -> core::result::Result<(), ConfigError> {
        let gains = [
            self.setpoint,
            self.cool_gain,
            self.heat_gain,
            self.derivative_gain,
            self.derivative_time,
            self.integral_gain,
        ];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid("control parameters must be finite"));
        }
        if !(self.tau.is_finite() && self.tau > 0.0) {
            return Err(ConfigError::Invalid("tau must be positive"));
        }
        if self.history_length == 0 || self.history_length > MAX_HISTORY {
            return Err(ConfigError::FieldOutOfRange {
                field: "history_length",
                value: self.history_length as u32,
                max: MAX_HISTORY as u32,
            });
        }
        if self.derivative_window < 2 || self.derivative_window > self.history_length {
            return Err(ConfigError::Invalid(
                "derivative_window must lie in 2..=history_length",
            ));
        }
        if !(0.0..=1.0).contains(&self.heat_bias) {
            return Err(ConfigError::Invalid("heat_bias must lie in [0, 1]"));
        }
        if self.estimate_channels.is_empty() {
            return Err(ConfigError::Invalid("estimate_channels must not be empty"));
        }
        if self.estimate_channels.iter().any(|&c| c >= channel_count) {
            return Err(ConfigError::Invalid("estimate channel beyond the device list"));
        }
        Ok(())
    }
}

/// Intermediate values of one update, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlTerms {
    pub estimate: f64,
    pub error: f64,
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    pub total: f64,
    pub scaled: f64,
}

/// Mutable controller state; lives as long as the controller.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub history: ErrorHistory,
    pub previous_error: f64,
    pub updates: u64,
}

/// Least-squares slope of `values` against `t = 0, 1, ..`; 0 for fewer
/// than two points.
pub fn regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / nf;
    let (mut num, mut den) = (0.0, 0.0);
    for (t, &y) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        num += dt * (y - y_mean);
        den += dt * dt;
    }
    num / den
}

pub struct ThermalController {
    params: ControlParams,
    state: ControlState,
    /// `exp(-i / tau)` for every history slot.
    weights: Vec<f64, MAX_HISTORY>,
}

impl ThermalController {
    /// `params` must have passed [`ControlParams::validate`].
    pub fn new(params: ControlParams) -> Self {
        let history = ErrorHistory::new(params.history_length);
        let weights = (0..history.depth())
            .map(|i| (-(i as f64) / params.tau).exp())
            .collect();
        Self {
            params,
            state: ControlState {
                history,
                previous_error: 0.0,
                updates: 0,
            },
            weights,
        }
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Mean of the configured estimate channels.
    pub fn estimate(&self, reading: &AveragedReading) -> Result<f64> {
        let mut sum = 0.0;
        for &ch in &self.params.estimate_channels {
            sum += reading
                .value(ch)
                .ok_or(ConfigError::Invalid("estimate channel missing from reading"))?;
        }
        Ok(sum / self.params.estimate_channels.len() as f64)
    }

    /// Run one step of the law on a scalar estimate.
    ///
    /// A non-finite estimate is refused and leaves the history untouched.
    pub fn update(&mut self, estimate: f64) -> Result<(DutyCycleCommand, ControlTerms)> {
        if !estimate.is_finite() {
            return Err(Error::OutlierRejected {
                channel: self.params.estimate_channels.first().copied().unwrap_or(0),
                value: estimate,
            });
        }
        let p = &self.params;
        let error = estimate - p.setpoint;
        let gain = if error >= 0.0 { p.cool_gain } else { p.heat_gain };
        let proportional = gain * error;

        self.state.history.push(error);

        let weighted: f64 = self
            .state
            .history
            .iter()
            .zip(self.weights.iter())
            .map(|(e, w)| e * w)
            .sum();
        let integral = p.integral_gain / p.tau * weighted;

        let mut recent: Vec<f64, MAX_HISTORY> = Vec::new();
        for e in self.state.history.iter().take(p.derivative_window) {
            let _ = recent.push(e);
        }
        let derivative = p.derivative_gain * p.derivative_time * -regression_slope(&recent);

        let total = proportional + integral + derivative;
        let scaled = total.tanh();
        let command = DutyCycleCommand::new(
            scaled.max(0.0),
            p.heat_bias + (1.0 - p.heat_bias) * (-scaled).max(0.0),
        );

        self.state.previous_error = error;
        self.state.updates += 1;

        let terms = ControlTerms {
            estimate,
            error,
            proportional,
            integral,
            derivative,
            total,
            scaled,
        };
        debug!(
            "Control: T={:.3} err={:+.3} P={:+.3} I={:+.3} D={:+.3} tot={:+.3} -> cool={:.3} heat={:.3}",
            terms.estimate,
            terms.error,
            terms.proportional,
            terms.integral,
            terms.derivative,
            terms.total,
            command.cool(),
            command.heat(),
        );
        Ok((command, terms))
    }
}
