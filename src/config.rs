//! System configuration parameters
//!
//! Every tunable for the regulator, loaded once (defaults or JSON),
//! validated once by [`SystemConfig::validate`], and then handed to the
//! tasks as immutable runtime values. Unknown keys are rejected at
//! deserialization.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::law::ControlParams;
use crate::error::{ConfigError, Result};
use crate::protocol::ads1x15::{self, AddrStrap};
use crate::protocol::hih8121::Calibration;
use crate::protocol::tca954x::MuxFamily;
use crate::sampling::{SamplingParams, TraceLimits, WaitPolicy};
use crate::scheduler::ActuatorParams;
use crate::sensors::descriptor::{DeviceDescriptor, Quantity};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub sampling: SamplingConfig,
    pub control: ControlParams,
    pub actuators: ActuatorConfig,
    pub multiplexer: MultiplexerConfig,
    pub trigger: TriggerConfig,
    pub trace: TraceConfig,
    pub hardware: HardwareConfig,
    /// One entry per logged channel, in record order.
    pub devices: Vec<DeviceSpec>,
    /// Write a record every n-th accepted window.
    pub record_every: u32,
    /// Bound on joining the tasks at shutdown (milliseconds)
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Tick period (milliseconds)
    pub meas_period_ms: u64,
    /// Averaging window (milliseconds)
    pub avg_period_ms: u64,
    /// Pause after each device read (milliseconds)
    pub settle_delay_ms: u64,
    pub wait_policy: WaitPolicy,
    /// Ticks dropped at the start of every window
    pub discard_leading_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuatorConfig {
    /// Time-proportioning period (milliseconds)
    pub period_ms: u64,
    /// Delay before the first actuation (milliseconds)
    pub grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiplexerConfig {
    /// `None` for a bus without a switch chip.
    pub family: Option<MuxFamily>,
    pub address: u8,
    /// Read the mask back after every write.
    pub verify_selection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    /// Wait for a rising edge before each window.
    pub enabled: bool,
    /// Give up waiting after this long (milliseconds)
    pub timeout_ms: u64,
}

/// One-shot triggered capture (`thermolog trace`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    pub max_samples: Option<usize>,
    /// Stop after this long (milliseconds)
    pub max_duration_ms: Option<u64>,
    /// Pace rows this far apart (milliseconds); back-to-back if unset.
    pub interval_ms: Option<u64>,
}

/// Host wiring; only read by the Linux binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    pub i2c_bus: String,
    pub gpio_chip: String,
    pub cool_line: u32,
    pub heat_line: u32,
    pub trigger_line: Option<u32>,
}

/// Serialized form of one [`DeviceDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DeviceSpec {
    Adc {
        #[serde(default)]
        label: Option<String>,
        strap: AddrStrap,
        /// Input-mux code (0b100..=0b111 for single-ended AIN0..AIN3)
        input: u8,
        #[serde(default = "default_gain")]
        gain: u8,
        #[serde(default = "default_rate")]
        rate: u8,
        #[serde(default = "default_mode")]
        mode: u8,
        #[serde(default)]
        bias: f64,
        #[serde(default)]
        bound: Option<f64>,
    },
    Humidity {
        #[serde(default)]
        label: Option<String>,
        quantity: Quantity,
        #[serde(default)]
        mux_channel: Option<u8>,
        #[serde(default)]
        calibration: Option<Calibration>,
        #[serde(default)]
        bound: Option<f64>,
    },
}

fn default_gain() -> u8 {
    ads1x15::DEFAULT_GAIN
}

fn default_rate() -> u8 {
    ads1x15::DEFAULT_RATE
}

fn default_mode() -> u8 {
    ads1x15::MODE_SINGLE_SHOT
}

impl DeviceSpec {
    pub fn build(&self) -> core::result::Result<DeviceDescriptor, ConfigError> {
        match self {
            Self::Adc {
                label,
                strap,
                input,
                gain,
                rate,
                mode,
                bias,
                bound,
            } => {
                let mut b = DeviceDescriptor::adc(*strap, *input)
                    .adc_settings(*gain, *rate, *mode)
                    .bias(*bias);
                if let Some(l) = label {
                    b = b.label(l);
                }
                if let Some(bound) = bound {
                    b = b.bound(*bound);
                }
                b.build()
            }
            Self::Humidity {
                label,
                quantity,
                mux_channel,
                calibration,
                bound,
            } => {
                let mut b = DeviceDescriptor::humidity(*quantity);
                if let Some(l) = label {
                    b = b.label(l);
                }
                if let Some(ch) = mux_channel {
                    b = b.mux_channel(*ch);
                }
                if let Some(c) = calibration {
                    b = b.calibration(*c);
                }
                if let Some(bound) = bound {
                    b = b.bound(*bound);
                }
                b.build()
            }
        }
    }
}

/// Channels of the reference enclosure: four bipolar ADC inputs, then
/// humidity/temperature pairs from six sensors behind the switch.
pub const DEFAULT_HIH_CHANNELS: [u8; 6] = [1, 2, 3, 4, 5, 7];
const DEFAULT_ADC_BIAS: f64 = 1.72;

fn default_devices() -> Vec<DeviceSpec> {
    let mut devices: Vec<DeviceSpec> = (0..4)
        .map(|i| DeviceSpec::Adc {
            label: Some(format!("qpd{i}")),
            strap: AddrStrap::Gnd,
            input: ads1x15::MUX_SINGLE_AIN0 + i,
            gain: default_gain(),
            rate: default_rate(),
            mode: default_mode(),
            bias: DEFAULT_ADC_BIAS,
            bound: None,
        })
        .collect();
    for ch in DEFAULT_HIH_CHANNELS {
        for quantity in [Quantity::Humidity, Quantity::Temperature] {
            devices.push(DeviceSpec::Humidity {
                label: None,
                quantity,
                mux_channel: Some(ch),
                calibration: None,
                bound: None,
            });
        }
    }
    devices
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            control: ControlParams::default(),
            actuators: ActuatorConfig::default(),
            multiplexer: MultiplexerConfig::default(),
            trigger: TriggerConfig::default(),
            trace: TraceConfig::default(),
            hardware: HardwareConfig::default(),
            devices: default_devices(),
            record_every: 1,
            shutdown_timeout_ms: 3_000,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            meas_period_ms: 500,
            avg_period_ms: 5_000,
            settle_delay_ms: 10,
            wait_policy: WaitPolicy::Spin,
            discard_leading_ticks: 0,
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            grace_ms: 5_000,
        }
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            family: Some(MuxFamily::Tca9548a),
            address: MuxFamily::DEFAULT_ADDRESS,
            verify_selection: false,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 1_000,
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_samples: Some(10),
            max_duration_ms: None,
            interval_ms: None,
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".into(),
            gpio_chip: "/dev/gpiochip0".into(),
            cool_line: 12,
            heat_line: 26,
            trigger_line: Some(16),
        }
    }
}

/// Validated, immutable parameters handed to the tasks.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub sampling: SamplingParams,
    pub settle_delay: Duration,
    pub control: ControlParams,
    pub actuators: ActuatorParams,
    pub descriptors: Arc<[DeviceDescriptor]>,
    pub trigger_timeout: Option<Duration>,
    pub trace: TraceLimits,
    pub record_every: u32,
    pub shutdown_timeout: Duration,
}

impl SystemConfig {
    /// Parse JSON; missing keys take their defaults, unknown keys fail.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter and build the runtime values.
    pub fn validate(&self) -> Result<RuntimeConfig> {
        let descriptors = self
            .devices
            .iter()
            .map(DeviceSpec::build)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        if descriptors.is_empty() {
            return Err(ConfigError::Invalid("at least one device is required").into());
        }

        if let Some(family) = self.multiplexer.family {
            family.validate_address(self.multiplexer.address)?;
            if let Some(ch) = descriptors
                .iter()
                .filter_map(DeviceDescriptor::mux_channel)
                .find(|&ch| ch >= family.channels())
            {
                return Err(ConfigError::FieldOutOfRange {
                    field: "mux_channel",
                    value: u32::from(ch),
                    max: u32::from(family.channels() - 1),
                }
                .into());
            }
        } else if descriptors.iter().any(|d| d.mux_channel().is_some()) {
            return Err(ConfigError::Invalid("mux_channel set but no multiplexer configured").into());
        }

        let sampling = SamplingParams {
            meas_period: Duration::from_millis(self.sampling.meas_period_ms),
            avg_period: Duration::from_millis(self.sampling.avg_period_ms),
            wait_policy: self.sampling.wait_policy,
            discard_leading_ticks: self.sampling.discard_leading_ticks,
        };
        sampling.validate()?;
        self.control.validate(descriptors.len())?;

        let actuators = ActuatorParams {
            period: Duration::from_millis(self.actuators.period_ms),
            grace: Duration::from_millis(self.actuators.grace_ms),
        };
        actuators.validate()?;

        let trace = TraceLimits {
            max_samples: self.trace.max_samples,
            max_duration: self.trace.max_duration_ms.map(Duration::from_millis),
            interval: self.trace.interval_ms.map(Duration::from_millis),
        };
        trace.validate()?;

        if self.record_every == 0 {
            return Err(ConfigError::Invalid("record_every must be at least 1").into());
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Invalid("shutdown_timeout_ms must be positive").into());
        }

        Ok(RuntimeConfig {
            sampling,
            settle_delay: Duration::from_millis(self.sampling.settle_delay_ms),
            control: self.control.clone(),
            actuators,
            descriptors: descriptors.into(),
            trigger_timeout: self
                .trigger
                .enabled
                .then(|| Duration::from_millis(self.trigger.timeout_ms)),
            trace,
            record_every: self.record_every,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        })
    }
}
