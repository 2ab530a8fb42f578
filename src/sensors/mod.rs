//! Sensor subsystem: channel descriptors, device drivers and the
//! bus-backed [`BusSampler`].
//!
//! The sampler owns the multiplexer (and through it the bus) and turns a
//! descriptor index into one [`RawSample`]. It is the only code that
//! touches the bus.

pub mod adc;
pub mod descriptor;
pub mod humidity;
pub mod multiplexer;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;
use heapless::Vec;
use log::info;

use crate::app::ports::SamplePort;
use crate::error::{ConfigError, Result};
use crate::protocol::hih8121::{Calibration, SensorStatus};
use adc::AdcInput;
use descriptor::{DeviceDescriptor, DeviceKind, Quantity};
use multiplexer::ChannelMultiplexer;

/// Largest number of distinct humidity sensors primed at start-up.
const MAX_PRIMED: usize = 16;

/// One channel's decoded value for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Volts, %RH or °C depending on the channel.
    pub value: f64,
    /// `true` if the device reported it had nothing newer.
    pub stale: bool,
}

impl RawSample {
    pub const fn fresh(value: f64) -> Self {
        Self {
            value,
            stale: false,
        }
    }
}

/// Reads descriptors over a (possibly switched) I2C bus.
pub struct BusSampler<I2C> {
    mux: ChannelMultiplexer<I2C>,
    descriptors: Arc<[DeviceDescriptor]>,
    settle: Duration,
}

impl<I2C: I2c> BusSampler<I2C> {
    /// Fails if a descriptor needs a channel the multiplexer does not have.
    pub fn new(
        mux: ChannelMultiplexer<I2C>,
        descriptors: Arc<[DeviceDescriptor]>,
        settle: Duration,
    ) -> Result<Self> {
        let channels = mux.channel_count();
        if let Some(bad) = descriptors
            .iter()
            .find(|d| d.mux_channel().is_some_and(|ch| ch >= channels))
        {
            return Err(ConfigError::FieldOutOfRange {
                field: "mux_channel",
                value: u32::from(bad.mux_channel().unwrap_or_default()),
                max: u32::from(channels.saturating_sub(1)),
            }
            .into());
        }
        Ok(Self {
            mux,
            descriptors,
            settle,
        })
    }

    pub fn multiplexer(&self) -> &ChannelMultiplexer<I2C> {
        &self.mux
    }

    pub fn into_multiplexer(self) -> ChannelMultiplexer<I2C> {
        self.mux
    }
}

impl<I2C: I2c> SamplePort for BusSampler<I2C> {
    fn channels(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    fn prime(&mut self) -> Result<()> {
        let mut primed: Vec<(u8, Option<u8>), MAX_PRIMED> = Vec::new();
        for d in self.descriptors.iter() {
            if !matches!(d.kind(), DeviceKind::Humidity { .. }) {
                continue;
            }
            let key = (d.address(), d.mux_channel());
            if primed.contains(&key) {
                continue;
            }
            let mut bus = self.mux.scope(d.mux_channel())?;
            if let Err(e) = humidity::request_measurement(&mut *bus, d.address()) {
                bus.invalidate();
                return Err(e);
            }
            drop(bus);
            thread::sleep(self.settle);
            if primed.push(key).is_err() {
                break;
            }
        }
        info!("Sampler: primed {} humidity sensor(s)", primed.len());
        Ok(())
    }

    fn read(&mut self, index: usize) -> Result<RawSample> {
        let d = self
            .descriptors
            .get(index)
            .ok_or(ConfigError::Invalid("channel index out of range"))?;
        let mut bus = self.mux.scope(d.mux_channel())?;
        let sample = read_device(&mut *bus, d);
        if sample.is_err() {
            bus.invalidate();
        }
        drop(bus);
        thread::sleep(self.settle);
        sample
    }
}

fn read_device<I2C: I2c>(bus: &mut I2C, d: &DeviceDescriptor) -> Result<RawSample> {
    match *d.kind() {
        DeviceKind::Adc {
            mux,
            gain,
            rate,
            mode,
        } => {
            let input = AdcInput {
                address: d.address(),
                mux,
                gain,
                rate,
                mode,
            };
            Ok(RawSample::fresh(adc::read_voltage(bus, &input)?))
        }
        DeviceKind::Humidity {
            quantity,
            calibration,
        } => {
            let (hum_cal, temp_cal) = match quantity {
                Quantity::Humidity => (calibration, Calibration::TEMPERATURE),
                Quantity::Temperature => (Calibration::HUMIDITY, calibration),
            };
            let r = humidity::read_pipelined(bus, d.address(), hum_cal, temp_cal)?;
            Ok(RawSample {
                value: match quantity {
                    Quantity::Humidity => r.humidity,
                    Quantity::Temperature => r.temperature,
                },
                stale: r.status != SensorStatus::Normal,
            })
        }
    }
}
