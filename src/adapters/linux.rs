//! Linux host adapter: `/dev/i2c-*` and GPIO character-device lines.
//!
//! Opens the peripherals named in [`HardwareConfig`] through
//! `linux-embedded-hal`. Everything returned implements the
//! `embedded-hal` traits the rest of the crate is written against.
//!
//! Also routes SIGINT, SIGTERM and SIGHUP into a [`CancelToken`] so an
//! operator stop goes through the supervisor's forced-off shutdown.

use anyhow::{Context, Result};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::{CdevPin, I2cdev};
use log::info;

use crate::channels::CancelToken;
use crate::config::HardwareConfig;

const CONSUMER: &str = "thermolog";

/// Opened host peripherals.
pub struct LinuxHardware {
    pub bus: I2cdev,
    pub cool: CdevPin,
    pub heat: CdevPin,
    pub trigger: Option<CdevPin>,
}

fn output_line(chip: &mut Chip, offset: u32) -> Result<CdevPin> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::OUTPUT, 0, CONSUMER))
        .with_context(|| format!("requesting output line {offset}"))?;
    CdevPin::new(handle).with_context(|| format!("wrapping output line {offset}"))
}

fn input_line(chip: &mut Chip, offset: u32) -> Result<CdevPin> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::INPUT, 0, CONSUMER))
        .with_context(|| format!("requesting input line {offset}"))?;
    CdevPin::new(handle).with_context(|| format!("wrapping input line {offset}"))
}

impl LinuxHardware {
    /// Open the bus and request every line. Outputs start low.
    pub fn open(hw: &HardwareConfig, want_trigger: bool) -> Result<Self> {
        let bus = I2cdev::new(&hw.i2c_bus).with_context(|| format!("opening {}", hw.i2c_bus))?;
        let mut chip = Chip::new(&hw.gpio_chip).with_context(|| format!("opening {}", hw.gpio_chip))?;

        let cool = output_line(&mut chip, hw.cool_line)?;
        let heat = output_line(&mut chip, hw.heat_line)?;
        let trigger = match (want_trigger, hw.trigger_line) {
            (true, Some(offset)) => Some(input_line(&mut chip, offset)?),
            (true, None) => anyhow::bail!("trigger enabled but no trigger_line configured"),
            (false, _) => None,
        };

        info!(
            "Hardware: bus {} | cool line {} | heat line {} | trigger {:?}",
            hw.i2c_bus,
            hw.cool_line,
            hw.heat_line,
            trigger.as_ref().and(hw.trigger_line)
        );
        Ok(Self {
            bus,
            cool,
            heat,
            trigger,
        })
    }
}

/// Cancel `token` on SIGINT, SIGTERM or SIGHUP. Can be installed once per
/// process.
pub fn cancel_on_signal(token: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Signal received, stopping");
        token.cancel();
    })
    .context("installing signal handler")
}
