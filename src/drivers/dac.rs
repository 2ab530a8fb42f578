//! DAC8574 analog output driver.
//!
//! Four 16-bit outputs per device, up to four devices per bus address
//! (selected by the A3/A2 extended-address pins carried in every control
//! byte). The bus address itself comes from the A1/A0 straps.

use embedded_hal::i2c::I2c;
use log::debug;

use crate::error::{BusError, ConfigError, Result};
use crate::protocol::address::address_from_pins;
use crate::protocol::dac8574::{self, DacChannels};

/// Output span of the reference board: full scale and zero-code offset.
pub const DEFAULT_VREF: f64 = 2.486;
pub const DEFAULT_VOFFSET: f64 = 0.019;

pub struct Dac8574<I2C> {
    bus: I2C,
    address: u8,
    extended: u8,
    vref: f64,
    voffset: f64,
}

impl<I2C: I2c> Dac8574<I2C> {
    /// `a_pins` = `[A0, A1]`, `extended` = `A3 << 1 | A2`.
    pub fn new(bus: I2C, a_pins: [bool; 2], extended: u8) -> Result<Self> {
        if extended > 0b11 {
            return Err(ConfigError::FieldOutOfRange {
                field: "extended_address",
                value: u32::from(extended),
                max: 0b11,
            }
            .into());
        }
        let address = address_from_pins(&a_pins, dac8574::ADDRESS_TEMPLATE)?;
        Ok(Self {
            bus,
            address,
            extended,
            vref: DEFAULT_VREF,
            voffset: DEFAULT_VOFFSET,
        })
    }

    /// Override the volts mapping; `vref` must exceed `voffset`.
    pub fn with_reference(mut self, vref: f64, voffset: f64) -> Result<Self> {
        if !(vref.is_finite() && voffset.is_finite() && vref > voffset) {
            return Err(ConfigError::Invalid("vref must exceed voffset").into());
        }
        self.vref = vref;
        self.voffset = voffset;
        Ok(self)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn write_frame(&mut self, frame: dac8574::DacFrame) -> Result<()> {
        self.bus
            .write(self.address, &frame.to_bytes())
            .map_err(|e| BusError::transfer(self.address, &e))?;
        Ok(())
    }

    /// Set an output as a fraction of full scale.
    pub fn set_fraction(&mut self, channel: u8, fraction: f64) -> Result<()> {
        let frame = dac8574::encode_dac_output(self.extended, channel, fraction)?;
        debug!("DAC: ch{} <- {:.5} (0x{:02X}{:02X})", channel, fraction, frame.data[0], frame.data[1]);
        self.write_frame(frame)
    }

    /// Fraction that produces `volts`, or an error outside the span.
    pub fn fraction_for(&self, volts: f64) -> core::result::Result<f64, ConfigError> {
        let fraction = (volts - self.voffset) / (self.vref - self.voffset);
        if (0.0..=1.0).contains(&fraction) {
            Ok(fraction)
        } else {
            Err(ConfigError::Invalid("voltage outside the DAC output span"))
        }
    }

    pub fn set_voltage(&mut self, channel: u8, volts: f64) -> Result<()> {
        let fraction = self.fraction_for(volts)?;
        self.set_fraction(channel, fraction)
    }

    /// Power down one or all outputs; `mode` selects the output load.
    pub fn power_down(&mut self, channels: DacChannels, mode: u8) -> Result<()> {
        for frame in dac8574::encode_dac_power_down(self.extended, channels, mode)? {
            self.write_frame(frame)?;
        }
        Ok(())
    }

    pub fn into_bus(self) -> I2C {
        self.bus
    }
}
