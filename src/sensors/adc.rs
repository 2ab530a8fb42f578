//! ADS1x15 conversion sequence.
//!
//! Single-shot: write the config word with OS set, poll the config register
//! until OS reads back 1 (conversion idle), then fetch the result.
//! Continuous: write the config word and read whatever the converter last
//! produced.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::error::{BusError, Result};
use crate::protocol::ads1x15::{self, AdcConfigRegister};

/// Poll attempts before a single-shot conversion is declared stuck.
/// At the slowest rate (8 SPS) a conversion takes 125 ms.
const MAX_POLLS: u32 = 300;
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Register settings for one ADC input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcInput {
    pub address: u8,
    pub mux: u8,
    pub gain: u8,
    pub rate: u8,
    pub mode: u8,
}

impl AdcInput {
    fn config(&self, start: bool) -> AdcConfigRegister {
        AdcConfigRegister {
            start,
            mux: self.mux,
            gain: self.gain,
            mode: self.mode,
            rate: self.rate,
        }
    }
}

fn read_register<I2C: I2c>(bus: &mut I2C, address: u8, pointer: u8) -> Result<[u8; 2]> {
    let mut buf = [0u8; 2];
    bus.write_read(address, &[pointer], &mut buf)
        .map_err(|e| BusError::transfer(address, &e))?;
    Ok(buf)
}

fn write_config<I2C: I2c>(bus: &mut I2C, input: &AdcInput, start: bool) -> Result<()> {
    let [msb, lsb] = input.config(start).encode()?;
    bus.write(input.address, &[ads1x15::REG_CONFIG, msb, lsb])
        .map_err(|e| BusError::transfer(input.address, &e))?;
    Ok(())
}

/// Read one input, in volts.
pub fn read_voltage<I2C: I2c>(bus: &mut I2C, input: &AdcInput) -> Result<f64> {
    if input.mode == ads1x15::MODE_SINGLE_SHOT {
        write_config(bus, input, true)?;
        let mut polls = 0;
        loop {
            let reg = ads1x15::decode_adc_config(read_register(bus, input.address, ads1x15::REG_CONFIG)?);
            if reg.conversion_idle() {
                break;
            }
            polls += 1;
            if polls >= MAX_POLLS {
                return Err(BusError::NotReady {
                    address: input.address,
                }
                .into());
            }
            thread::sleep(POLL_INTERVAL);
        }
    } else {
        write_config(bus, input, false)?;
    }

    let raw = read_register(bus, input.address, ads1x15::REG_CONVERSION)?;
    Ok(ads1x15::decode_adc(raw, input.gain)?)
}
