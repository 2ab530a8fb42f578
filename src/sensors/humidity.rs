//! HIH8121 measurement request / fetch.
//!
//! A zero-length write starts a conversion (~37 ms); a 4-byte read returns
//! the most recent result with a status flag saying whether it is new.
//! Reads are pipelined: each fetch immediately requests the next
//! conversion, so the sensor is converting while the sampler waits for its
//! next tick.

use embedded_hal::i2c::I2c;

use crate::error::{BusError, Result};
use crate::protocol::hih8121::{self, Calibration, HumidityTemperature};

/// Start a conversion.
pub fn request_measurement<I2C: I2c>(bus: &mut I2C, address: u8) -> Result<()> {
    bus.write(address, &[])
        .map_err(|e| BusError::transfer(address, &e))?;
    Ok(())
}

/// Fetch the last conversion without requesting a new one.
pub fn fetch<I2C: I2c>(
    bus: &mut I2C,
    address: u8,
    humidity: Calibration,
    temperature: Calibration,
) -> Result<HumidityTemperature> {
    let mut frame = [0u8; 4];
    bus.read(address, &mut frame)
        .map_err(|e| BusError::transfer(address, &e))?;
    Ok(hih8121::decode_with(frame, humidity, temperature))
}

/// Fetch the last conversion, then request the next one.
pub fn read_pipelined<I2C: I2c>(
    bus: &mut I2C,
    address: u8,
    humidity: Calibration,
    temperature: Calibration,
) -> Result<HumidityTemperature> {
    let reading = fetch(bus, address, humidity, temperature)?;
    request_measurement(bus, address)?;
    Ok(reading)
}
