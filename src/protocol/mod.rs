//! Register-level encoding for every device on the bus.
//!
//! Pure functions only: bytes in, physical values out (or the reverse).
//! Bus transactions live in [`crate::sensors`] and [`crate::drivers`].
//!
//! ```text
//!   ads1x15   ADC config word, two's-complement conversion result
//!   hih8121   4-byte humidity/temperature frame
//!   dac8574   control byte + 16-bit code, power-down frames
//!   tca954x   switch channel mask
//!   address   pin-strapped address templates
//! ```
//!
//! Malformed field values fail with [`ConfigError`](crate::error::ConfigError);
//! transport failures belong to the bus and are never raised here.

pub mod address;
pub mod ads1x15;
pub mod dac8574;
pub mod hih8121;
pub mod tca954x;

pub use address::{address_from_pins, pins_from_address};
pub use ads1x15::{decode_adc, encode_adc_config, encode_adc_reading};
pub use dac8574::{decode_dac_code, encode_dac_output, encode_dac_power_down, DacChannels};
pub use hih8121::{decode_humidity_temperature, HumidityTemperature, SensorStatus};
pub use tca954x::{decode_mux_channel_mask, encode_mux_channel_mask, MuxFamily};
