//! ADS1x15 register encoding (ADS1115 16-bit family).
//!
//! Config register layout (pointer `0x01`), big-endian:
//!
//! ```text
//!   byte0:  OS | MUX[2:0] | PGA[2:0] | MODE
//!   byte1:  DR[2:0] | COMP_MODE | COMP_POL | COMP_LAT | COMP_QUE[1:0]
//! ```
//!
//! The comparator is never used, so byte1's low five bits are always
//! `0b00011` (comparator queue disabled).

use crate::error::ConfigError;

/// Register pointers.
pub const REG_CONVERSION: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;

/// Full-scale range in volts, indexed by the 3-bit PGA code.
pub const FULL_SCALE: [f64; 8] = [6.144, 4.096, 2.048, 1.024, 0.512, 0.256, 0.256, 0.256];

/// Default PGA code (±2.048 V).
pub const DEFAULT_GAIN: u8 = 0b010;
/// Default data-rate code (128 SPS).
pub const DEFAULT_RATE: u8 = 0b100;
/// Mode bit: 1 = single-shot / power-down, 0 = continuous.
pub const MODE_SINGLE_SHOT: u8 = 1;
/// Single-ended AIN0 input-mux code; AIN1..AIN3 follow.
pub const MUX_SINGLE_AIN0: u8 = 0b100;

const COMPARATOR_DISABLED: u8 = 0b0_0011;
const BASE_ADDRESS: u8 = 0x48;

/// Where the ADDR pin is strapped; selects one of four bus addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddrStrap {
    Gnd,
    Vdd,
    Sda,
    Scl,
}

impl AddrStrap {
    pub const fn address(self) -> u8 {
        BASE_ADDRESS
            + match self {
                Self::Gnd => 0,
                Self::Vdd => 1,
                Self::Sda => 2,
                Self::Scl => 3,
            }
    }
}

/// The family answers on 0x48..=0x4B only.
pub fn validate_address(address: u8) -> Result<(), ConfigError> {
    if (BASE_ADDRESS..=BASE_ADDRESS + 3).contains(&address) {
        Ok(())
    } else {
        Err(ConfigError::InvalidAddress {
            family: "ADS1x15",
            address,
        })
    }
}

const STEPS_PER_SIDE: f64 = 32_768.0;

fn check_field(field: &'static str, value: u8, bits: u32) -> Result<(), ConfigError> {
    let max = (1u32 << bits) - 1;
    if u32::from(value) > max {
        return Err(ConfigError::FieldOutOfRange {
            field,
            value: u32::from(value),
            max,
        });
    }
    Ok(())
}

/// Full-scale voltage for a PGA code.
pub fn full_scale(gain: u8) -> Result<f64, ConfigError> {
    check_field("gain", gain, 3)?;
    Ok(FULL_SCALE[usize::from(gain)])
}

/// Decoded view of the config register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcConfigRegister {
    /// Write: start a conversion. Read: 1 = no conversion in progress.
    pub start: bool,
    pub mux: u8,
    pub gain: u8,
    pub mode: u8,
    pub rate: u8,
}

impl AdcConfigRegister {
    pub fn encode(&self) -> Result<[u8; 2], ConfigError> {
        encode_adc_config(self.mux, self.gain, self.rate, self.mode, self.start)
    }

    pub fn decode(bytes: [u8; 2]) -> Self {
        Self {
            start: bytes[0] & 0x80 != 0,
            mux: (bytes[0] >> 4) & 0b111,
            gain: (bytes[0] >> 1) & 0b111,
            mode: bytes[0] & 1,
            rate: bytes[1] >> 5,
        }
    }

    /// For a register read back from the device: the conversion has finished.
    pub fn conversion_idle(&self) -> bool {
        self.start
    }
}

/// Pack the config register. Fails if any field exceeds its bit width.
pub fn encode_adc_config(
    mux: u8,
    gain: u8,
    rate: u8,
    mode: u8,
    start: bool,
) -> Result<[u8; 2], ConfigError> {
    check_field("mux", mux, 3)?;
    check_field("gain", gain, 3)?;
    check_field("rate", rate, 3)?;
    check_field("mode", mode, 1)?;
    let msb = (u8::from(start) << 7) | (mux << 4) | (gain << 1) | mode;
    let lsb = (rate << 5) | COMPARATOR_DISABLED;
    Ok([msb, lsb])
}

/// Unpack a config register read back from the device.
pub fn decode_adc_config(bytes: [u8; 2]) -> AdcConfigRegister {
    AdcConfigRegister::decode(bytes)
}

/// Convert a conversion-register value to volts.
///
/// Codes below `0x8000` span `[0, FS)`, codes at or above span `[-FS, 0)`,
/// each step being `FS / 2^15`.
pub fn decode_adc(bytes: [u8; 2], gain: u8) -> Result<f64, ConfigError> {
    let fs = full_scale(gain)?;
    let step = fs / STEPS_PER_SIDE;
    let raw = u16::from_be_bytes(bytes);
    Ok(if raw < 0x8000 {
        step * f64::from(raw)
    } else {
        -fs + step * f64::from(raw - 0x8000)
    })
}

/// Inverse of [`decode_adc`], saturating at the ends of the range.
pub fn encode_adc_reading(volts: f64, gain: u8) -> Result<[u8; 2], ConfigError> {
    let fs = full_scale(gain)?;
    let code = (volts / (fs / STEPS_PER_SIDE))
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
    Ok(code.to_be_bytes())
}
