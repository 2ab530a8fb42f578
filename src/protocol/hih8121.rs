//! HIH8121 humidity/temperature frame decoding.
//!
//! A fetch returns four bytes:
//!
//! ```text
//!   byte0: S1 S0 H13..H8   byte1: H7..H0
//!   byte2: T13..T6         byte3: T5..T0 x x
//! ```
//!
//! A measurement request is a zero-length write to the device address.

/// Fixed bus address; the part has no address pins.
pub const ADDRESS: u8 = 0x27;

/// Denominator of the transfer function: `2^14 - 2`.
pub const COUNTS: f64 = 16_382.0;

const RAW_MAX: u16 = 0x3FFF;

/// Linear mapping `range * raw / (2^14 - 2) + offset`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Calibration {
    pub range: f64,
    pub offset: f64,
}

impl Calibration {
    pub const HUMIDITY: Self = Self {
        range: 100.0,
        offset: 0.0,
    };
    pub const TEMPERATURE: Self = Self {
        range: 165.0,
        offset: -40.0,
    };

    pub fn apply(&self, raw: u16) -> f64 {
        self.range * f64::from(raw) / COUNTS + self.offset
    }

    /// Nearest raw count for a physical value, clamped to 14 bits.
    pub fn raw_for(&self, value: f64) -> u16 {
        ((value - self.offset) * COUNTS / self.range)
            .round()
            .clamp(0.0, f64::from(RAW_MAX)) as u16
    }
}

/// Two status bits at the top of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Normal,
    /// No conversion completed since the last fetch.
    Stale,
    CommandMode,
    Diagnostic,
}

impl SensorStatus {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Normal,
            1 => Self::Stale,
            2 => Self::CommandMode,
            _ => Self::Diagnostic,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Stale => 1,
            Self::CommandMode => 2,
            Self::Diagnostic => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityTemperature {
    /// Relative humidity, %RH.
    pub humidity: f64,
    /// Temperature, °C.
    pub temperature: f64,
    pub status: SensorStatus,
}

/// Decode a frame with the datasheet calibration.
pub fn decode_humidity_temperature(bytes: [u8; 4]) -> HumidityTemperature {
    decode_with(bytes, Calibration::HUMIDITY, Calibration::TEMPERATURE)
}

pub fn decode_with(
    bytes: [u8; 4],
    humidity: Calibration,
    temperature: Calibration,
) -> HumidityTemperature {
    let status = SensorStatus::from_bits(bytes[0] >> 6);
    let hum_raw = (u16::from(bytes[0] & 0x3F) << 8) | u16::from(bytes[1]);
    let temp_raw = u16::from_be_bytes([bytes[2], bytes[3]]) >> 2;
    HumidityTemperature {
        humidity: humidity.apply(hum_raw),
        temperature: temperature.apply(temp_raw),
        status,
    }
}

/// Build a frame from raw counts; used by bus simulations.
pub fn encode_frame(status: SensorStatus, hum_raw: u16, temp_raw: u16) -> [u8; 4] {
    let hum = hum_raw & RAW_MAX;
    let temp = (temp_raw & RAW_MAX) << 2;
    let [t_hi, t_lo] = temp.to_be_bytes();
    [(status.bits() << 6) | (hum >> 8) as u8, hum as u8, t_hi, t_lo]
}
