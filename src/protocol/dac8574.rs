//! DAC8574 quad 16-bit DAC frame encoding.
//!
//! Every write is the device address followed by three bytes:
//!
//! ```text
//!   ctrl:  A3 A2 0 1 0 SEL1 SEL0 PD     (L1L0 = 01: store and update)
//!   MSB, LSB of the 16-bit code         (or PD1 PD0 0.. when PD = 1)
//! ```
//!
//! A3/A2 are the extended address pins and select which of up to four
//! devices sharing one bus address answers the frame.

use heapless::Vec;

use crate::error::ConfigError;

/// Bus address template: `1 0 0 1 1 A1 A0`.
pub const ADDRESS_TEMPLATE: &str = "10011ba";

pub const CHANNELS: u8 = 4;

const LOAD_AND_UPDATE: u8 = 0b01 << 4;
const FULL_SCALE_CODE: f64 = 65_535.0;

/// One three-byte write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacFrame {
    pub control: u8,
    pub data: [u8; 2],
}

impl DacFrame {
    pub fn to_bytes(self) -> [u8; 3] {
        [self.control, self.data[0], self.data[1]]
    }
}

/// Target of a power-down frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacChannels {
    One(u8),
    All,
}

fn control_byte(extended: u8, channel: u8, power_down: bool) -> Result<u8, ConfigError> {
    if extended > 0b11 {
        return Err(ConfigError::FieldOutOfRange {
            field: "extended_address",
            value: u32::from(extended),
            max: 0b11,
        });
    }
    if channel >= CHANNELS {
        return Err(ConfigError::FieldOutOfRange {
            field: "channel",
            value: u32::from(channel),
            max: u32::from(CHANNELS - 1),
        });
    }
    Ok((extended << 6) | LOAD_AND_UPDATE | (channel << 1) | u8::from(power_down))
}

/// Encode an output level as a fraction of full scale (truncated to 16 bits).
pub fn encode_dac_output(extended: u8, channel: u8, fraction: f64) -> Result<DacFrame, ConfigError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ConfigError::Invalid("DAC fraction must lie in [0, 1]"));
    }
    let code = (fraction * FULL_SCALE_CODE) as u16;
    Ok(DacFrame {
        control: control_byte(extended, channel, false)?,
        data: code.to_be_bytes(),
    })
}

/// Encode a power-down request; `All` yields one frame per channel.
pub fn encode_dac_power_down(
    extended: u8,
    channels: DacChannels,
    mode: u8,
) -> Result<Vec<DacFrame, 4>, ConfigError> {
    if mode > 0b11 {
        return Err(ConfigError::FieldOutOfRange {
            field: "power_down_mode",
            value: u32::from(mode),
            max: 0b11,
        });
    }
    let mut frames = Vec::new();
    let (first, last) = match channels {
        DacChannels::One(ch) => (ch, ch),
        DacChannels::All => (0, CHANNELS - 1),
    };
    for ch in first..=last {
        let frame = DacFrame {
            control: control_byte(extended, ch, true)?,
            data: [mode << 6, 0],
        };
        frames
            .push(frame)
            .map_err(|_| ConfigError::Invalid("too many DAC frames"))?;
    }
    Ok(frames)
}

/// Output fraction carried by a data word.
pub fn decode_dac_code(data: [u8; 2]) -> f64 {
    f64::from(u16::from_be_bytes(data)) / FULL_SCALE_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_frame_layout() {
        let f = encode_dac_output(0b10, 3, 1.0).unwrap();
        assert_eq!(f.control, 0b1001_0110);
        assert_eq!(f.data, [0xFF, 0xFF]);
        assert_eq!(f.to_bytes(), [0b1001_0110, 0xFF, 0xFF]);
    }

    #[test]
    fn fraction_is_truncated() {
        let f = encode_dac_output(0, 0, 0.5).unwrap();
        assert_eq!(u16::from_be_bytes(f.data), 32_767);
    }

    #[test]
    fn out_of_range_inputs_fail() {
        assert!(encode_dac_output(0, 4, 0.5).is_err());
        assert!(encode_dac_output(4, 0, 0.5).is_err());
        assert!(encode_dac_output(0, 0, 1.01).is_err());
        assert!(encode_dac_output(0, 0, f64::NAN).is_err());
    }

    #[test]
    fn power_down_single_channel() {
        let frames = encode_dac_power_down(0, DacChannels::One(1), 0b10).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].control, 0b0001_0011);
        assert_eq!(frames[0].data, [0b1000_0000, 0]);
    }

    #[test]
    fn power_down_all_channels() {
        let frames = encode_dac_power_down(0b01, DacChannels::All, 1).unwrap();
        let controls: std::vec::Vec<u8> = frames.iter().map(|f| f.control).collect();
        assert_eq!(controls, [0x51, 0x53, 0x55, 0x57]);
        assert!(frames.iter().all(|f| f.data == [0x40, 0]));
        assert!(encode_dac_power_down(0, DacChannels::All, 4).is_err());
    }

    #[test]
    fn code_decodes_to_fraction() {
        assert_eq!(decode_dac_code([0, 0]), 0.0);
        assert_eq!(decode_dac_code([0xFF, 0xFF]), 1.0);
    }
}
