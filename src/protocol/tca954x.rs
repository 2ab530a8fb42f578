//! TCA954x I2C switch control register.
//!
//! One bit per downstream channel; a set bit connects that channel to the
//! upstream bus. The 4-channel TCA9545A reports interrupt flags in the high
//! nibble, which is written as all ones.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Channel numbers enabled in a control byte.
pub type ChannelSet = Vec<u8, 8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuxFamily {
    /// 4 channels, address `1 1 1 0 0 A1 A0`.
    Tca9545a,
    /// 8 channels, address `1 1 1 0 A2 A1 A0`.
    Tca9548a,
}

impl MuxFamily {
    pub const DEFAULT_ADDRESS: u8 = 0x70;

    pub const fn channels(self) -> u8 {
        match self {
            Self::Tca9545a => 4,
            Self::Tca9548a => 8,
        }
    }

    pub const fn fixed_bits(self) -> u8 {
        match self {
            Self::Tca9545a => 0xF0,
            Self::Tca9548a => 0x00,
        }
    }

    pub const fn address_template(self) -> &'static str {
        match self {
            Self::Tca9545a => "11100ba",
            Self::Tca9548a => "1110cba",
        }
    }

    const fn channel_bits(self) -> u8 {
        match self {
            Self::Tca9545a => 0x0F,
            Self::Tca9548a => 0xFF,
        }
    }

    pub fn validate_address(self, address: u8) -> Result<(), ConfigError> {
        super::address::pins_from_address(address, self.address_template())
            .map(|_| ())
            .map_err(|_| ConfigError::InvalidAddress {
                family: "TCA954x",
                address,
            })
    }
}

/// OR of the per-channel enable bits plus the family's fixed high bits.
pub fn encode_mux_channel_mask(family: MuxFamily, enabled: &[u8]) -> Result<u8, ConfigError> {
    let mut mask = family.fixed_bits();
    for &ch in enabled {
        if ch >= family.channels() {
            return Err(ConfigError::FieldOutOfRange {
                field: "mux_channel",
                value: u32::from(ch),
                max: u32::from(family.channels() - 1),
            });
        }
        mask |= 1 << ch;
    }
    Ok(mask)
}

/// Enabled channels in a control byte read back from the switch.
pub fn decode_mux_channel_mask(family: MuxFamily, control: u8) -> ChannelSet {
    let bits = control & family.channel_bits();
    (0..family.channels()).filter(|&ch| bits & (1 << ch) != 0).collect()
}
