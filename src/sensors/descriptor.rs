//! Immutable per-channel device descriptions.
//!
//! One descriptor is one logged channel: an ADC input, or one quantity of a
//! humidity/temperature sensor. A physical HIH8121 therefore appears twice,
//! once per quantity. Descriptors are built once through
//! [`DescriptorBuilder`], validated, and then shared read-only as
//! `Arc<[DeviceDescriptor]>`.

use heapless::String;

use crate::error::ConfigError;
use crate::protocol::ads1x15::{self, AddrStrap};
use crate::protocol::hih8121::{self, Calibration};

/// Longest channel label kept in a descriptor.
pub const LABEL_LEN: usize = 24;

/// Which quantity of a humidity/temperature frame a descriptor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Humidity,
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceKind {
    /// ADS1x15 input, read single-shot or continuous.
    Adc { mux: u8, gain: u8, rate: u8, mode: u8 },
    /// HIH8121 quantity with its range/offset mapping.
    Humidity {
        quantity: Quantity,
        calibration: Calibration,
    },
}

impl DeviceKind {
    pub const fn family(&self) -> &'static str {
        match self {
            Self::Adc { .. } => "ADS1x15",
            Self::Humidity { .. } => "HIH8121",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    label: String<LABEL_LEN>,
    kind: DeviceKind,
    address: u8,
    mux_channel: Option<u8>,
    bias: f64,
    bound: f64,
}

impl DeviceDescriptor {
    /// Start an ADC input descriptor on the default gain and rate.
    pub fn adc(strap: AddrStrap, input_mux: u8) -> DescriptorBuilder {
        DescriptorBuilder::new(
            DeviceKind::Adc {
                mux: input_mux,
                gain: ads1x15::DEFAULT_GAIN,
                rate: ads1x15::DEFAULT_RATE,
                mode: ads1x15::MODE_SINGLE_SHOT,
            },
            strap.address(),
        )
    }

    /// Start a humidity-sensor descriptor for one quantity.
    pub fn humidity(quantity: Quantity) -> DescriptorBuilder {
        let calibration = match quantity {
            Quantity::Humidity => Calibration::HUMIDITY,
            Quantity::Temperature => Calibration::TEMPERATURE,
        };
        DescriptorBuilder::new(
            DeviceKind::Humidity {
                quantity,
                calibration,
            },
            hih8121::ADDRESS,
        )
        .bound(default_bound(quantity))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn mux_channel(&self) -> Option<u8> {
        self.mux_channel
    }

    /// Offset subtracted from the window mean; 0 for unipolar channels.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Largest accepted absolute window mean.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// A copy on a different multiplexer channel; the original is untouched.
    pub fn with_mux_channel(&self, channel: Option<u8>) -> Self {
        Self {
            mux_channel: channel,
            ..self.clone()
        }
    }
}

fn default_bound(quantity: Quantity) -> f64 {
    match quantity {
        Quantity::Humidity => 100.0,
        Quantity::Temperature => 50.0,
    }
}

/// Builder for [`DeviceDescriptor`]; `build()` validates everything once.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    label: Option<std::string::String>,
    kind: DeviceKind,
    address: u8,
    mux_channel: Option<u8>,
    bias: f64,
    bound: f64,
}

impl DescriptorBuilder {
    fn new(kind: DeviceKind, address: u8) -> Self {
        Self {
            label: None,
            kind,
            address,
            mux_channel: None,
            bias: 0.0,
            bound: 50.0,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Override the address directly instead of deriving it from straps.
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn mux_channel(mut self, channel: u8) -> Self {
        self.mux_channel = Some(channel);
        self
    }

    pub fn bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    pub fn bound(mut self, bound: f64) -> Self {
        self.bound = bound;
        self
    }

    /// ADC only: PGA, data-rate and mode codes.
    pub fn adc_settings(mut self, gain: u8, rate: u8, mode: u8) -> Self {
        if let DeviceKind::Adc { mux, .. } = self.kind {
            self.kind = DeviceKind::Adc {
                mux,
                gain,
                rate,
                mode,
            };
        }
        self
    }

    /// Humidity only: replace the datasheet range/offset.
    pub fn calibration(mut self, calibration: Calibration) -> Self {
        if let DeviceKind::Humidity { quantity, .. } = self.kind {
            self.kind = DeviceKind::Humidity {
                quantity,
                calibration,
            };
        }
        self
    }

    pub fn build(self) -> Result<DeviceDescriptor, ConfigError> {
        match self.kind {
            DeviceKind::Adc {
                mux,
                gain,
                rate,
                mode,
            } => {
                ads1x15::validate_address(self.address)?;
                ads1x15::encode_adc_config(mux, gain, rate, mode, false)?;
            }
            DeviceKind::Humidity { calibration, .. } => {
                if self.address != hih8121::ADDRESS {
                    return Err(ConfigError::InvalidAddress {
                        family: "HIH8121",
                        address: self.address,
                    });
                }
                if !calibration.range.is_finite()
                    || calibration.range == 0.0
                    || !calibration.offset.is_finite()
                {
                    return Err(ConfigError::Invalid("calibration must be finite and non-zero"));
                }
            }
        }
        if !self.bias.is_finite() {
            return Err(ConfigError::Invalid("bias must be finite"));
        }
        if !(self.bound.is_finite() && self.bound > 0.0) {
            return Err(ConfigError::Invalid("sanity bound must be positive"));
        }

        let text = match &self.label {
            Some(l) => l.clone(),
            None => default_label(&self.kind, self.address, self.mux_channel),
        };
        let mut label = String::new();
        for c in text.chars().take(LABEL_LEN) {
            // Multi-byte characters near the end may not fit; stop there.
            if label.push(c).is_err() {
                break;
            }
        }

        Ok(DeviceDescriptor {
            label,
            kind: self.kind,
            address: self.address,
            mux_channel: self.mux_channel,
            bias: self.bias,
            bound: self.bound,
        })
    }
}

fn default_label(kind: &DeviceKind, address: u8, channel: Option<u8>) -> std::string::String {
    let suffix = channel.map(|c| format!("@{c}")).unwrap_or_default();
    match kind {
        DeviceKind::Adc { mux, .. } => format!("adc{address:02x}.{mux}{suffix}"),
        DeviceKind::Humidity {
            quantity: Quantity::Humidity,
            ..
        } => format!("rh{suffix}"),
        DeviceKind::Humidity {
            quantity: Quantity::Temperature,
            ..
        } => format!("t{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc_builder_derives_address_from_strap() {
        let d = DeviceDescriptor::adc(AddrStrap::Sda, 0b101).bias(1.72).build().unwrap();
        assert_eq!(d.address(), 0x4A);
        assert_eq!(d.bias(), 1.72);
        assert_eq!(d.label(), "adc4a.5");
    }

    #[test]
    fn adc_rejects_bad_fields_and_addresses() {
        assert!(DeviceDescriptor::adc(AddrStrap::Gnd, 8).build().is_err());
        assert!(
            DeviceDescriptor::adc(AddrStrap::Gnd, 4)
                .address(0x50)
                .build()
                .is_err()
        );
        assert!(
            DeviceDescriptor::adc(AddrStrap::Gnd, 4)
                .adc_settings(0, 0, 3)
                .build()
                .is_err()
        );
    }

    #[test]
    fn humidity_defaults() {
        let d = DeviceDescriptor::humidity(Quantity::Temperature)
            .mux_channel(3)
            .build()
            .unwrap();
        assert_eq!(d.address(), 0x27);
        assert_eq!(d.mux_channel(), Some(3));
        assert_eq!(d.bound(), 50.0);
        assert_eq!(d.label(), "t@3");
        let DeviceKind::Humidity { calibration, .. } = d.kind() else {
            panic!("expected a humidity descriptor");
        };
        assert_eq!(*calibration, Calibration::TEMPERATURE);
    }

    #[test]
    fn humidity_address_is_fixed() {
        let err = DeviceDescriptor::humidity(Quantity::Humidity)
            .address(0x28)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn non_positive_bound_is_rejected() {
        assert!(
            DeviceDescriptor::humidity(Quantity::Humidity)
                .bound(0.0)
                .build()
                .is_err()
        );
        assert!(
            DeviceDescriptor::humidity(Quantity::Humidity)
                .bias(f64::NAN)
                .build()
                .is_err()
        );
    }

    #[test]
    fn with_mux_channel_returns_new_descriptor() {
        let d = DeviceDescriptor::humidity(Quantity::Humidity).build().unwrap();
        let moved = d.with_mux_channel(Some(5));
        assert_eq!(d.mux_channel(), None);
        assert_eq!(moved.mux_channel(), Some(5));
    }

    #[test]
    fn long_labels_are_truncated() {
        let d = DeviceDescriptor::humidity(Quantity::Humidity)
            .label("a-very-long-label-that-does-not-fit")
            .build()
            .unwrap();
        assert_eq!(d.label().len(), LABEL_LEN);
    }
}
