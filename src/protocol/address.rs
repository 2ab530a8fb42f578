//! Pin-strapped address templates.
//!
//! Devices with address pins are described by a template string, MSB first:
//! `'0'`/`'1'` are fixed bits, a letter is replaced by a pin value where
//! `'a'` is pin 0, `'b'` pin 1, and so on.
//!
//! ```text
//!   template "10011ba", pins [A0=1, A1=0]  ──▶  0b1001101 = 0x4D
//! ```

use heapless::Vec;

use crate::error::ConfigError;

/// Longest template: a full 7-bit address.
pub const MAX_TEMPLATE_BITS: usize = 7;

/// Pin values recovered from an address, index `i` = letter `'a' + i`.
pub type PinValues = Vec<bool, MAX_TEMPLATE_BITS>;

fn check_template(template: &str) -> Result<(), ConfigError> {
    if template.is_empty() || template.len() > MAX_TEMPLATE_BITS {
        return Err(ConfigError::InvalidTemplate("length must be 1..=7"));
    }
    if !template
        .bytes()
        .all(|c| c == b'0' || c == b'1' || (b'a'..=b'g').contains(&c))
    {
        return Err(ConfigError::InvalidTemplate("only '0', '1' and 'a'..='g' allowed"));
    }
    Ok(())
}

/// Build a 7-bit address by substituting `pins` into `template`.
pub fn address_from_pins(pins: &[bool], template: &str) -> Result<u8, ConfigError> {
    check_template(template)?;
    let mut address = 0u8;
    for c in template.bytes() {
        let bit = match c {
            b'0' => false,
            b'1' => true,
            letter => {
                let index = usize::from(letter - b'a');
                *pins
                    .get(index)
                    .ok_or(ConfigError::InvalidTemplate("template names a pin that was not supplied"))?
            }
        };
        address = (address << 1) | u8::from(bit);
    }
    Ok(address)
}

/// Recover the pin values that produce `address` under `template`.
///
/// Fails if the fixed bits disagree with the address, or if a letter used
/// twice maps to two different bits.
pub fn pins_from_address(address: u8, template: &str) -> Result<PinValues, ConfigError> {
    check_template(template)?;
    let width = template.len();
    if u32::from(address) >> width != 0 {
        return Err(ConfigError::InvalidTemplate("address wider than template"));
    }

    let pin_count = template
        .bytes()
        .filter(u8::is_ascii_lowercase)
        .map(|c| usize::from(c - b'a') + 1)
        .max()
        .unwrap_or(0);
    let mut pins: Vec<Option<bool>, MAX_TEMPLATE_BITS> = Vec::new();
    for _ in 0..pin_count {
        let _ = pins.push(None);
    }

    for (pos, c) in template.bytes().enumerate() {
        let bit = (address >> (width - 1 - pos)) & 1 == 1;
        match c {
            b'0' | b'1' => {
                if bit != (c == b'1') {
                    return Err(ConfigError::InvalidTemplate("fixed bits do not match address"));
                }
            }
            letter => {
                let slot = &mut pins[usize::from(letter - b'a')];
                match slot {
                    Some(prev) if *prev != bit => {
                        return Err(ConfigError::InvalidTemplate("pin used with two values"));
                    }
                    _ => *slot = Some(bit),
                }
            }
        }
    }

    // Letters skipped by the template (e.g. "1a" + "c") stay low.
    Ok(pins.iter().map(|p| p.unwrap_or(false)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dac_template_substitutes_pins() {
        // A0 = pin 0 ('a') sits in the LSB.
        assert_eq!(address_from_pins(&[true, false], "10011ba").unwrap(), 0x4D);
        assert_eq!(address_from_pins(&[false, true], "10011ba").unwrap(), 0x4E);
        assert_eq!(address_from_pins(&[false, false], "10011ba").unwrap(), 0x4C);
    }

    #[test]
    fn fixed_only_template() {
        assert_eq!(address_from_pins(&[], "0100111").unwrap(), 0x27);
    }

    #[test]
    fn missing_pin_is_rejected() {
        assert!(address_from_pins(&[true], "10011ba").is_err());
    }

    #[test]
    fn bad_template_characters_are_rejected() {
        assert!(address_from_pins(&[], "10x").is_err());
        assert!(address_from_pins(&[], "").is_err());
        assert!(address_from_pins(&[], "00000000").is_err());
    }

    #[test]
    fn inverse_recovers_pins() {
        let pins = pins_from_address(0x75, "1110cba").unwrap();
        assert_eq!(pins.as_slice(), &[true, false, true]);
    }

    #[test]
    fn inverse_rejects_mismatched_fixed_bits() {
        assert!(pins_from_address(0x27, "10011ba").is_err());
        assert!(pins_from_address(0xFF, "1110cba").is_err());
    }
}
