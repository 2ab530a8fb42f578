//! Fuzz target: register and frame decoders
//!
//! Feeds arbitrary bytes through every decoder that parses data read back
//! from a device, and checks that none of them panics and that decoded
//! values stay within their physical ranges.
//!
//! cargo fuzz run fuzz_protocol_decoders

#![no_main]

use libfuzzer_sys::fuzz_target;
use thermolog::protocol::ads1x15::{self, AdcConfigRegister};
use thermolog::protocol::dac8574;
use thermolog::protocol::hih8121;
use thermolog::protocol::tca954x::{self, MuxFamily};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let word = [data[0], data[1]];

    // ADC: any code decodes within ±full scale for every valid gain.
    for gain in 0..8u8 {
        let volts = ads1x15::decode_adc(word, gain).expect("gain 0..8 is valid");
        let fs = ads1x15::full_scale(gain).expect("gain 0..8 is valid");
        assert!(volts >= -fs && volts < fs, "volts {volts} outside ±{fs}");
    }
    let reg = AdcConfigRegister::decode(word);
    assert!(reg.mux <= 0b111 && reg.gain <= 0b111 && reg.rate <= 0b111 && reg.mode <= 1);
    // Re-encoding a decoded register reproduces the fields it carries.
    let again = AdcConfigRegister::decode(reg.encode().expect("decoded fields fit"));
    assert_eq!(again, reg);

    // HIH8121: calibrated values stay inside the datasheet ranges.
    let frame = hih8121::decode_humidity_temperature([data[0], data[1], data[2], data[3]]);
    assert!((0.0..=100.02).contains(&frame.humidity));
    assert!((-40.0..=125.02).contains(&frame.temperature));

    // DAC: a data word is always a fraction of full scale.
    let fraction = dac8574::decode_dac_code(word);
    assert!((0.0..=1.0).contains(&fraction));

    // Mux: decoded channels exist and re-encode to the same channel bits.
    for family in [MuxFamily::Tca9545a, MuxFamily::Tca9548a] {
        let channels = tca954x::decode_mux_channel_mask(family, data[0]);
        assert!(channels.iter().all(|&ch| ch < family.channels()));
        let mask = tca954x::encode_mux_channel_mask(family, &channels).expect("decoded channels exist");
        assert_eq!(tca954x::decode_mux_channel_mask(family, mask), channels);
    }
});
