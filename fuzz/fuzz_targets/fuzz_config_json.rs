//! Fuzz target: `SystemConfig::from_json` + `validate`
//!
//! Arbitrary text must either be rejected or yield a configuration whose
//! runtime values satisfy the invariants the tasks rely on.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use thermolog::config::SystemConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = SystemConfig::from_json(text) else {
        return;
    };
    if let Ok(rt) = config.validate() {
        assert!(!rt.descriptors.is_empty());
        assert!(!rt.sampling.meas_period.is_zero());
        assert!(rt.sampling.avg_period >= rt.sampling.meas_period);
        assert!(rt.sampling.discard_leading_ticks < rt.sampling.ticks_per_window());
        assert!(rt.control.estimate_channels.iter().all(|&c| c < rt.descriptors.len()));
        assert!(rt.record_every >= 1);
    }
});
