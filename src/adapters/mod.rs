//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements   | Connects to                          |
//! |------------|--------------|--------------------------------------|
//! | `log_sink` | RecordSink   | `log` facade (target `record`)       |
//! | `linux`    | (bus, lines) | `/dev/i2c-*`, GPIO character device  |
//!
//! The bus sampler ([`crate::sensors::BusSampler`]), the actuator lines
//! and the trigger input are generic over `embedded-hal` traits, so the
//! Linux adapter only has to open the peripherals.

#[cfg(feature = "linux")]
pub mod linux;
pub mod log_sink;
