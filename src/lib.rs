//! thermolog library.
//!
//! Samples I2C environmental sensors at a fixed cadence, averages each
//! window into one record, runs a filtered-error thermal control law on
//! the result, and time-proportions a cooling and a heating output.
//!
//! Everything is generic over `embedded-hal` traits; the Linux bindings
//! live behind the `linux` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod channels;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod protocol;
pub mod record;
pub mod sampling;
pub mod scheduler;
pub mod sensors;
pub mod supervisor;

pub use error::{Error, Result};
