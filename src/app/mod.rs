//! Application core: the measurement task and the ports it talks through.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping the task bodies testable without real
//! peripherals.

pub mod ports;
pub mod service;
