//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against the
//! simulated bus and recording pins. Everything runs on the host with no
//! real hardware required.

mod control_loop_tests;
mod mock_bus;
mod sampler_tests;
