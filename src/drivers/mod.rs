//! Peripheral drivers and task plumbing.
//!
//! | Driver     | Peripheral                                   |
//! |------------|----------------------------------------------|
//! | `actuator` | Active-high relay/SSR line (OutputPin)       |
//! | `dac`      | DAC8574 quad 16-bit DAC on I2C               |
//! | `trigger`  | Rising-edge trigger input (InputPin)         |
//! | `task`     | Named OS threads for the long-running tasks  |

pub mod actuator;
pub mod dac;
pub mod task;
pub mod trigger;
