//! Log-line records emitted once per accepted window.
//!
//! ```text
//!   2026 10 16 14:03:07.512,0.0213,-0.0042,…,22.8731,0
//!   └──── local time ─────┘ └─ channels, 4 dp ─┘ └ trigger flag
//! ```

use core::fmt;

use chrono::{DateTime, Local};

use crate::sampling::AveragedReading;

/// `strftime` layout of the leading timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y %m %d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: DateTime<Local>,
    pub values: Vec<f64>,
    pub triggered: bool,
}

impl Record {
    pub fn new(timestamp: DateTime<Local>, reading: &AveragedReading, triggered: bool) -> Self {
        Self {
            timestamp,
            values: reading.values().to_vec(),
            triggered,
        }
    }

    /// Stamp with the current local time.
    pub fn now(reading: &AveragedReading, triggered: bool) -> Self {
        Self::new(Local::now(), reading, triggered)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp.format(TIMESTAMP_FORMAT))?;
        for v in &self.values {
            write!(f, ",{v:.4}")?;
        }
        write!(f, ",{}", u8::from(self.triggered))
    }
}
