//! Unified error types for the enclosure regulator.
//!
//! A single `Error` enum that every subsystem converts into, so the task
//! bodies and the supervisor handle failures uniformly. All variants are
//! `Copy` so they can be handed across threads and logged without
//! allocation.

use core::fmt;

use embedded_hal::i2c::ErrorKind;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// Invalid device parameters, address or runtime configuration.
    Config(ConfigError),
    /// A bus transfer failed during a sampling tick.
    Bus(BusError),
    /// An averaged channel exceeded its sanity bound.
    OutlierRejected { channel: usize, value: f64 },
    /// An actuator output line could not be driven.
    Actuator(ActuatorError),
    /// A task could not be spawned or panicked.
    Task(&'static str),
}

impl Error {
    /// Errors that discard the current window but leave the system running.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Bus(_) | Self::OutlierRejected { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::OutlierRejected { channel, value } => {
                write!(f, "outlier rejected: channel {channel} = {value:.4}")
            }
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Task(msg) => write!(f, "task: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A register field does not fit its bit width.
    FieldOutOfRange { field: &'static str, value: u32, max: u32 },
    /// Address outside the range the device family answers on.
    InvalidAddress { family: &'static str, address: u8 },
    /// Address template malformed or inconsistent with the pins/address.
    InvalidTemplate(&'static str),
    /// Any other invalid parameter.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldOutOfRange { field, value, max } => {
                write!(f, "field '{field}' = {value} exceeds maximum {max}")
            }
            Self::InvalidAddress { family, address } => {
                write!(f, "address 0x{address:02X} invalid for {family}")
            }
            Self::InvalidTemplate(msg) => write!(f, "address template: {msg}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The I2C transfer itself failed.
    Transfer { address: u8, kind: ErrorKind },
    /// Multiplexer read-back disagrees with the mask just written.
    MuxMismatch { expected: u8, actual: u8 },
    /// A conversion did not complete within its polling budget.
    NotReady { address: u8 },
    /// A thread panicked while holding the bus.
    LockPoisoned,
}

impl BusError {
    /// Wrap a HAL error raised while talking to `address`.
    pub fn transfer<E: embedded_hal::i2c::Error>(address: u8, e: &E) -> Self {
        Self::Transfer {
            address,
            kind: e.kind(),
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer { address, kind } => {
                write!(f, "transfer to 0x{address:02X} failed: {kind}")
            }
            Self::MuxMismatch { expected, actual } => {
                write!(f, "mux read-back 0x{actual:02X}, expected 0x{expected:02X}")
            }
            Self::NotReady { address } => write!(f, "device 0x{address:02X} not ready"),
            Self::LockPoisoned => write!(f, "bus lock poisoned"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO set failed.
    GpioWriteFailed,
    /// The line's lock was poisoned by a panicking holder.
    LinePoisoned,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::LinePoisoned => write!(f, "output line lock poisoned"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
