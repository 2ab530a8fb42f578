//! Port traits: the boundary between the regulator's logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ MeasurementTask / ActuatorScheduler
//! ```
//!
//! Driven adapters (bus sampler, output lines, trigger input, record
//! writer) implement these traits. The tasks consume them via generics,
//! so the control logic never touches hardware directly and every task
//! runs against simulated ports in tests.

use std::time::Duration;

use crate::channels::CancelToken;
use crate::error::Result;
use crate::record::Record;
use crate::sensors::RawSample;
use crate::sensors::descriptor::DeviceDescriptor;

// ───────────────────────────────────────────────────────────────
// Sample port (driven adapter: sensors → domain)
// ───────────────────────────────────────────────────────────────

/// Read side: one [`RawSample`] per configured channel.
pub trait SamplePort {
    /// Channel descriptors, in record order.
    fn channels(&self) -> &[DeviceDescriptor];

    /// Start first conversions on pipelined sensors.
    fn prime(&mut self) -> Result<()>;

    /// Read channel `index` (an index into [`channels`](Self::channels)).
    fn read(&mut self, index: usize) -> Result<RawSample>;
}

// ───────────────────────────────────────────────────────────────
// Record sink port (driven adapter: domain → log / file)
// ───────────────────────────────────────────────────────────────

/// Receives every record the measurement task decides to keep.
pub trait RecordSink {
    fn write(&mut self, record: &Record);
}

// ───────────────────────────────────────────────────────────────
// Trigger port (driven adapter: external input → domain)
// ───────────────────────────────────────────────────────────────

/// External trigger checked before every window.
pub trait TriggerSource {
    /// Wait up to `timeout` for a rising edge. `true` if one arrived.
    ///
    /// Returns `false` early once `cancel` fires.
    fn wait_for_trigger(&mut self, timeout: Duration, cancel: &CancelToken) -> bool;
}

impl<T: TriggerSource + ?Sized> TriggerSource for Box<T> {
    fn wait_for_trigger(&mut self, timeout: Duration, cancel: &CancelToken) -> bool {
        (**self).wait_for_trigger(timeout, cancel)
    }
}

/// Trigger source for setups without a trigger input.
pub struct NoTrigger;

impl TriggerSource for NoTrigger {
    fn wait_for_trigger(&mut self, _timeout: Duration, _cancel: &CancelToken) -> bool {
        false
    }
}

// ───────────────────────────────────────────────────────────────
// Safe-off port (driven adapter: supervisor → actuator lines)
// ───────────────────────────────────────────────────────────────

/// Anything the supervisor can force into its safe (off) state, from any
/// thread, regardless of what the owning task is doing.
pub trait SafeOff: Send + Sync {
    fn force_off(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}
