//! Simulated I2C bus for integration tests.
//!
//! Models one TCA954x switch, any number of ADS1x15 converters on the
//! upstream bus and HIH8121 sensors (all at 0x27) behind switch channels.
//! Conversions complete instantly. The bus handle is cheap to clone so a
//! test can inspect or perturb the state while the sampler owns the bus.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::convert::Infallible;
use std::time::Instant;

use thermolog::protocol::ads1x15::{self, AdcConfigRegister};
use thermolog::protocol::hih8121::{self, Calibration, SensorStatus};

// ── Simulated devices ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimAdc {
    /// Input voltage on AIN0..AIN3.
    pub inputs: [f64; 4],
    config: [u8; 2],
    conversion: [u8; 2],
    pointer: u8,
}

impl SimAdc {
    pub fn new(inputs: [f64; 4]) -> Self {
        Self {
            inputs,
            config: [0x85, 0x83],
            conversion: [0, 0],
            pointer: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&pointer, rest)) = bytes.split_first() else {
            return;
        };
        self.pointer = pointer;
        if pointer == ads1x15::REG_CONFIG && rest.len() == 2 {
            let reg = AdcConfigRegister::decode([rest[0], rest[1]]);
            // single-ended inputs only
            let volts = self.inputs[usize::from(reg.mux & 0b11)];
            self.conversion = ads1x15::encode_adc_reading(volts, reg.gain).unwrap_or([0, 0]);
            // conversion done: OS reads back as 1
            self.config = [rest[0] | 0x80, rest[1]];
        }
    }

    fn read(&self, buf: &mut [u8]) {
        let reg = if self.pointer == ads1x15::REG_CONFIG {
            self.config
        } else {
            self.conversion
        };
        for (dst, src) in buf.iter_mut().zip(reg) {
            *dst = src;
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimHih {
    pub humidity: f64,
    pub temperature: f64,
    pending: bool,
    pub requests: u32,
    pub fetches: u32,
}

impl SimHih {
    pub fn new(humidity: f64, temperature: f64) -> Self {
        Self {
            humidity,
            temperature,
            pending: false,
            requests: 0,
            fetches: 0,
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        let status = if self.pending {
            SensorStatus::Normal
        } else {
            SensorStatus::Stale
        };
        let frame = hih8121::encode_frame(
            status,
            Calibration::HUMIDITY.raw_for(self.humidity),
            Calibration::TEMPERATURE.raw_for(self.temperature),
        );
        for (dst, src) in buf.iter_mut().zip(frame) {
            *dst = src;
        }
        self.pending = false;
        self.fetches += 1;
    }
}

// ── Bus state ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimState {
    pub mux_address: u8,
    pub mux_mask: u8,
    pub mux_writes: u32,
    pub adcs: BTreeMap<u8, SimAdc>,
    /// HIH8121 per switch channel.
    pub hihs: BTreeMap<u8, SimHih>,
    /// Fail this many upcoming transactions.
    pub fail_next: u32,
    pub transactions: u64,
}

impl SimState {
    fn hih_behind_switch(&mut self) -> Option<&mut SimHih> {
        let mask = self.mux_mask;
        let mut selected = (0..8u8).filter(|ch| mask & (1 << ch) != 0);
        let ch = selected.next()?;
        if selected.next().is_some() {
            // two sensors answering at one address
            return None;
        }
        self.hihs.get_mut(&ch)
    }
}

#[derive(Clone, Default)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

#[allow(dead_code)]
impl SimBus {
    pub fn new(mux_address: u8) -> Self {
        let bus = Self::default();
        bus.state().mux_address = mux_address;
        bus
    }

    pub fn with_adc(self, address: u8, inputs: [f64; 4]) -> Self {
        self.state().adcs.insert(address, SimAdc::new(inputs));
        self
    }

    pub fn with_hih(self, channel: u8, humidity: f64, temperature: f64) -> Self {
        self.state().hihs.insert(channel, SimHih::new(humidity, temperature));
        self
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn set_temperature(&self, channel: u8, celsius: f64) {
        if let Some(h) = self.state().hihs.get_mut(&channel) {
            h.temperature = celsius;
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        let mut s = self.state();
        s.transactions += 1;
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(ErrorKind::Bus);
        }

        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        if address == s.mux_address {
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if let Some(&mask) = bytes.first() {
                            s.mux_mask = mask;
                            s.mux_writes += 1;
                        }
                    }
                    Operation::Read(buf) => buf.fill(s.mux_mask),
                }
            }
            return Ok(());
        }

        if let Some(adc) = s.adcs.get_mut(&address) {
            for op in operations {
                match op {
                    Operation::Write(bytes) => adc.write(bytes),
                    Operation::Read(buf) => adc.read(buf),
                }
            }
            return Ok(());
        }

        if address == hih8121::ADDRESS {
            let hih = s.hih_behind_switch().ok_or(nack)?;
            for op in operations {
                match op {
                    Operation::Write(_) => {
                        hih.pending = true;
                        hih.requests += 1;
                    }
                    Operation::Read(buf) => hih.read(buf),
                }
            }
            return Ok(());
        }

        Err(nack)
    }
}

// ── Recording output pin ──────────────────────────────────────

/// Records (time, level) on every write; clones share the trace.
#[derive(Clone, Default)]
pub struct TracePin {
    pub trace: Arc<Mutex<Vec<(Instant, bool)>>>,
}

#[allow(dead_code)]
impl TracePin {
    pub fn level(&self) -> bool {
        self.trace.lock().unwrap().last().is_some_and(|&(_, l)| l)
    }

    pub fn ever_high(&self) -> bool {
        self.trace.lock().unwrap().iter().any(|&(_, l)| l)
    }
}

impl PinErrorType for TracePin {
    type Error = Infallible;
}

impl OutputPin for TracePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.trace.lock().unwrap().push((Instant::now(), false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.trace.lock().unwrap().push((Instant::now(), true));
        Ok(())
    }
}
