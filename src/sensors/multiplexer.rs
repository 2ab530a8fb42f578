//! TCA954x channel multiplexer with a single bus-access scope.
//!
//! ```text
//!   SamplingEngine ──scope(ch)──▶ [ Mutex< bus + current selection > ]
//!                                        │ rewrite mask only on change
//!                                        ▼
//!                                 TCA954x ── ch0 … ch7 ── HIH8121 @ 0x27
//! ```
//!
//! Devices behind the switch all answer on the same address, so every
//! transfer must happen inside a [`BusScope`] that guarantees the right
//! channel is connected. Devices on the upstream bus use `scope(None)`,
//! which locks without touching the selection.

use core::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use embedded_hal::i2c::I2c;
use log::{debug, warn};

use crate::error::{BusError, ConfigError, Error, Result};
use crate::protocol::tca954x::{self, ChannelSet, MuxFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxMode {
    Switch {
        family: MuxFamily,
        address: u8,
        verify: bool,
    },
    /// No switch chip; every device sits on the upstream bus.
    Passthrough,
}

struct MuxInner<I2C> {
    bus: I2C,
    /// Last mask known to be on the switch; `None` after any failed transfer.
    selected: Option<u8>,
}

pub struct ChannelMultiplexer<I2C> {
    mode: MuxMode,
    inner: Mutex<MuxInner<I2C>>,
}

/// Exclusive access to the bus with the requested channel connected.
pub struct BusScope<'a, I2C> {
    guard: MutexGuard<'a, MuxInner<I2C>>,
}

impl<I2C> Deref for BusScope<'_, I2C> {
    type Target = I2C;

    fn deref(&self) -> &I2C {
        &self.guard.bus
    }
}

impl<I2C> DerefMut for BusScope<'_, I2C> {
    fn deref_mut(&mut self) -> &mut I2C {
        &mut self.guard.bus
    }
}

impl<I2C> BusScope<'_, I2C> {
    /// Forget the cached selection so the next scope rewrites the switch.
    ///
    /// Call after a failed transfer: the switch may have reset underneath.
    pub fn invalidate(&mut self) {
        self.guard.selected = None;
    }
}

impl<I2C: I2c> ChannelMultiplexer<I2C> {
    /// Take ownership of `bus` behind a switch and disconnect every channel.
    pub fn new(bus: I2C, family: MuxFamily, address: u8, verify: bool) -> Result<Self> {
        family.validate_address(address)?;
        let mux = Self {
            mode: MuxMode::Switch {
                family,
                address,
                verify,
            },
            inner: Mutex::new(MuxInner {
                bus,
                selected: None,
            }),
        };
        mux.disable_all()?;
        Ok(mux)
    }

    /// A bus without a switch chip.
    pub fn passthrough(bus: I2C) -> Self {
        Self {
            mode: MuxMode::Passthrough,
            inner: Mutex::new(MuxInner {
                bus,
                selected: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MuxInner<I2C>>> {
        self.inner.lock().map_err(|_| Error::Bus(BusError::LockPoisoned))
    }

    fn write_mask(&self, inner: &mut MuxInner<I2C>, channels: &[u8]) -> Result<()> {
        let MuxMode::Switch {
            family,
            address,
            verify,
        } = self.mode
        else {
            if channels.is_empty() {
                return Ok(());
            }
            return Err(ConfigError::Invalid("channel requested on a bus without a switch").into());
        };

        let mask = tca954x::encode_mux_channel_mask(family, channels)?;
        if inner.selected == Some(mask) {
            return Ok(());
        }
        inner.selected = None;
        inner
            .bus
            .write(address, &[mask])
            .map_err(|e| BusError::transfer(address, &e))?;

        if verify {
            let mut back = [0u8];
            inner
                .bus
                .read(address, &mut back)
                .map_err(|e| BusError::transfer(address, &e))?;
            let wanted = tca954x::decode_mux_channel_mask(family, mask);
            if tca954x::decode_mux_channel_mask(family, back[0]) != wanted {
                warn!("Mux: read-back 0x{:02X} after writing 0x{:02X}", back[0], mask);
                return Err(BusError::MuxMismatch {
                    expected: mask,
                    actual: back[0],
                }
                .into());
            }
        }
        debug!("Mux: selected mask 0x{:02X}", mask);
        inner.selected = Some(mask);
        Ok(())
    }

    /// Connect exactly `channels` to the upstream bus.
    pub fn select(&self, channels: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        self.write_mask(&mut inner, channels)
    }

    /// Disconnect every downstream channel.
    pub fn disable_all(&self) -> Result<()> {
        self.select(&[])
    }

    /// Channels the switch reports as connected.
    pub fn read_back(&self) -> Result<ChannelSet> {
        let MuxMode::Switch { family, address, .. } = self.mode else {
            return Ok(ChannelSet::new());
        };
        let mut inner = self.lock()?;
        let mut back = [0u8];
        inner
            .bus
            .read(address, &mut back)
            .map_err(|e| BusError::transfer(address, &e))?;
        Ok(tca954x::decode_mux_channel_mask(family, back[0]))
    }

    /// Lock the bus, connecting `channel` first if one is given.
    pub fn scope(&self, channel: Option<u8>) -> Result<BusScope<'_, I2C>> {
        let mut guard = self.lock()?;
        if let Some(ch) = channel {
            self.write_mask(&mut guard, &[ch])?;
        }
        Ok(BusScope { guard })
    }

    /// Number of downstream channels, 0 without a switch.
    pub fn channel_count(&self) -> u8 {
        match self.mode {
            MuxMode::Switch { family, .. } => family.channels(),
            MuxMode::Passthrough => 0,
        }
    }

    /// Give the bus back, e.g. to inspect a simulated bus after a run.
    pub fn into_bus(self) -> Result<I2C> {
        self.inner
            .into_inner()
            .map(|inner| inner.bus)
            .map_err(|_| Error::Bus(BusError::LockPoisoned))
    }
}
