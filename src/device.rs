/*
 * This file is part of chassis-hal.
 *
 * Copyright (C) 2026 Chassis HAL contributors
 *
 * chassis-hal is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * chassis-hal is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with chassis-hal. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-device transaction facade.
//!
//! A [`LogicalDevice`] bundles a bus address with the mux chain that
//! reaches it. Facade operations select the chain, run the transport
//! operation, then deselect, with two deliberate asymmetries on the error
//! paths:
//!
//! - if selection fails, the data operation is skipped entirely;
//! - if the data operation fails, the chain is left selected so a caller
//!   can retry without re-paying the mux writes.
//!
//! A deselection failure after a successful data operation is reported as
//! the overall result, so callers distinguishing data errors from routing
//! errors must match on the variant, not just on `is_err()`.

use tracing::error;

use crate::bus::BusIo;
use crate::error::Result;
use crate::flags::AccessFlags;
use crate::mux::ChannelChain;
use crate::smbus::BusTransport;

/// Where a device's mux chain lives.
///
/// `Shared` lets several logical devices (a transceiver's EEPROM and its
/// diagnostics page, say) point at one chain describing the physical
/// topology; `Internal` keeps a private copy.
#[derive(Debug, Clone, Copy)]
pub enum DeviceChain<'a> {
    Internal(ChannelChain<'a>),
    Shared(&'a ChannelChain<'a>),
}

/// An addressable device and the mux path that reaches it.
#[derive(Debug, Clone, Copy)]
pub struct LogicalDevice<'a> {
    pub name: &'a str,
    pub bus: u32,
    pub addr: u16,
    pub chain: DeviceChain<'a>,
}

impl<'a> LogicalDevice<'a> {
    /// Device sitting directly on the root bus, no mux hops.
    pub fn direct(name: &'a str, bus: u32, addr: u16) -> Self {
        LogicalDevice {
            name,
            bus,
            addr,
            chain: DeviceChain::Internal(ChannelChain::empty()),
        }
    }

    /// The chain to route before transacting: a shared chain takes
    /// precedence over the device's own.
    pub fn chain(&self) -> &ChannelChain<'a> {
        match &self.chain {
            DeviceChain::Shared(chain) => chain,
            DeviceChain::Internal(chain) => chain,
        }
    }
}

impl<T: BusTransport> BusIo<T> {
    fn select_for(&self, dev: &LogicalDevice<'_>, flags: AccessFlags) -> Result<()> {
        if flags.contains(AccessFlags::NO_MUX_SELECT) {
            return Ok(());
        }
        self.chain_select(dev.chain())
    }

    fn deselect_for(&self, dev: &LogicalDevice<'_>, flags: AccessFlags) -> Result<()> {
        if flags.contains(AccessFlags::NO_MUX_DESELECT) {
            return Ok(());
        }
        self.chain_deselect(dev.chain())
    }

    /// Read `buf.len()` bytes from the device, routing the mux chain
    /// around the transfer. `USE_BLOCK_READ` switches to the chunked
    /// block path.
    pub fn dev_read(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        buf: &mut [u8],
        flags: AccessFlags,
    ) -> Result<()> {
        self.select_for(dev, flags)?;

        let rv = if flags.contains(AccessFlags::USE_BLOCK_READ) {
            self.block_read(dev.bus, dev.addr, offset, buf, flags)
        } else {
            self.read(dev.bus, dev.addr, offset, buf, flags)
        };
        if let Err(e) = rv {
            error!(device = dev.name, "read failed: {}", e);
            return Err(e);
        }

        self.deselect_for(dev, flags)
    }

    pub fn dev_write(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        data: &[u8],
        flags: AccessFlags,
    ) -> Result<()> {
        self.select_for(dev, flags)?;

        if let Err(e) = self.write(dev.bus, dev.addr, offset, data, flags) {
            error!(device = dev.name, "write failed: {}", e);
            return Err(e);
        }

        self.deselect_for(dev, flags)
    }

    pub fn dev_read_byte(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        flags: AccessFlags,
    ) -> Result<u8> {
        self.select_for(dev, flags)?;

        let value = match self.read_byte(dev.bus, dev.addr, offset, flags) {
            Ok(v) => v,
            Err(e) => {
                error!(device = dev.name, "byte read failed: {}", e);
                return Err(e);
            }
        };

        self.deselect_for(dev, flags)?;
        Ok(value)
    }

    pub fn dev_write_byte(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        byte: u8,
        flags: AccessFlags,
    ) -> Result<()> {
        self.select_for(dev, flags)?;

        if let Err(e) = self.write_byte(dev.bus, dev.addr, offset, byte, flags) {
            error!(device = dev.name, "byte write failed: {}", e);
            return Err(e);
        }

        self.deselect_for(dev, flags)
    }

    pub fn dev_read_word(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        flags: AccessFlags,
    ) -> Result<u16> {
        self.select_for(dev, flags)?;

        let value = match self.read_word(dev.bus, dev.addr, offset, flags) {
            Ok(v) => v,
            Err(e) => {
                error!(device = dev.name, "word read failed: {}", e);
                return Err(e);
            }
        };

        self.deselect_for(dev, flags)?;
        Ok(value)
    }

    pub fn dev_write_word(
        &self,
        dev: &LogicalDevice<'_>,
        offset: u8,
        word: u16,
        flags: AccessFlags,
    ) -> Result<()> {
        self.select_for(dev, flags)?;

        if let Err(e) = self.write_word(dev.bus, dev.addr, offset, word, flags) {
            error!(device = dev.name, "word write failed: {}", e);
            return Err(e);
        }

        self.deselect_for(dev, flags)
    }
}
