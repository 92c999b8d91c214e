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

//! Bus transport: retried byte reads, chunked block reads, byte writes and
//! word transfers against one target device.
//!
//! Every operation opens its own handle through the injected
//! [`BusTransport`] and drops it before returning, success or failure.
//! Only reads are retried; a write that fails has possibly reached the
//! device and repeating it blindly could double-apply a side effect.

use std::io;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{HalError, Result};
use crate::flags::AccessFlags;
use crate::smbus::{BusTransport, LinuxI2c, SmbusHandle, SMBUS_BLOCK_MAX};

/// Tunable transport behavior. The defaults match the board support
/// packages this library grew out of: 16 read attempts, 32-byte chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Attempts per byte or block chunk read before giving up.
    pub read_retries: u32,
    /// Largest single block transfer; clamped to the SMBus maximum.
    pub block_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            read_retries: 16,
            block_size: SMBUS_BLOCK_MAX,
        }
    }
}

/// Bus I/O engine over an injected transport.
///
/// Sensor, PSU and SFP adapters keep one of these (usually the
/// [`I2cBus`] alias) and route every transaction through it. The engine
/// holds no handles and no bus state between operations.
pub struct BusIo<T: BusTransport> {
    transport: T,
    config: TransportConfig,
}

/// The production configuration: kernel i2c-dev transport.
pub type I2cBus = BusIo<LinuxI2c>;

impl BusIo<LinuxI2c> {
    pub fn new() -> Self {
        BusIo::with_transport(LinuxI2c, TransportConfig::default())
    }
}

impl Default for BusIo<LinuxI2c> {
    fn default() -> Self {
        BusIo::new()
    }
}

impl<T: BusTransport> BusIo<T> {
    pub fn with_transport(transport: T, config: TransportConfig) -> Self {
        BusIo { transport, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn open(&self, bus: u32, addr: u16, flags: AccessFlags) -> Result<T::Handle> {
        self.transport.open(bus, addr, flags)
    }

    fn read_attempts(&self, flags: AccessFlags) -> u32 {
        if flags.contains(AccessFlags::DISABLE_READ_RETRIES) {
            1
        } else {
            self.config.read_retries.max(1)
        }
    }

    /// Read `buf.len()` registers starting at `offset`, one byte at a
    /// time. Each register read gets the full retry budget.
    pub fn read(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        buf: &mut [u8],
        flags: AccessFlags,
    ) -> Result<()> {
        let mut handle = self.open(bus, addr, flags)?;
        let attempts = self.read_attempts(flags);

        for (i, slot) in buf.iter_mut().enumerate() {
            let reg = offset.wrapping_add(i as u8);
            match read_byte_with_retry(&mut handle, reg, attempts) {
                Ok(v) => *slot = v,
                Err(source) => {
                    error!(bus, addr, offset = reg, "register read failed: {}", source);
                    return Err(HalError::Io {
                        bus,
                        addr,
                        offset: reg,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `offset` in block transfers of
    /// at most `config.block_size` bytes. Each chunk is retried
    /// independently; the offset only advances past a successful chunk.
    pub fn block_read(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        buf: &mut [u8],
        flags: AccessFlags,
    ) -> Result<()> {
        let mut handle = self.open(bus, addr, flags)?;
        let attempts = self.read_attempts(flags);
        let chunk_size = self.config.block_size.clamp(1, SMBUS_BLOCK_MAX);

        let mut reg = offset;
        let mut pos = 0;
        while pos < buf.len() {
            let len = chunk_size.min(buf.len() - pos);
            let chunk = &mut buf[pos..pos + len];

            let mut result: io::Result<usize> =
                Err(io::Error::new(io::ErrorKind::Other, "block read not attempted"));
            for _ in 0..attempts {
                result = if flags.contains(AccessFlags::USE_SMBUS_BLOCK_READ) {
                    handle.read_block_data(reg, chunk)
                } else {
                    handle.read_i2c_block_data(reg, chunk)
                };
                if result.is_ok() {
                    break;
                }
            }

            let source = match result {
                Ok(n) if n == len => {
                    reg = reg.wrapping_add(len as u8);
                    pos += len;
                    continue;
                }
                Ok(n) => io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short block read: {} of {} bytes", n, len),
                ),
                Err(e) => e,
            };
            error!(
                bus,
                addr,
                offset = reg,
                size = len,
                "block read failed: {}",
                source
            );
            return Err(HalError::Io {
                bus,
                addr,
                offset: reg,
                source,
            });
        }
        Ok(())
    }

    /// Write `data` starting at `offset`, one register per byte. Writes
    /// are never retried.
    pub fn write(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        data: &[u8],
        flags: AccessFlags,
    ) -> Result<()> {
        let mut handle = self.open(bus, addr, flags)?;

        for (i, &byte) in data.iter().enumerate() {
            let reg = offset.wrapping_add(i as u8);
            if let Err(source) = handle.write_byte_data(reg, byte) {
                error!(bus, addr, offset = reg, "register write failed: {}", source);
                return Err(HalError::Io {
                    bus,
                    addr,
                    offset: reg,
                    source,
                });
            }
        }
        Ok(())
    }

    pub fn read_byte(&self, bus: u32, addr: u16, offset: u8, flags: AccessFlags) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(bus, addr, offset, &mut byte, flags)?;
        Ok(byte[0])
    }

    pub fn write_byte(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        byte: u8,
        flags: AccessFlags,
    ) -> Result<()> {
        self.write(bus, addr, offset, &[byte], flags)
    }

    /// 16-bit register read: one handle, one transaction, no retry.
    pub fn read_word(&self, bus: u32, addr: u16, offset: u8, flags: AccessFlags) -> Result<u16> {
        let mut handle = self.open(bus, addr, flags)?;
        handle.read_word_data(offset).map_err(|source| {
            error!(bus, addr, offset, "word read failed: {}", source);
            HalError::Io {
                bus,
                addr,
                offset,
                source,
            }
        })
    }

    /// 16-bit register write: one handle, one transaction, no retry.
    pub fn write_word(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        word: u16,
        flags: AccessFlags,
    ) -> Result<()> {
        let mut handle = self.open(bus, addr, flags)?;
        handle.write_word_data(offset, word).map_err(|source| {
            error!(bus, addr, offset, "word write failed: {}", source);
            HalError::Io {
                bus,
                addr,
                offset,
                source,
            }
        })
    }

    /// Read-modify-write: `value = (value & and_mask) | or_mask`.
    ///
    /// The two halves are separate bus transactions; if the read fails the
    /// write never happens, but nothing makes the pair atomic. Callers
    /// racing on the same register must serialize through the shared bus
    /// lock.
    pub fn modify_byte(
        &self,
        bus: u32,
        addr: u16,
        offset: u8,
        and_mask: u8,
        or_mask: u8,
        flags: AccessFlags,
    ) -> Result<()> {
        let value = self.read_byte(bus, addr, offset, flags)?;
        self.write_byte(bus, addr, offset, (value & and_mask) | or_mask, flags)
    }
}

fn read_byte_with_retry<H: SmbusHandle>(handle: &mut H, reg: u8, attempts: u32) -> io::Result<u8> {
    let mut last = io::Error::new(io::ErrorKind::Other, "read not attempted");
    for _ in 0..attempts {
        match handle.read_byte_data(reg) {
            Ok(v) => return Ok(v),
            Err(e) => last = e,
        }
    }
    Err(last)
}
