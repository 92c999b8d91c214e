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

//! Linux /dev/i2c-N access layer.
//!
//! Wraps the kernel i2c-dev ioctl interface: handle configuration
//! (addressing mode, PEC, address claim) and the SMBus data transfer
//! protocols. Everything above this module goes through the
//! [`BusTransport`]/[`SmbusHandle`] traits so tests can substitute a
//! scripted transport.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

use tracing::error;

use crate::error::{HalError, Result};
use crate::flags::AccessFlags;

// ioctl requests from linux/i2c-dev.h
const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_TENBIT: libc::c_ulong = 0x0704;
const I2C_SLAVE_FORCE: libc::c_ulong = 0x0706;
const I2C_PEC: libc::c_ulong = 0x0708;
const I2C_SMBUS: libc::c_ulong = 0x0720;

const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_READ: u8 = 1;

// SMBus transaction types from linux/i2c.h
const I2C_SMBUS_BYTE_DATA: u32 = 2;
const I2C_SMBUS_WORD_DATA: u32 = 3;
const I2C_SMBUS_BLOCK_DATA: u32 = 5;
const I2C_SMBUS_I2C_BLOCK_DATA: u32 = 8;

/// Largest transfer the SMBus block protocols allow.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// Mirror of the kernel's i2c_smbus_data union. Byte and word values live
/// at the start of the buffer in native byte order; block transfers carry
/// their length in `block[0]` and payload from `block[1]`.
#[repr(C)]
struct SmbusData {
    block: [u8; SMBUS_BLOCK_MAX + 2],
}

impl SmbusData {
    fn zeroed() -> Self {
        SmbusData {
            block: [0; SMBUS_BLOCK_MAX + 2],
        }
    }

    fn word(&self) -> u16 {
        u16::from_ne_bytes([self.block[0], self.block[1]])
    }

    fn set_word(&mut self, value: u16) {
        let bytes = value.to_ne_bytes();
        self.block[0] = bytes[0];
        self.block[1] = bytes[1];
    }
}

#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

fn ioctl_arg(fd: libc::c_int, request: libc::c_ulong, arg: libc::c_ulong) -> io::Result<()> {
    let rv = unsafe { libc::ioctl(fd, request, arg) };
    if rv == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn smbus_access(
    fd: libc::c_int,
    read_write: u8,
    command: u8,
    size: u32,
    data: &mut SmbusData,
) -> io::Result<()> {
    let mut args = SmbusIoctlData {
        read_write,
        command,
        size,
        data: data as *mut SmbusData,
    };
    let rv = unsafe { libc::ioctl(fd, I2C_SMBUS, &mut args as *mut SmbusIoctlData) };
    if rv == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// SMBus data transfer operations on one open, configured handle.
pub trait SmbusHandle {
    fn read_byte_data(&mut self, offset: u8) -> io::Result<u8>;
    fn write_byte_data(&mut self, offset: u8, value: u8) -> io::Result<()>;
    fn read_word_data(&mut self, offset: u8) -> io::Result<u16>;
    fn write_word_data(&mut self, offset: u8, value: u16) -> io::Result<()>;
    /// SMBus block read: the device reports the byte count. Returns the
    /// number of bytes copied into `buf`.
    fn read_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize>;
    /// I2C block read of exactly `buf.len()` bytes (at most
    /// [`SMBUS_BLOCK_MAX`]).
    fn read_i2c_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens a fresh, fully configured handle for a single transaction.
///
/// Handles are never cached or shared: each transport operation opens one,
/// uses it, and drops it, so a mux route established for one transaction
/// can never bleed into another through a stale descriptor.
pub trait BusTransport {
    type Handle: SmbusHandle;

    fn open(&self, bus: u32, addr: u16, flags: AccessFlags) -> Result<Self::Handle>;
}

/// An open `/dev/i2c-N` descriptor claimed for one target address.
///
/// The descriptor closes when the handle drops, which covers every error
/// path above this layer as well as the partially-configured case inside
/// [`LinuxI2c::open`].
pub struct I2cHandle {
    file: File,
}

impl I2cHandle {
    fn fd(&self) -> libc::c_int {
        self.file.as_raw_fd()
    }
}

impl SmbusHandle for I2cHandle {
    fn read_byte_data(&mut self, offset: u8) -> io::Result<u8> {
        let mut data = SmbusData::zeroed();
        smbus_access(
            self.fd(),
            I2C_SMBUS_READ,
            offset,
            I2C_SMBUS_BYTE_DATA,
            &mut data,
        )?;
        Ok(data.block[0])
    }

    fn write_byte_data(&mut self, offset: u8, value: u8) -> io::Result<()> {
        let mut data = SmbusData::zeroed();
        data.block[0] = value;
        smbus_access(
            self.fd(),
            I2C_SMBUS_WRITE,
            offset,
            I2C_SMBUS_BYTE_DATA,
            &mut data,
        )
    }

    fn read_word_data(&mut self, offset: u8) -> io::Result<u16> {
        let mut data = SmbusData::zeroed();
        smbus_access(
            self.fd(),
            I2C_SMBUS_READ,
            offset,
            I2C_SMBUS_WORD_DATA,
            &mut data,
        )?;
        Ok(data.word())
    }

    fn write_word_data(&mut self, offset: u8, value: u16) -> io::Result<()> {
        let mut data = SmbusData::zeroed();
        data.set_word(value);
        smbus_access(
            self.fd(),
            I2C_SMBUS_WRITE,
            offset,
            I2C_SMBUS_WORD_DATA,
            &mut data,
        )
    }

    fn read_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize> {
        let mut data = SmbusData::zeroed();
        smbus_access(
            self.fd(),
            I2C_SMBUS_READ,
            offset,
            I2C_SMBUS_BLOCK_DATA,
            &mut data,
        )?;
        let len = (data.block[0] as usize).min(buf.len()).min(SMBUS_BLOCK_MAX);
        buf[..len].copy_from_slice(&data.block[1..1 + len]);
        Ok(len)
    }

    fn read_i2c_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize> {
        if buf.len() > SMBUS_BLOCK_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("i2c block read of {} bytes exceeds {}", buf.len(), SMBUS_BLOCK_MAX),
            ));
        }
        let mut data = SmbusData::zeroed();
        data.block[0] = buf.len() as u8;
        smbus_access(
            self.fd(),
            I2C_SMBUS_READ,
            offset,
            I2C_SMBUS_I2C_BLOCK_DATA,
            &mut data,
        )?;
        buf.copy_from_slice(&data.block[1..1 + buf.len()]);
        Ok(buf.len())
    }
}

/// The real transport: kernel i2c-dev device files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxI2c;

impl BusTransport for LinuxI2c {
    type Handle = I2cHandle;

    fn open(&self, bus: u32, addr: u16, flags: AccessFlags) -> Result<I2cHandle> {
        let path = format!("/dev/i2c-{}", bus);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| {
                error!(bus, path = %path, "failed to open bus device: {}", source);
                HalError::BusOpen { bus, source }
            })?;
        let fd = file.as_raw_fd();

        // Set 10 or 7 bit mode
        let tenbit = libc::c_ulong::from(flags.contains(AccessFlags::TENBIT));
        ioctl_arg(fd, I2C_TENBIT, tenbit).map_err(|source| {
            error!(bus, tenbit, "failed to set addressing mode: {}", source);
            HalError::BusConfig {
                bus,
                what: "addressing mode",
                source,
            }
        })?;

        // Enable/Disable PEC
        let pec = libc::c_ulong::from(flags.contains(AccessFlags::PEC));
        ioctl_arg(fd, I2C_PEC, pec).map_err(|source| {
            error!(bus, pec, "failed to set PEC mode: {}", source);
            HalError::BusConfig {
                bus,
                what: "PEC mode",
                source,
            }
        })?;

        // Claim the target address, forcibly if requested
        let claim = if flags.contains(AccessFlags::FORCE) {
            I2C_SLAVE_FORCE
        } else {
            I2C_SLAVE
        };
        ioctl_arg(fd, claim, libc::c_ulong::from(addr)).map_err(|source| {
            error!(bus, addr, "failed to claim target address: {}", source);
            HalError::BusConfig {
                bus,
                what: "target address",
                source,
            }
        })?;

        // Any ioctl failure above dropped `file` and with it the
        // descriptor, so open is atomic: a handle or nothing.
        Ok(I2cHandle { file })
    }
}
