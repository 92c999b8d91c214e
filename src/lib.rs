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

//! chassis-hal - I2C/SMBus access core for switch chassis hardware
//!
//! This library provides the bus transport, multiplexer selection and
//! per-device transaction layer used by chassis component adapters
//! (fans, PSUs, thermal sensors, SFP ports). Sensor adapters build a
//! [`LogicalDevice`] describing the mux path to their chip and go through
//! [`BusIo`] for every transaction; the shared bus lock in [`lock`]
//! serializes access across threads and processes.

pub mod bus;
pub mod device;
pub mod error;
pub mod flags;
pub mod lock;
pub mod mux;
pub mod smbus;
pub mod topology;

#[cfg(test)]
pub mod test_utils;

pub use bus::{BusIo, I2cBus, TransportConfig};
pub use device::{DeviceChain, LogicalDevice};
pub use error::{HalError, Result};
pub use flags::AccessFlags;
pub use lock::{BusLockGuard, LockOptions, SharedBusLock};
pub use mux::{
    ChannelChain, MuxChannel, MuxChannelEntry, MuxDevice, MuxDriver, DESELECT_CHANNEL,
    MAX_CHAIN_DEPTH, PCA9547A, PCA9548,
};
pub use smbus::{BusTransport, I2cHandle, LinuxI2c, SmbusHandle, SMBUS_BLOCK_MAX};
pub use topology::{port_assignment, port_chain, PortAssignment, CPU_MUX_ADDR, PORT_COUNT};
