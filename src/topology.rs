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

//! Front-panel port mux topology for the 64-port board.
//!
//! Reaching a transceiver takes two mux hops on the root bus: a CPU-side
//! mux at 0x70 routes the connector half (channel 2 for ports 1-32,
//! channel 6 for 33-64), then one of four board-side muxes at 0x74-0x77
//! routes the individual port. The board wiring is irregular, so the
//! port assignment is a literal table rather than a formula; ports in
//! opposite connector halves are wired pairwise onto the same board
//! channel (1 and 33, 14 and 47, and so on).
//!
//! Lookups are validated: a port outside the table is an explicit
//! [`HalError::UnmappedPort`], never a silent default route.

use crate::bus::BusIo;
use crate::error::{HalError, Result};
use crate::mux::{ChannelChain, MuxChannel, MuxDevice, PCA9548};
use crate::smbus::BusTransport;

/// Root bus both mux levels sit on.
pub const CPU_MUX_BUS: u32 = 0;
/// CPU-side mux address.
pub const CPU_MUX_ADDR: u16 = 0x70;
/// Number of front-panel ports.
pub const PORT_COUNT: u32 = 64;

/// (board mux address, board mux channel), port n at index n - 1.
const PORT_CHANNELS: [(u16, i32); PORT_COUNT as usize] = [
    (0x74, 0), // port 1
    (0x74, 1),
    (0x74, 2),
    (0x74, 3),
    (0x74, 4),
    (0x74, 5),
    (0x74, 6),
    (0x74, 7),
    (0x75, 5), // port 9
    (0x75, 4),
    (0x75, 7),
    (0x75, 6),
    (0x75, 1),
    (0x75, 0),
    (0x75, 3),
    (0x75, 2),
    (0x76, 0), // port 17
    (0x76, 1),
    (0x77, 6),
    (0x77, 7),
    (0x76, 5),
    (0x76, 4),
    (0x76, 7),
    (0x76, 6),
    (0x76, 3),
    (0x76, 2),
    (0x77, 2),
    (0x77, 3),
    (0x77, 0),
    (0x77, 1),
    (0x77, 5),
    (0x77, 4),
    (0x74, 0), // port 33
    (0x74, 1),
    (0x74, 2),
    (0x74, 3),
    (0x74, 4),
    (0x74, 5),
    (0x74, 6),
    (0x74, 7),
    (0x75, 2), // port 41
    (0x75, 3),
    (0x75, 4),
    (0x75, 5),
    (0x75, 6),
    (0x75, 7),
    (0x75, 0),
    (0x75, 1),
    (0x76, 6), // port 49
    (0x76, 7),
    (0x77, 7),
    (0x77, 6),
    (0x76, 2),
    (0x76, 3),
    (0x76, 0),
    (0x76, 1),
    (0x76, 5),
    (0x76, 4),
    (0x77, 0), // port 59
    (0x77, 1),
    (0x77, 2),
    (0x77, 3),
    (0x77, 4),
    (0x77, 5),
];

/// Resolved two-level mux route for one front-panel port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAssignment {
    pub cpu_channel: i32,
    pub board_addr: u16,
    pub board_channel: i32,
}

/// CPU-side mux descriptor.
pub fn cpu_mux() -> MuxDevice<'static> {
    MuxDevice {
        name: "cpu-mux",
        bus: CPU_MUX_BUS,
        addr: CPU_MUX_ADDR,
        driver: &PCA9548,
    }
}

/// Board-side mux descriptor at one of the four per-port-group addresses.
pub fn board_mux(addr: u16) -> MuxDevice<'static> {
    MuxDevice {
        name: "board-mux",
        bus: CPU_MUX_BUS,
        addr,
        driver: &PCA9548,
    }
}

/// Translate a front-panel port number (1-based) into its mux route.
pub fn port_assignment(port: u32) -> Result<PortAssignment> {
    if port < 1 || port > PORT_COUNT {
        return Err(HalError::UnmappedPort(port));
    }
    let (board_addr, board_channel) = PORT_CHANNELS[(port - 1) as usize];
    let cpu_channel = if port <= 32 { 2 } else { 6 };
    Ok(PortAssignment {
        cpu_channel,
        board_addr,
        board_channel,
    })
}

/// Build the CPU-then-board channel chain for a port.
pub fn port_chain(port: u32) -> Result<ChannelChain<'static>> {
    let assignment = port_assignment(port)?;
    Ok(ChannelChain::pair(
        MuxChannel {
            mux: cpu_mux(),
            channel: assignment.cpu_channel,
        },
        MuxChannel {
            mux: board_mux(assignment.board_addr),
            channel: assignment.board_channel,
        },
    ))
}

impl<T: BusTransport> BusIo<T> {
    /// Route both mux levels to a front-panel port.
    pub fn select_port(&self, port: u32) -> Result<()> {
        self.chain_select(&port_chain(port)?)
    }

    /// Park both mux levels, board mux first per the chain discipline.
    pub fn deselect_port(&self, port: u32) -> Result<()> {
        self.chain_deselect(&port_chain(port)?)
    }
}
