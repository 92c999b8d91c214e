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

use bitflags::bitflags;

bitflags! {
    /// Per-operation flag word accepted by every transport and facade call.
    ///
    /// The open-related bits (TENBIT, PEC, FORCE) configure the handle each
    /// operation opens for itself; the remaining bits tune read strategy
    /// and mux chain handling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        /// Address the target in 10-bit mode instead of 7-bit.
        const TENBIT = 1 << 0;
        /// Enable SMBus Packet Error Checking on the handle.
        const PEC = 1 << 1;
        /// Claim the target address even if another driver holds it.
        const FORCE = 1 << 2;
        /// Facade reads use the chunked block-read path instead of
        /// byte-at-a-time reads.
        const USE_BLOCK_READ = 1 << 3;
        /// Block chunks use the SMBus block-read protocol (device reports
        /// the byte count) instead of I2C block reads.
        const USE_SMBUS_BLOCK_READ = 1 << 4;
        /// Collapse the read retry budget to a single attempt.
        const DISABLE_READ_RETRIES = 1 << 5;
        /// Skip mux chain selection before the transaction.
        const NO_MUX_SELECT = 1 << 6;
        /// Skip mux chain deselection after the transaction.
        const NO_MUX_DESELECT = 1 << 7;
    }
}
