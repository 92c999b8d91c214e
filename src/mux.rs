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

//! Multiplexer selection and channel chains.
//!
//! Mux chips are described by immutable driver tables mapping a channel
//! number to the control byte that routes it. The tables are data, not
//! code, so chips with sequential encodings (PCA9547A) and one-hot
//! encodings (PCA9548) go through the same path. A [`ChannelChain`] is
//! the ordered list of mux selections needed to reach a device behind
//! cascaded muxes; selection order is ascending, deselection strictly
//! descending, because a parent mux must route before its children are
//! addressable.

use tracing::{debug, error};

use crate::bus::BusIo;
use crate::error::{HalError, Result};
use crate::flags::AccessFlags;
use crate::smbus::BusTransport;

/// Sentinel channel number meaning "route nothing" (mux idle). Every
/// driver table carries an entry for it.
pub const DESELECT_CHANNEL: i32 = -1;

/// Maximum cascade depth a [`ChannelChain`] can describe.
pub const MAX_CHAIN_DEPTH: usize = 4;

/// One row of a mux driver table: channel number and the control byte
/// that selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxChannelEntry {
    pub channel: i32,
    pub value: u8,
}

/// Immutable description of one mux chip model: its control register and
/// the channel table. Shared by every device instance of that model.
#[derive(Debug)]
pub struct MuxDriver {
    pub name: &'static str,
    pub control: u8,
    pub channels: &'static [MuxChannelEntry],
}

/// 8-channel mux with sequential control encoding (0x8..0xF, 0 = idle).
pub static PCA9547A: MuxDriver = MuxDriver {
    name: "PCA9547A",
    control: 0,
    channels: &[
        MuxChannelEntry { channel: -1, value: 0x0 },
        MuxChannelEntry { channel: 0, value: 0x8 },
        MuxChannelEntry { channel: 1, value: 0x9 },
        MuxChannelEntry { channel: 2, value: 0xA },
        MuxChannelEntry { channel: 3, value: 0xB },
        MuxChannelEntry { channel: 4, value: 0xC },
        MuxChannelEntry { channel: 5, value: 0xD },
        MuxChannelEntry { channel: 6, value: 0xE },
        MuxChannelEntry { channel: 7, value: 0xF },
    ],
};

/// 8-channel mux with one-hot control encoding (bit n = channel n).
pub static PCA9548: MuxDriver = MuxDriver {
    name: "PCA9548A",
    control: 0,
    channels: &[
        MuxChannelEntry { channel: -1, value: 0x00 },
        MuxChannelEntry { channel: 0, value: 0x01 },
        MuxChannelEntry { channel: 1, value: 0x02 },
        MuxChannelEntry { channel: 2, value: 0x04 },
        MuxChannelEntry { channel: 3, value: 0x08 },
        MuxChannelEntry { channel: 4, value: 0x10 },
        MuxChannelEntry { channel: 5, value: 0x20 },
        MuxChannelEntry { channel: 6, value: 0x40 },
        MuxChannelEntry { channel: 7, value: 0x80 },
    ],
};

/// One physical mux instance: where it sits and which driver table
/// describes it. Cheap to build per call; adapters construct these on
/// the stack from their board tables.
#[derive(Debug, Clone, Copy)]
pub struct MuxDevice<'a> {
    pub name: &'a str,
    pub bus: u32,
    pub addr: u16,
    pub driver: &'static MuxDriver,
}

/// A desired routing: select `mux` to `channel`.
#[derive(Debug, Clone, Copy)]
pub struct MuxChannel<'a> {
    pub mux: MuxDevice<'a>,
    pub channel: i32,
}

/// Ordered mux selections from the root bus down to a terminal device.
/// Unused slots stay `None`; populated slots are selected in ascending
/// slot order and deselected in descending order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelChain<'a> {
    pub slots: [Option<MuxChannel<'a>>; MAX_CHAIN_DEPTH],
}

impl<'a> ChannelChain<'a> {
    /// Chain with no mux hops (device sits directly on the root bus).
    pub const fn empty() -> Self {
        ChannelChain {
            slots: [None; MAX_CHAIN_DEPTH],
        }
    }

    /// Single-level chain.
    pub const fn single(mc: MuxChannel<'a>) -> Self {
        ChannelChain {
            slots: [Some(mc), None, None, None],
        }
    }

    /// Two-level chain: `outer` routes the segment `inner` lives on.
    pub const fn pair(outer: MuxChannel<'a>, inner: MuxChannel<'a>) -> Self {
        ChannelChain {
            slots: [Some(outer), Some(inner), None, None],
        }
    }

    /// Populated entries in slot order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MuxChannel<'a>> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<T: BusTransport> BusIo<T> {
    /// Route `dev` to `channel` by writing the matching control byte.
    ///
    /// A channel with no table entry fails with
    /// [`HalError::InvalidChannel`] before any bus traffic.
    pub fn mux_select(&self, dev: &MuxDevice<'_>, channel: i32) -> Result<()> {
        let entry = dev
            .driver
            .channels
            .iter()
            .find(|e| e.channel == channel)
            .ok_or(HalError::InvalidChannel {
                driver: dev.driver.name,
                channel,
            })?;

        debug!(
            device = dev.name,
            bus = dev.bus,
            addr = dev.addr,
            control = dev.driver.control,
            value = entry.value,
            channel,
            "selecting mux channel"
        );
        self.write_byte(
            dev.bus,
            dev.addr,
            dev.driver.control,
            entry.value,
            AccessFlags::empty(),
        )
        .map_err(|e| {
            error!(
                device = dev.name,
                bus = dev.bus,
                addr = dev.addr,
                channel,
                "mux channel select failed: {}",
                e
            );
            e
        })
    }

    /// Park `dev` on its idle entry.
    pub fn mux_deselect(&self, dev: &MuxDevice<'_>) -> Result<()> {
        self.mux_select(dev, DESELECT_CHANNEL)
    }

    /// Select every populated chain slot in ascending order. Stops at the
    /// first failure; slots already selected stay selected (see
    /// `chain_deselect` for why callers must not assume a clean bus after
    /// an error).
    pub fn chain_select(&self, chain: &ChannelChain<'_>) -> Result<()> {
        for mc in chain.iter() {
            self.mux_select(&mc.mux, mc.channel)?;
        }
        Ok(())
    }

    /// Deselect every populated chain slot in descending order, tearing
    /// the route down inner-mux-first. Stops at the first failure.
    pub fn chain_deselect(&self, chain: &ChannelChain<'_>) -> Result<()> {
        for mc in chain.iter().rev() {
            self.mux_deselect(&mc.mux)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::*;

    #[test]
    fn test_select_writes_control_byte() {
        let (io, state) = stub_bus();
        let dev = mux_at(0x70, &PCA9548);

        io.mux_select(&dev, 3).unwrap();
        let writes = state.lock().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            (writes[0].addr, writes[0].reg, writes[0].value),
            (0x70, 0, 0x08)
        );
    }

    #[test]
    fn test_sequential_encoding_differs_from_one_hot() {
        let (io, state) = stub_bus();

        io.mux_select(&mux_at(0x70, &PCA9547A), 3).unwrap();
        io.mux_select(&mux_at(0x71, &PCA9548), 3).unwrap();
        let writes = state.lock().writes();
        assert_eq!(writes[0].value, 0xB);
        assert_eq!(writes[1].value, 0x08);
    }

    #[test]
    fn test_deselect_sentinel_always_present() {
        let (io, state) = stub_bus();

        io.mux_deselect(&mux_at(0x70, &PCA9547A)).unwrap();
        io.mux_deselect(&mux_at(0x71, &PCA9548)).unwrap();
        let writes = state.lock().writes();
        assert_eq!(writes[0].value, 0x0);
        assert_eq!(writes[1].value, 0x00);
    }

    #[test]
    fn test_invalid_channel_touches_no_bus() {
        let (io, state) = stub_bus();
        let dev = mux_at(0x70, &PCA9548);

        let err = io.mux_select(&dev, 8);
        assert!(matches!(
            err,
            Err(HalError::InvalidChannel {
                driver: "PCA9548A",
                channel: 8
            })
        ));
        assert_eq!(state.lock().write_count(), 0);
        assert_eq!(state.lock().open_count(), 0);
    }

    #[test]
    fn test_driver_tables_carry_deselect_entry() {
        for driver in [&PCA9547A, &PCA9548] {
            assert!(
                driver.channels.iter().any(|e| e.channel == DESELECT_CHANNEL),
                "{} lacks the deselect sentinel",
                driver.name
            );
            assert_eq!(driver.channels.len(), 9);
        }
    }

    #[test]
    fn test_chain_select_ascending_deselect_descending() {
        let (io, state) = stub_bus();
        let chain = ChannelChain {
            slots: [
                Some(MuxChannel { mux: mux_at(0x70, &PCA9548), channel: 0 }),
                Some(MuxChannel { mux: mux_at(0x71, &PCA9548), channel: 1 }),
                Some(MuxChannel { mux: mux_at(0x72, &PCA9548), channel: 2 }),
                Some(MuxChannel { mux: mux_at(0x73, &PCA9548), channel: 3 }),
            ],
        };

        io.chain_select(&chain).unwrap();
        let select_order: Vec<u16> = state.lock().writes().iter().map(|w| w.addr).collect();
        assert_eq!(select_order, vec![0x70, 0x71, 0x72, 0x73]);

        state.lock().clear_writes();
        io.chain_deselect(&chain).unwrap();
        let deselect_order: Vec<u16> = state.lock().writes().iter().map(|w| w.addr).collect();
        assert_eq!(deselect_order, vec![0x73, 0x72, 0x71, 0x70]);
    }

    #[test]
    fn test_chain_skips_empty_slots() {
        let (io, state) = stub_bus();
        let chain = ChannelChain {
            slots: [
                Some(MuxChannel { mux: mux_at(0x70, &PCA9548), channel: 5 }),
                None,
                Some(MuxChannel { mux: mux_at(0x72, &PCA9548), channel: 6 }),
                None,
            ],
        };
        assert_eq!(chain.len(), 2);

        io.chain_select(&chain).unwrap();
        let order: Vec<u16> = state.lock().writes().iter().map(|w| w.addr).collect();
        assert_eq!(order, vec![0x70, 0x72]);
    }

    #[test]
    fn test_chain_select_stops_at_first_failure() {
        let (io, state) = stub_bus();
        state.lock().fail_writes_to_addr(0x71);
        let chain = ChannelChain {
            slots: [
                Some(MuxChannel { mux: mux_at(0x70, &PCA9548), channel: 0 }),
                Some(MuxChannel { mux: mux_at(0x71, &PCA9548), channel: 1 }),
                Some(MuxChannel { mux: mux_at(0x72, &PCA9548), channel: 2 }),
                None,
            ],
        };

        let err = io.chain_select(&chain);
        assert!(matches!(err, Err(HalError::Io { addr: 0x71, .. })));

        // Slot 0 stays selected: no rollback writes, and slot 2 was never
        // touched. Callers needing an idle bus must deselect explicitly.
        let writes = state.lock().writes();
        let attempted: Vec<u16> = writes.iter().map(|w| w.addr).collect();
        assert_eq!(attempted, vec![0x70, 0x71]);
        assert!(writes.iter().all(|w| w.value != 0x00));
    }

    #[test]
    fn test_empty_chain_is_a_no_op() {
        let (io, state) = stub_bus();
        let chain = ChannelChain::empty();
        assert!(chain.is_empty());

        io.chain_select(&chain).unwrap();
        io.chain_deselect(&chain).unwrap();
        assert_eq!(state.lock().write_count(), 0);
    }
}
