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

//! Scripted in-memory transport for unit tests.

pub mod test_utils {
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::bus::{BusIo, TransportConfig};
    use crate::error::{HalError, Result};
    use crate::flags::AccessFlags;
    use crate::mux::{MuxDevice, MuxDriver};
    use crate::smbus::{BusTransport, SmbusHandle};

    /// One recorded byte write, including writes that were scripted to
    /// fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriteOp {
        pub bus: u32,
        pub addr: u16,
        pub reg: u8,
        pub value: u8,
    }

    /// Shared fake-bus state: register contents, failure scripting and
    /// traffic counters.
    #[derive(Default)]
    pub struct StubState {
        registers: HashMap<(u32, u16, u8), u8>,
        words: HashMap<(u32, u16, u8), u16>,
        // Remaining failures per register / block offset.
        read_failures: HashMap<u8, u32>,
        read_attempts: HashMap<u8, u32>,
        failing_write_addrs: HashSet<u16>,
        failing_write_values: HashSet<u8>,
        fail_next_open: bool,
        writes: Vec<WriteOp>,
        block_requests: Vec<(u8, usize)>,
        opens: u32,
        closes: u32,
    }

    impl StubState {
        pub fn set_register(&mut self, bus: u32, addr: u16, reg: u8, value: u8) {
            self.registers.insert((bus, addr, reg), value);
        }

        pub fn register(&self, bus: u32, addr: u16, reg: u8) -> Option<u8> {
            self.registers.get(&(bus, addr, reg)).copied()
        }

        pub fn word(&self, bus: u32, addr: u16, reg: u8) -> Option<u16> {
            self.words.get(&(bus, addr, reg)).copied()
        }

        /// Make the next `count` reads of `reg` (or block reads starting
        /// at offset `reg`) fail with EIO.
        pub fn fail_reads(&mut self, reg: u8, count: u32) {
            self.read_failures.insert(reg, count);
        }

        pub fn read_attempts(&self, reg: u8) -> u32 {
            self.read_attempts.get(&reg).copied().unwrap_or(0)
        }

        /// Make every byte write to `addr` fail. The write is still
        /// recorded first, mirroring a NAK after the address phase.
        pub fn fail_writes_to_addr(&mut self, addr: u16) {
            self.failing_write_addrs.insert(addr);
        }

        /// Make every byte write carrying `value` fail, regardless of
        /// target.
        pub fn fail_writes_of_value(&mut self, value: u8) {
            self.failing_write_values.insert(value);
        }

        pub fn fail_next_open(&mut self) {
            self.fail_next_open = true;
        }

        pub fn writes(&self) -> Vec<WriteOp> {
            self.writes.clone()
        }

        pub fn clear_writes(&mut self) {
            self.writes.clear();
        }

        /// Byte writes only; word transfers are not counted.
        pub fn write_count(&self) -> usize {
            self.writes.len()
        }

        /// Every block read attempt as (offset, length).
        pub fn block_requests(&self) -> Vec<(u8, usize)> {
            self.block_requests.clone()
        }

        pub fn clear_block_requests(&mut self) {
            self.block_requests.clear();
        }

        pub fn open_count(&self) -> u32 {
            self.opens
        }

        /// Every successfully opened handle was dropped again.
        pub fn opens_balanced(&self) -> bool {
            self.opens == self.closes
        }

        fn consume_read_failure(&mut self, reg: u8) -> bool {
            match self.read_failures.get_mut(&reg) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        }
    }

    fn eio(what: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("scripted {} failure", what))
    }

    pub struct StubHandle {
        bus: u32,
        addr: u16,
        state: Arc<Mutex<StubState>>,
    }

    impl Drop for StubHandle {
        fn drop(&mut self) {
            self.state.lock().closes += 1;
        }
    }

    impl SmbusHandle for StubHandle {
        fn read_byte_data(&mut self, offset: u8) -> io::Result<u8> {
            let mut state = self.state.lock();
            *state.read_attempts.entry(offset).or_insert(0) += 1;
            if state.consume_read_failure(offset) {
                return Err(eio("read"));
            }
            Ok(state.register(self.bus, self.addr, offset).unwrap_or(0))
        }

        fn write_byte_data(&mut self, offset: u8, value: u8) -> io::Result<()> {
            let mut state = self.state.lock();
            state.writes.push(WriteOp {
                bus: self.bus,
                addr: self.addr,
                reg: offset,
                value,
            });
            if state.failing_write_addrs.contains(&self.addr)
                || state.failing_write_values.contains(&value)
            {
                return Err(eio("write"));
            }
            state.set_register(self.bus, self.addr, offset, value);
            Ok(())
        }

        fn read_word_data(&mut self, offset: u8) -> io::Result<u16> {
            let mut state = self.state.lock();
            if state.consume_read_failure(offset) {
                return Err(eio("word read"));
            }
            Ok(state.word(self.bus, self.addr, offset).unwrap_or(0))
        }

        fn write_word_data(&mut self, offset: u8, value: u16) -> io::Result<()> {
            let mut state = self.state.lock();
            if state.failing_write_addrs.contains(&self.addr) {
                return Err(eio("word write"));
            }
            state.words.insert((self.bus, self.addr, offset), value);
            Ok(())
        }

        fn read_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize> {
            self.read_i2c_block_data(offset, buf)
        }

        fn read_i2c_block_data(&mut self, offset: u8, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.state.lock();
            state.block_requests.push((offset, buf.len()));
            if state.consume_read_failure(offset) {
                return Err(eio("block read"));
            }
            for (i, slot) in buf.iter_mut().enumerate() {
                let reg = offset.wrapping_add(i as u8);
                *slot = state.register(self.bus, self.addr, reg).unwrap_or(0);
            }
            Ok(buf.len())
        }
    }

    /// Transport whose handles run against a shared [`StubState`].
    #[derive(Clone)]
    pub struct StubTransport {
        state: Arc<Mutex<StubState>>,
    }

    impl BusTransport for StubTransport {
        type Handle = StubHandle;

        fn open(&self, bus: u32, addr: u16, _flags: AccessFlags) -> Result<StubHandle> {
            let mut state = self.state.lock();
            if state.fail_next_open {
                state.fail_next_open = false;
                return Err(HalError::BusOpen {
                    bus,
                    source: eio("open"),
                });
            }
            state.opens += 1;
            Ok(StubHandle {
                bus,
                addr,
                state: Arc::clone(&self.state),
            })
        }
    }

    /// A [`BusIo`] over a fresh stub transport, plus the shared state for
    /// scripting and inspection.
    pub fn stub_bus() -> (BusIo<StubTransport>, Arc<Mutex<StubState>>) {
        let state = Arc::new(Mutex::new(StubState::default()));
        let transport = StubTransport {
            state: Arc::clone(&state),
        };
        (
            BusIo::with_transport(transport, TransportConfig::default()),
            state,
        )
    }

    /// Mux descriptor on bus 0 at `addr`.
    pub fn mux_at(addr: u16, driver: &'static MuxDriver) -> MuxDevice<'static> {
        MuxDevice {
            name: "mux",
            bus: 0,
            addr,
            driver,
        }
    }
}
