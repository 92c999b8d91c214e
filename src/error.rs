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

use std::io;
use std::path::PathBuf;

/// Result type alias using HalError
pub type Result<T> = std::result::Result<T, HalError>;

/// Unified error type for all chassis-hal operations
#[derive(thiserror::Error, Debug)]
pub enum HalError {
    /// The bus device file could not be opened.
    #[error("i2c-{bus}: failed to open bus device: {source}")]
    BusOpen {
        bus: u32,
        #[source]
        source: io::Error,
    },

    /// One of the configuration ioctls (addressing mode, PEC, address
    /// claim) was rejected after the bus device was opened.
    #[error("i2c-{bus}: failed to set {what}: {source}")]
    BusConfig {
        bus: u32,
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// A data transfer failed, after retries where the operation retries.
    #[error("i2c-{bus}: I/O at address 0x{addr:02x}, offset 0x{offset:02x} failed: {source}")]
    Io {
        bus: u32,
        addr: u16,
        offset: u8,
        #[source]
        source: io::Error,
    },

    /// The requested channel has no entry in the mux driver table.
    #[error("mux driver {driver}: channel {channel} not in channel table")]
    InvalidChannel { driver: &'static str, channel: i32 },

    /// The front-panel port number is outside the board mapping table.
    #[error("front-panel port {0} has no mux mapping")]
    UnmappedPort(u32),

    /// The operation is not implemented for this object class.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// The shared lock file could not be opened or created.
    #[error("failed to open lock file {path}: {source}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process holds the advisory region lock.
    #[error("bus lock held by another process: {source}")]
    LockContended {
        #[source]
        source: io::Error,
    },

    /// The advisory lock failed for a reason other than contention.
    #[error("failed to acquire bus lock: {source}")]
    LockAcquire {
        #[source]
        source: io::Error,
    },

    /// The deadline passed before the advisory lock could be taken.
    #[error("timed out waiting for bus lock")]
    LockTimeout,

    /// Releasing the advisory region lock failed.
    #[error("failed to release bus lock: {source}")]
    LockRelease {
        #[source]
        source: io::Error,
    },
}

impl HalError {
    /// Create a not-supported error from a string
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// True for any of the shared-lock failure classes.
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            Self::LockFile { .. }
                | Self::LockContended { .. }
                | Self::LockAcquire { .. }
                | Self::LockTimeout
                | Self::LockRelease { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_context() {
        let err = HalError::Io {
            bus: 3,
            addr: 0x50,
            offset: 0x2a,
            source: io::Error::new(io::ErrorKind::Other, "nack"),
        };
        let msg = err.to_string();
        assert!(msg.contains("i2c-3"));
        assert!(msg.contains("0x50"));
        assert!(msg.contains("0x2a"));
    }

    #[test]
    fn test_invalid_channel_display() {
        let err = HalError::InvalidChannel {
            driver: "PCA9548A",
            channel: 9,
        };
        assert_eq!(
            err.to_string(),
            "mux driver PCA9548A: channel 9 not in channel table"
        );
    }

    #[test]
    fn test_unmapped_port_display() {
        assert_eq!(
            HalError::UnmappedPort(65).to_string(),
            "front-panel port 65 has no mux mapping"
        );
    }

    #[test]
    fn test_is_lock_error() {
        assert!(HalError::LockTimeout.is_lock_error());
        assert!(HalError::LockContended {
            source: io::Error::from_raw_os_error(libc::EAGAIN)
        }
        .is_lock_error());
        assert!(!HalError::UnmappedPort(0).is_lock_error());
    }
}
