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

//! Shared bus lock: serializes bus access within a process and across
//! processes.
//!
//! Two layers, both required. The in-process mutex orders threads of one
//! daemon; the fcntl write lock on a shared lock file orders independent
//! daemons and CLI tools hitting the same physical bus. Callers construct
//! one [`SharedBusLock`] per bus domain and acquire it around every
//! transaction; the returned guard releases both layers when dropped.
//!
//! fcntl region locks are per-process, so the file layer alone cannot
//! order threads - that is what the mutex layer is for.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HalError, Result};

/// Shared-lock construction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Allow the same thread to acquire the lock recursively; the file
    /// lock is released only when the outermost guard goes away.
    pub reentrant: bool,
}

enum ProcessLock {
    Plain(Mutex<()>),
    /// The cell tracks recursion depth for the file-lock layer.
    Reentrant(ReentrantMutex<Cell<u32>>),
}

enum ProcessGuard<'a> {
    Plain(MutexGuard<'a, ()>),
    Reentrant(ReentrantMutexGuard<'a, Cell<u32>>),
}

/// Process- and system-wide mutual exclusion for one bus domain.
pub struct SharedBusLock {
    file: File,
    path: PathBuf,
    inner: ProcessLock,
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn whole_file_lock(l_type: libc::c_short) -> libc::flock {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = l_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = 0;
    fl.l_len = 0; // to EOF
    fl
}

fn is_contention(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAGAIN) | Some(libc::EACCES)
    )
}

impl SharedBusLock {
    /// Open or create the lock file and build the in-process layer.
    pub fn new(path: impl AsRef<Path>, options: LockOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .custom_flags(libc::O_CLOEXEC)
            .open(&path)
            .map_err(|source| HalError::LockFile {
                path: path.clone(),
                source,
            })?;

        let inner = if options.reentrant {
            ProcessLock::Reentrant(ReentrantMutex::new(Cell::new(0)))
        } else {
            ProcessLock::Plain(Mutex::new(()))
        };

        Ok(SharedBusLock { file, path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fcntl(&self, fl: &mut libc::flock) -> io::Result<()> {
        let rv = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_SETLK, fl) };
        if rv == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn try_lock_file(&self) -> io::Result<()> {
        self.fcntl(&mut whole_file_lock(libc::F_WRLCK as libc::c_short))
    }

    fn unlock_file(&self) -> io::Result<()> {
        self.fcntl(&mut whole_file_lock(libc::F_UNLCK as libc::c_short))
    }

    fn lock_in_process(&self) -> ProcessGuard<'_> {
        match &self.inner {
            ProcessLock::Plain(m) => ProcessGuard::Plain(m.lock()),
            ProcessLock::Reentrant(m) => ProcessGuard::Reentrant(m.lock()),
        }
    }

    /// Take the file lock unless a re-entrant outer guard already holds
    /// it, then bump the recursion depth.
    fn lock_file_for(&self, inner: &ProcessGuard<'_>) -> Result<()> {
        match inner {
            ProcessGuard::Plain(_) => self.try_lock_file().map_err(Self::classify)?,
            ProcessGuard::Reentrant(depth) => {
                if depth.get() == 0 {
                    self.try_lock_file().map_err(Self::classify)?;
                }
                depth.set(depth.get() + 1);
            }
        }
        Ok(())
    }

    fn classify(source: io::Error) -> HalError {
        if is_contention(&source) {
            HalError::LockContended { source }
        } else {
            HalError::LockAcquire { source }
        }
    }

    /// Acquire both layers. The in-process mutex blocks; the file lock is
    /// attempted exactly once, and contention from another process is an
    /// error rather than a wait (use [`timed_acquire`](Self::timed_acquire)
    /// to wait with a bound).
    pub fn acquire(&self) -> Result<BusLockGuard<'_>> {
        let inner = self.lock_in_process();
        // On error the in-process guard drops here, releasing the mutex.
        self.lock_file_for(&inner)?;
        Ok(BusLockGuard {
            lock: self,
            inner: Some(inner),
            released: false,
        })
    }

    /// Acquire with a deadline covering both layers. The file lock is
    /// polled at a short interval until it is taken or the deadline
    /// passes.
    pub fn timed_acquire(&self, timeout: Duration) -> Result<BusLockGuard<'_>> {
        let deadline = Instant::now() + timeout;

        let inner = match &self.inner {
            ProcessLock::Plain(m) => m
                .try_lock_for(timeout)
                .map(ProcessGuard::Plain)
                .ok_or(HalError::LockTimeout)?,
            ProcessLock::Reentrant(m) => m
                .try_lock_for(timeout)
                .map(ProcessGuard::Reentrant)
                .ok_or(HalError::LockTimeout)?,
        };

        let held_by_outer_guard = matches!(&inner, ProcessGuard::Reentrant(d) if d.get() > 0);
        if !held_by_outer_guard {
            loop {
                match self.try_lock_file() {
                    Ok(()) => break,
                    Err(e) if is_contention(&e) => {
                        if Instant::now() >= deadline {
                            return Err(HalError::LockTimeout);
                        }
                        thread::sleep(LOCK_POLL_INTERVAL);
                    }
                    Err(source) => return Err(HalError::LockAcquire { source }),
                }
            }
        }
        if let ProcessGuard::Reentrant(depth) = &inner {
            depth.set(depth.get() + 1);
        }

        Ok(BusLockGuard {
            lock: self,
            inner: Some(inner),
            released: false,
        })
    }
}

/// Scoped holder of both lock layers. Dropping releases them; use
/// [`release`](Self::release) instead when the unlock result matters.
pub struct BusLockGuard<'a> {
    lock: &'a SharedBusLock,
    inner: Option<ProcessGuard<'a>>,
    released: bool,
}

impl BusLockGuard<'_> {
    /// Release both layers, surfacing any file-unlock failure.
    pub fn release(mut self) -> Result<()> {
        let rv = self.release_inner();
        self.released = true;
        rv
    }

    fn release_inner(&mut self) -> Result<()> {
        let unlock_file_now = match self.inner.as_ref() {
            Some(ProcessGuard::Plain(_)) => true,
            Some(ProcessGuard::Reentrant(depth)) => {
                let d = depth.get().saturating_sub(1);
                depth.set(d);
                d == 0
            }
            None => false,
        };

        let rv = if unlock_file_now {
            self.lock
                .unlock_file()
                .map_err(|source| HalError::LockRelease { source })
        } else {
            Ok(())
        };

        // Dropping the guard releases the in-process mutex after the file
        // lock is gone, mirroring the acquisition order.
        self.inner = None;
        rv
    }
}

impl Drop for BusLockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_inner() {
                warn!(
                    path = %self.lock.path.display(),
                    "failed to release bus lock: {}", e
                );
            }
        }
    }
}
