//! I²C register access primitives.
//!
//! Thin wrapper over the Linux i2c-dev interface. Register reads are
//! best-effort: a transient bus error is logged and the caller gets zero,
//! matching the degrade-don't-stop policy of the whole board layer.

use std::io;
use std::os::fd::RawFd;

use tracing::warn;

use crate::error::{Error, Result};

/// `ioctl` request selecting the slave address on an i2c-dev fd.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// An open I²C slave device.
#[derive(Debug)]
pub struct I2cDev {
    fd: RawFd,
    path: &'static str,
}

impl I2cDev {
    /// Open the bus at `path` and select the slave `address`.
    pub fn open(path: &'static str, address: u8) -> Result<Self> {
        // SAFETY: plain open(2) on a NUL-terminated path built right here.
        let fd = unsafe {
            let cpath = std::ffi::CString::new(path).expect("device path contains NUL");
            libc::open(cpath.as_ptr(), libc::O_RDWR)
        };
        if fd < 0 {
            return Err(Error::HardwareAbsent {
                device: path,
                reason: io::Error::last_os_error(),
            });
        }

        // SAFETY: fd is valid; I2C_SLAVE takes the address as the argument.
        if unsafe { libc::ioctl(fd, I2C_SLAVE, libc::c_ulong::from(address)) } < 0 {
            let reason = io::Error::last_os_error();
            // SAFETY: fd was opened above and is not shared yet.
            unsafe { libc::close(fd) };
            return Err(Error::HardwareAbsent {
                device: path,
                reason,
            });
        }

        Ok(Self { fd, path })
    }

    /// Read one register. Returns 0 on a transient bus error.
    pub fn read_reg(&self, reg: u8) -> u8 {
        let mut byte = reg;
        // SAFETY: fd is owned by self; the buffer is a single local byte.
        let wrote = unsafe { libc::write(self.fd, (&raw const byte).cast(), 1) };
        if wrote != 1 {
            warn!("{}: register select failed", self.path);
            return 0;
        }
        // SAFETY: same single-byte buffer.
        let read = unsafe { libc::read(self.fd, (&raw mut byte).cast(), 1) };
        if read != 1 {
            warn!("{}: register read failed", self.path);
            return 0;
        }
        byte
    }

    /// Write one register. Returns false on error (logged).
    pub fn write_reg(&self, reg: u8, value: u8) -> bool {
        let buf = [reg, value];
        // SAFETY: fd is owned by self; buf lives across the call.
        let wrote = unsafe { libc::write(self.fd, buf.as_ptr().cast(), 2) };
        if wrote != 2 {
            warn!("{}: register write failed", self.path);
            return false;
        }
        true
    }
}

impl Drop for I2cDev {
    fn drop(&mut self) {
        // SAFETY: fd is owned and not closed elsewhere.
        unsafe { libc::close(self.fd) };
    }
}
