//! GPIO surfaces: MCP23017 I²C expander plus the SoC's memory-mapped pins.
//!
//! Both banks read active-low on the wire and are presented active-high
//! here. The SoC block is reached through `/dev/mem`; ports are numbered
//! 1..=6 with up to 28 pins each.

use std::io;

use tracing::{debug, warn};

use super::i2c::I2cDev;
use crate::error::Error;

const MCP_BUS: &str = "/dev/i2c-1";
const MCP_ADDR: u8 = 0x20;

// MCP23017 register map (bank A / bank B pairs).
const MCP_IODIRA: u8 = 0x00;
const MCP_IODIRB: u8 = 0x01;
const MCP_GPPUA: u8 = 0x0C;
const MCP_GPPUB: u8 = 0x0D;
const MCP_GPIOA: u8 = 0x12;
const MCP_GPIOB: u8 = 0x13;

/// Physical base of the SoC GPIO register block.
const SOC_GPIO_BASE: usize = 0x01C2_0800;
/// Register stride per port.
const PORT_STRIDE: usize = 0x24;
/// Data register offset within a port.
const DATA_OFFSET: usize = 0x10;
/// Pull-register offset within a port.
const PULL_OFFSET: usize = 0x1C;
/// Bytes mapped from `/dev/mem`.
const MAP_LEN: usize = 65_536;

/// Pull configuration for a memory-mapped pin (2-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Disabled = 0,
    Up = 1,
    Down = 2,
}

/// Both GPIO banks behind one handle.
pub struct Gpio {
    mcp: Option<I2cDev>,
    mmap_base: *mut u8,
}

// SAFETY: the raw mapping pointer is only dereferenced through &self
// methods; register access is word-sized volatile. The handle lives on the
// coordination thread but may be constructed elsewhere.
unsafe impl Send for Gpio {}

impl Gpio {
    /// Open both banks, degrading independently.
    pub fn open() -> Self {
        let mcp = Self::open_mcp();
        let mmap_base = Self::open_mmap().unwrap_or(std::ptr::null_mut());
        Self { mcp, mmap_base }
    }

    fn open_mcp() -> Option<I2cDev> {
        let dev = match I2cDev::open(MCP_BUS, MCP_ADDR) {
            Ok(dev) => dev,
            Err(e) => {
                warn!("couldn't init external GPIO (MCP23017): {e}");
                return None;
            }
        };

        // The bus may open even with no expander fitted; verify with a
        // write the chip must accept.
        if !dev.write_reg(MCP_GPPUA, 0xFF) {
            warn!("couldn't communicate with MCP23017");
            return None;
        }

        // Default every pin to input with pullup.
        dev.write_reg(MCP_IODIRA, 0xFF);
        dev.write_reg(MCP_IODIRB, 0xFF);
        dev.write_reg(MCP_GPPUA, 0xFF);
        dev.write_reg(MCP_GPPUB, 0xFF);

        Some(dev)
    }

    fn open_mmap() -> Option<*mut u8> {
        let open = || -> Result<*mut u8, Error> {
            // SAFETY: plain open(2) of a static path.
            let fd = unsafe { libc::open(c"/dev/mem".as_ptr(), libc::O_RDWR | libc::O_SYNC) };
            if fd < 0 {
                return Err(Error::HardwareAbsent {
                    device: "/dev/mem",
                    reason: io::Error::last_os_error(),
                });
            }

            // SAFETY: mapping a page-aligned window over the GPIO block;
            // fd is closed immediately after (the mapping survives).
            let mapped = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    MAP_LEN,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    (SOC_GPIO_BASE & !0xFFFF) as libc::off_t,
                )
            };
            // SAFETY: fd opened above.
            unsafe { libc::close(fd) };

            if mapped == libc::MAP_FAILED {
                return Err(Error::HardwareAbsent {
                    device: "gpio mmap",
                    reason: io::Error::last_os_error(),
                });
            }

            Ok(unsafe { mapped.cast::<u8>().add(SOC_GPIO_BASE & 0xFFFF) })
        };

        match open() {
            Ok(base) => Some(base),
            Err(e) => {
                warn!("couldn't map SoC GPIO: {e}");
                None
            }
        }
    }

    pub fn mcp_present(&self) -> bool {
        self.mcp.is_some()
    }

    pub fn mmap_present(&self) -> bool {
        !self.mmap_base.is_null()
    }

    // === MCP23017 expander ===

    fn mcp_update(&self, reg_a: u8, reg_b: u8, pin: u8, set: bool) {
        let Some(dev) = &self.mcp else { return };
        if pin >= 16 {
            return;
        }
        let reg = if pin < 8 { reg_a } else { reg_b };
        let bit = 1u8 << (pin % 8);
        let current = dev.read_reg(reg);
        let value = if set { current | bit } else { current & !bit };
        dev.write_reg(reg, value);
    }

    /// Configure expander pin direction (true = input).
    pub fn mcp_set_direction(&self, pin: u8, input: bool) {
        self.mcp_update(MCP_IODIRA, MCP_IODIRB, pin, input);
    }

    /// Enable or disable the expander pullup on a pin.
    pub fn mcp_set_pullup(&self, pin: u8, pullup: bool) {
        if pullup {
            debug!("pulling up expander pin {pin}");
        }
        self.mcp_update(MCP_GPPUA, MCP_GPPUB, pin, pullup);
    }

    /// Drive an expander output pin.
    pub fn mcp_write(&self, pin: u8, value: bool) {
        self.mcp_update(MCP_GPIOA, MCP_GPIOB, pin, value);
    }

    /// Read all 16 expander pins, active-high.
    pub fn mcp_read_all(&self) -> u16 {
        let Some(dev) = &self.mcp else { return 0 };
        let bank_a = u16::from(dev.read_reg(MCP_GPIOA));
        let bank_b = u16::from(dev.read_reg(MCP_GPIOB));
        ((bank_b << 8) | bank_a) ^ 0xFFFF
    }

    // === Memory-mapped SoC pins ===

    fn port_reg(&self, port: u8, offset: usize) -> Option<*mut u32> {
        if self.mmap_base.is_null() || !(1..=6).contains(&port) {
            return None;
        }
        // SAFETY: offsets stay within the mapped window for ports 1..=6.
        Some(unsafe {
            self.mmap_base
                .add(usize::from(port) * PORT_STRIDE + offset)
                .cast::<u32>()
        })
    }

    /// Configure a memory-mapped pin as an input with the given pull.
    ///
    /// Function fields are 4 bits per pin across four config registers;
    /// pull fields are 2 bits per pin across two registers.
    pub fn mmap_configure_input(&self, port: u8, pin: u8, pull: Pull) {
        if pin > 27 {
            return;
        }
        let config_offset = usize::from(pin >> 3) * 4;
        let config_shift = u32::from(pin % 8) * 4;
        let pull_offset = PULL_OFFSET + usize::from(pin >> 4) * 4;
        let pull_shift = u32::from(pin % 16) * 2;

        let (Some(config_reg), Some(pull_reg)) =
            (self.port_reg(port, config_offset), self.port_reg(port, pull_offset))
        else {
            return;
        };

        // SAFETY: registers are valid for the mapped block; volatile
        // read-modify-write as the hardware requires.
        unsafe {
            let config = config_reg.read_volatile() & !(0xFu32 << config_shift);
            config_reg.write_volatile(config); // function 0b0000 = input

            let pull_bits = pull_reg.read_volatile() & !(0x3u32 << pull_shift);
            pull_reg.write_volatile(pull_bits | ((pull as u32) << pull_shift));
        }
    }

    /// Read one memory-mapped pin, active-high. False when absent.
    pub fn mmap_read_pin(&self, port: u8, pin: u8) -> bool {
        if pin > 27 {
            return false;
        }
        let Some(data_reg) = self.port_reg(port, DATA_OFFSET) else {
            return false;
        };
        // SAFETY: valid mapped register.
        let data = unsafe { data_reg.read_volatile() } ^ 0xFFFF_FFFF;
        (data >> pin) & 0x01 != 0
    }

    /// Read a whole memory-mapped port, active-high.
    pub fn mmap_read_port(&self, port: u8) -> u32 {
        let Some(data_reg) = self.port_reg(port, DATA_OFFSET) else {
            return 0;
        };
        // SAFETY: valid mapped register.
        (unsafe { data_reg.read_volatile() }) ^ 0xFFFF_FFFF
    }
}

impl Drop for Gpio {
    fn drop(&mut self) {
        if !self.mmap_base.is_null() {
            // SAFETY: undo the offset applied after mmap, unmap the window.
            unsafe {
                let page = self.mmap_base.sub(SOC_GPIO_BASE & 0xFFFF);
                libc::munmap(page.cast(), MAP_LEN);
            }
        }
    }
}
