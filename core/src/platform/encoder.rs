//! AS5600 magnetic rotary sensor (the scratch platter angle).

use tracing::{info, warn};

use super::i2c::I2cDev;

const AS5600_BUS: &str = "/dev/i2c-0";
const AS5600_ADDR: u8 = 0x36;

// Angle registers: bits 11:8 in the high register, 7:0 in the low one.
const AS5600_ANGLE_H: u8 = 0x0C;
const AS5600_ANGLE_L: u8 = 0x0D;

/// The rotary sensor surface. Stateless beyond the open bus handle.
pub struct Encoder {
    dev: Option<I2cDev>,
}

impl Encoder {
    /// Open the sensor; absence is logged and tolerated.
    pub fn open() -> Self {
        match I2cDev::open(AS5600_BUS, AS5600_ADDR) {
            Ok(dev) => {
                info!("rotary sensor (AS5600) initialized");
                Self { dev: Some(dev) }
            }
            Err(e) => {
                warn!("couldn't init rotary sensor (AS5600): {e}");
                Self { dev: None }
            }
        }
    }

    pub fn present(&self) -> bool {
        self.dev.is_some()
    }

    /// Read the 12-bit angle (0..4095). Returns 0 when absent.
    ///
    /// The two register bytes are read independently; a read during motion
    /// can therefore glitch. The tracking engine compensates.
    pub fn read_angle(&self) -> u16 {
        let Some(dev) = &self.dev else { return 0 };
        let high = dev.read_reg(AS5600_ANGLE_H);
        let low = dev.read_reg(AS5600_ANGLE_L);
        (u16::from(high & 0x0F) << 8) | u16::from(low)
    }
}
