//! Input co-processor: four 10-bit ADCs, four buttons, capacitive touch.
//!
//! The co-processor exposes a six-register block. ADC low bytes live in
//! registers 0x00..0x03, the two high bits of each channel are packed into
//! 0x04, and 0x05 carries the button bits (active-low on the wire) plus the
//! cap-touch flag.

use tracing::{info, warn};

use super::i2c::I2cDev;

const PIC_BUS: &str = "/dev/i2c-2";
const PIC_ADDR: u8 = 0x69;

/// One snapshot of everything the co-processor measures.
///
/// Button bits are presented active-high.
#[derive(Debug, Clone, Copy, Default)]
pub struct PicReadings {
    pub adc: [u16; 4],
    pub buttons: [bool; 4],
    pub cap_touched: bool,
}

/// The co-processor surface.
pub struct Pic {
    dev: Option<I2cDev>,
}

impl Pic {
    pub fn open() -> Self {
        match I2cDev::open(PIC_BUS, PIC_ADDR) {
            Ok(dev) => {
                info!("input co-processor initialized");
                Self { dev: Some(dev) }
            }
            Err(e) => {
                warn!("couldn't init input co-processor: {e}");
                Self { dev: None }
            }
        }
    }

    pub fn present(&self) -> bool {
        self.dev.is_some()
    }

    /// Read the full input block. All-zero when absent.
    pub fn read_all(&self) -> PicReadings {
        let mut readings = PicReadings::default();
        let Some(dev) = &self.dev else {
            return readings;
        };

        for (channel, slot) in readings.adc.iter_mut().enumerate() {
            *slot = u16::from(dev.read_reg(channel as u8));
        }

        // Packed high bits: two per channel, channel 0 in the low bits.
        let high = u16::from(dev.read_reg(0x04));
        readings.adc[0] |= (high & 0x03) << 8;
        readings.adc[1] |= (high & 0x0C) << 6;
        readings.adc[2] |= (high & 0x30) << 4;
        readings.adc[3] |= (high & 0xC0) << 2;

        let bits = dev.read_reg(0x05);
        for (i, button) in readings.buttons.iter_mut().enumerate() {
            *button = (bits >> i) & 0x01 == 0;
        }
        readings.cap_touched = (bits >> 4) & 0x01 != 0;

        readings
    }
}
