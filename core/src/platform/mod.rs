//! Board support: the sensor surfaces presented as pure values.
//!
//! Every surface carries a presence flag. Failing to open a device is never
//! fatal: the failure is logged, the flag flips, and readers return
//! best-effort values (zero / last known) so the rest of the system keeps
//! running in a degraded profile.

pub mod encoder;
pub mod gpio;
pub mod i2c;
pub mod pic;

pub use encoder::Encoder;
pub use gpio::Gpio;
pub use i2c::I2cDev;
pub use pic::{Pic, PicReadings};

/// All hardware surfaces of the board, opened together.
pub struct HardwareState {
    pub gpio: Gpio,
    pub encoder: Encoder,
    pub pic: Pic,
}

impl HardwareState {
    /// Open every surface, degrading per-surface on failure.
    pub fn open() -> Self {
        Self {
            gpio: Gpio::open(),
            encoder: Encoder::open(),
            pic: Pic::open(),
        }
    }

    /// True if at least one input surface is usable.
    pub fn any_present(&self) -> bool {
        self.pic.present() || self.encoder.present() || self.gpio.mmap_present()
    }
}
