//! Runtime settings record.
//!
//! Loaded once at startup from a TOML file and then treated as read-only,
//! except for the compact-board detection at init which may flip
//! `disable_volume_adc` / `disable_pic_buttons`. The core consumes these
//! values; persisting them is the daemon's business.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// All tunables the control plane consumes.
///
/// Time-valued fields (`debounce_time`, `hold_time`) are in coordination
/// ticks (one tick per poll of the GPIO machines). `platter_speed` is in
/// encoder counts per second of audio at unity pitch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sample_rate: u32,
    pub period_size: u32,
    pub buffer_period_factor: u32,

    pub platter_enabled: bool,
    pub platter_speed: u32,
    pub jog_reverse: bool,
    pub slippiness: f64,
    pub brake_speed: f64,

    pub initial_volume: f64,
    pub max_volume: f64,
    pub pitch_range: f64,

    pub fader_open_point: u16,
    pub fader_close_point: u16,
    /// Which deck the cut channels mute: 1 or 2.
    pub cut_beats: u8,

    pub debounce_time: i32,
    pub hold_time: i32,

    pub crossfader_adc_min: u16,
    pub crossfader_adc_max: u16,

    pub disable_volume_adc: bool,
    pub disable_pic_buttons: bool,

    /// Importer program, invoked as `<importer> import <path> <rate>`.
    pub importer: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            period_size: 256,
            buffer_period_factor: 4,
            platter_enabled: true,
            // ~33 1/3 rpm on a 4096-count sensor
            platter_speed: 2275,
            jog_reverse: false,
            slippiness: 0.75,
            brake_speed: 12.0,
            initial_volume: 0.8,
            max_volume: 1.0,
            pitch_range: 0.08,
            fader_open_point: 100,
            fader_close_point: 80,
            cut_beats: 1,
            debounce_time: 10,
            hold_time: 250,
            crossfader_adc_min: 16,
            crossfader_adc_max: 1008,
            disable_volume_adc: false,
            disable_pic_buttons: false,
            importer: PathBuf::from("/usr/libexec/platterbox-import"),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&text)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let s = Settings::default();
        assert!(s.platter_enabled);
        assert!(s.fader_close_point < s.fader_open_point);
        assert!(s.debounce_time < s.hold_time);
        assert!(s.crossfader_adc_min < s.crossfader_adc_max);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let s: Settings = toml::from_str("platter_speed = 3072\njog_reverse = true\n").unwrap();
        assert_eq!(s.platter_speed, 3072);
        assert!(s.jog_reverse);
        assert_eq!(s.sample_rate, 44_100);
        assert_eq!(s.cut_beats, 1);
    }
}
