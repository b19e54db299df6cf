//! Cue points, persisted in a sidecar file next to the track.
//!
//! Format: one `<slot> <seconds>` pair per line. Anything unparseable is
//! skipped; a missing sidecar just means no cues.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const NUM_CUES: usize = 8;

/// The cue slots of one loaded track.
#[derive(Debug, Default)]
pub struct CueSheet {
    cues: [Option<f64>; NUM_CUES],
    sidecar: Option<PathBuf>,
}

fn sidecar_path(track_path: &Path) -> PathBuf {
    let mut os = track_path.as_os_str().to_owned();
    os.push(".cues");
    PathBuf::from(os)
}

impl CueSheet {
    /// Load cues for `track_path`, replacing any previous contents.
    pub fn load_from_file(&mut self, track_path: &Path) {
        self.cues = [None; NUM_CUES];
        let sidecar = sidecar_path(track_path);

        match std::fs::read_to_string(&sidecar) {
            Ok(text) => {
                for line in text.lines() {
                    let mut parts = line.split_whitespace();
                    let (Some(slot), Some(seconds)) = (parts.next(), parts.next()) else {
                        continue;
                    };
                    let (Ok(slot), Ok(seconds)) = (slot.parse::<usize>(), seconds.parse::<f64>())
                    else {
                        continue;
                    };
                    if slot < NUM_CUES && seconds.is_finite() && seconds >= 0.0 {
                        self.cues[slot] = Some(seconds);
                    }
                }
                debug!("loaded cues from {}", sidecar.display());
            }
            Err(_) => debug!("no cue sidecar at {}", sidecar.display()),
        }

        self.sidecar = Some(sidecar);
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        self.cues.get(slot).copied().flatten()
    }

    /// Set a cue and persist the sheet.
    pub fn set(&mut self, slot: usize, seconds: f64) {
        if slot >= NUM_CUES {
            return;
        }
        self.cues[slot] = Some(seconds);
        self.save();
    }

    fn save(&self) {
        let Some(sidecar) = &self.sidecar else { return };
        let mut text = String::new();
        for (slot, cue) in self.cues.iter().enumerate() {
            if let Some(seconds) = cue {
                text.push_str(&format!("{slot} {seconds:.6}\n"));
            }
        }
        if let Err(e) = std::fs::write(sidecar, text) {
            warn!("couldn't save cues to {}: {e}", sidecar.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_set_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.mp3");
        std::fs::write(&track, b"").unwrap();

        let mut cues = CueSheet::default();
        cues.load_from_file(&track);
        assert!(cues.get(0).is_none());

        cues.set(2, 12.5);

        let mut reloaded = CueSheet::default();
        reloaded.load_from_file(&track);
        assert_eq!(reloaded.get(2), Some(12.5));
        assert!(reloaded.get(0).is_none());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.mp3");
        std::fs::write(dir.path().join("song.mp3.cues"), "banana\n1 2.0\n99 3.0\n").unwrap();

        let mut cues = CueSheet::default();
        cues.load_from_file(&track);
        assert_eq!(cues.get(1), Some(2.0));
        assert!(cues.get(0).is_none());
    }
}
