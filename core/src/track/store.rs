//! Track registry and lifecycle.
//!
//! The registry maps path → handle for O(1) dedup of concurrent loads.
//! Lifecycle rules, all evaluated on the coordination thread under the rig
//! mutex:
//!
//! - a track is registered from the moment import starts until its buffer
//!   is freed;
//! - releasing the last consumer of a still-importing track SIGTERMs the
//!   importer (the import hold keeps the track alive until the pipe
//!   drains);
//! - releasing the last consumer of a finished track unregisters and
//!   frees it;
//! - the empty sentinel is never freed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use tracing::{info, warn};

use super::import::ImportChild;
use super::Track;
use crate::error::{Error, Result};
use crate::rig::thread::rt_not_allowed;

static USE_MLOCK: AtomicBool = AtomicBool::new(false);

/// Pin every future block allocation into RAM.
pub fn use_mlock() {
    USE_MLOCK.store(true, Ordering::Relaxed);
}

pub(crate) fn mlock_enabled() -> bool {
    USE_MLOCK.load(Ordering::Relaxed)
}

static EMPTY: OnceLock<Arc<Track>> = OnceLock::new();

/// The static zero-length sentinel. Cheaper than null checks everywhere.
pub fn acquire_empty() -> Arc<Track> {
    EMPTY
        .get_or_init(|| Arc::new(Track::empty_sentinel(44_100)))
        .clone()
}

/// A pathless in-memory track for loop recording. Not registered.
pub fn acquire_for_recording(rate: u32) -> Arc<Track> {
    rt_not_allowed();
    Arc::new(Track::for_recording(rate))
}

/// Registry plus the list of currently importing tracks. Owned by the rig,
/// mutated only under its mutex.
pub struct TrackStore {
    registry: HashMap<PathBuf, Arc<Track>>,
    importing: Vec<Arc<Track>>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
            importing: Vec::new(),
        }
    }

    /// Tracks whose import pipes belong in the poll set.
    pub(crate) fn importing_tracks(&self) -> &[Arc<Track>] {
        &self.importing
    }

    fn registered(&self, track: &Arc<Track>) -> bool {
        track
            .path()
            .is_some_and(|p| self.registry.get(p).is_some_and(|r| Arc::ptr_eq(r, track)))
    }

    fn import_held(&self, track: &Arc<Track>) -> bool {
        self.importing.iter().any(|t| Arc::ptr_eq(t, track))
    }

    /// Get a handle for `(importer, path)`, starting an import if the path
    /// is not already loaded.
    pub(crate) fn acquire_by_import(
        &mut self,
        importer: &Path,
        path: &Path,
        rate: u32,
    ) -> Result<Arc<Track>> {
        rt_not_allowed();

        if let Some(existing) = self.registry.get(path) {
            if existing.importer() == Some(importer) {
                return Ok(existing.clone());
            }
        }

        info!("importing '{}'...", path.display());
        let child = ImportChild::spawn(importer, path, rate).map_err(|e| {
            warn!("couldn't launch importer '{}': {e}", importer.display());
            Error::ImportFailed {
                path: path.to_path_buf(),
            }
        })?;

        let track = Arc::new(Track::importing_from(rate, importer, path, child));
        self.registry.insert(path.to_path_buf(), track.clone());
        self.importing.push(track.clone());
        Ok(track)
    }

    /// Finish use of a handle.
    pub(crate) fn release(&mut self, track: Arc<Track>) {
        rt_not_allowed();

        // The empty sentinel is exempt from the whole lifecycle.
        if EMPTY.get().is_some_and(|e| Arc::ptr_eq(e, &track)) {
            return;
        }

        if !self.registered(&track) {
            // Recording tracks and superseded registry entries free
            // themselves when the last Arc drops.
            return;
        }

        let import_held = self.import_held(&track);
        // Consumers beyond this handle, the registry entry, and the
        // import hold.
        let external = Arc::strong_count(&track) - 2 - usize::from(import_held);
        if external > 0 {
            return;
        }

        if import_held {
            // Nobody wants the audio any more: stop the importer early.
            // The import hold keeps the track registered until the pipe
            // drains and `finish_import` reaps it.
            track.terminate();
            return;
        }

        let path = track.path().map(Path::to_path_buf);
        if let Some(path) = path {
            self.registry.remove(&path);
        }
        // Dropping `track` now frees the buffers.
    }

    /// Drop the import hold after `handle()` reported completion, freeing
    /// the track if no consumer remains.
    pub(crate) fn finish_import(&mut self, track: &Arc<Track>) {
        self.importing.retain(|t| !Arc::ptr_eq(t, track));

        if self.registered(track) && Arc::strong_count(track) == 2 {
            let path = track.path().map(Path::to_path_buf);
            if let Some(path) = path {
                self.registry.remove(&path);
            }
        }
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write a fake importer that cats its input file to stdout, plus a
    /// small PCM payload for it to deliver.
    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();

        let importer = dir.path().join("import.sh");
        std::fs::write(&importer, "#!/bin/sh\nexec cat \"$2\"\n").unwrap();
        std::fs::set_permissions(&importer, std::fs::Permissions::from_mode(0o755)).unwrap();

        let payload = dir.path().join("tone.raw");
        let frames: Vec<u8> = (0..2000u32)
            .flat_map(|i| {
                let s = (i % 256) as i16;
                [s.to_le_bytes(), (-s).to_le_bytes()].concat()
            })
            .collect();
        std::fs::write(&payload, frames).unwrap();

        (dir, importer, payload)
    }

    fn pump_to_completion(store: &mut TrackStore, track: &Arc<Track>) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while track.importing() {
            assert!(std::time::Instant::now() < deadline, "import never finished");
            if track.handle() {
                store.finish_import(track);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (_dir, importer, payload) = fixture();
        let mut store = TrackStore::new();

        let a = store.acquire_by_import(&importer, &payload, 44_100).unwrap();
        let count_after_first = Arc::strong_count(&a);
        let b = store.acquire_by_import(&importer, &payload, 44_100).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(Arc::strong_count(&a), count_after_first + 1);
        // Registry + import hold + two handles.
        assert_eq!(Arc::strong_count(&a), 4);

        pump_to_completion(&mut store, &a);
        store.release(b);
        store.release(a);
        assert!(store.registry.is_empty());
    }

    #[test]
    fn test_import_delivers_pcm() {
        let (_dir, importer, payload) = fixture();
        let mut store = TrackStore::new();

        let track = store.acquire_by_import(&importer, &payload, 44_100).unwrap();
        pump_to_completion(&mut store, &track);

        assert!(track.finished());
        assert_eq!(track.length(), 2000);
        assert_eq!(track.frame(7), Some((7, -7)));
        store.release(track);
    }

    #[test]
    fn test_release_while_importing_terminates_early() {
        let (dir, importer, _payload) = fixture();
        // An importer that never finishes on its own.
        let slow = dir.path().join("slow.sh");
        std::fs::write(&slow, "#!/bin/sh\nexec sleep 60\n").unwrap();
        std::fs::set_permissions(&slow, std::fs::Permissions::from_mode(0o755)).unwrap();
        let _ = importer;

        let mut store = TrackStore::new();
        let target = dir.path().join("void.raw");
        std::fs::write(&target, b"").unwrap();
        let track = store.acquire_by_import(&slow, &target, 44_100).unwrap();
        let weak = std::sync::Arc::downgrade(&track);

        store.release(track);
        let held = store.importing_tracks()[0].clone();
        assert!(held.terminated());
        assert!(held.importing(), "import hold keeps the child until the pipe drains");

        // SIGTERM we sent ourselves: the pipe drains to EOF and the track
        // is freed once the hold drops.
        pump_to_completion(&mut store, &held);
        assert!(store.registry.is_empty());
        drop(held);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_empty_sentinel_survives_release() {
        let mut store = TrackStore::new();
        let empty = acquire_empty();
        let again = acquire_empty();
        assert!(Arc::ptr_eq(&empty, &again));
        store.release(again);
        assert_eq!(acquire_empty().length(), 0);
    }

    #[test]
    fn test_recording_track_is_not_registered() {
        let mut store = TrackStore::new();
        let rec = acquire_for_recording(48_000);
        assert!(rec.path().is_none());
        assert!(rec.finished());
        store.release(rec);
        assert!(store.registry.is_empty());
    }
}
