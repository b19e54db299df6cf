//! Refcounted, block-allocated PCM tracks.
//!
//! A track's PCM arrives asynchronously from an importer subprocess and is
//! published frame-by-frame to a concurrently reading realtime thread. The
//! publishing rule: bytes are written first, then `length` is advanced
//! with a release atomic add. A reader that loads `length` with acquire
//! semantics only ever observes fully written frames.

pub mod import;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rig::thread::rt_not_allowed;
use crate::util::status::{self, StatusLevel};

pub use store::{acquire_empty, acquire_for_recording, use_mlock, TrackStore};

/// Interleaved stereo throughout.
pub const TRACK_CHANNELS: usize = 2;

/// Stereo frames per PCM block (1 MiB, ~6 s at 44.1 kHz).
pub const BLOCK_SAMPLES: usize = 262_144;

/// Cap on blocks per track (~25 minutes at 44.1 kHz).
pub const MAX_BLOCKS: usize = 256;

const BYTES_PER_FRAME: usize = TRACK_CHANNELS * size_of::<i16>();
const BLOCK_PCM_BYTES: usize = BLOCK_SAMPLES * BYTES_PER_FRAME;
const BLOCK_PCM_WORDS: usize = BLOCK_SAMPLES * TRACK_CHANNELS;

/// One track's worth of PCM plus its import state.
///
/// Handles are `Arc<Track>`; the observable refcount transitions live in
/// [`store::TrackStore`].
pub struct Track {
    rate: u32,
    importer: Option<PathBuf>,
    path: Option<PathBuf>,

    /// Fixed-capacity vector of heap blocks, grown on demand. A slot is
    /// published (non-null) before any frame inside it is published via
    /// `length`.
    blocks: Box<[AtomicPtr<i16>]>,
    nblocks: AtomicU32,

    /// Bytes received so far, including a trailing partial frame. Written
    /// only by the coordination thread.
    bytes: AtomicU64,

    /// Whole frames readable by consumers. Release-published.
    length: AtomicU32,

    finished: AtomicBool,
    terminated: AtomicBool,
    /// Growth halted after an allocation failure.
    exhausted: AtomicBool,

    /// The importer child while the track is importing. Touched only by
    /// the coordination thread.
    import: Mutex<Option<import::ImportChild>>,
}

// SAFETY: block pointers are written single-threadedly by the coordination
// thread and only dereferenced by readers below the release-published
// `length`; everything else is atomics or a mutex.
unsafe impl Send for Track {}
unsafe impl Sync for Track {}

fn empty_blocks() -> Box<[AtomicPtr<i16>]> {
    (0..MAX_BLOCKS)
        .map(|_| AtomicPtr::new(std::ptr::null_mut()))
        .collect()
}

impl Track {
    fn new(rate: u32, importer: Option<PathBuf>, path: Option<PathBuf>, finished: bool) -> Self {
        Self {
            rate,
            importer,
            path,
            blocks: empty_blocks(),
            nblocks: AtomicU32::new(0),
            bytes: AtomicU64::new(0),
            length: AtomicU32::new(0),
            finished: AtomicBool::new(finished),
            terminated: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
            import: Mutex::new(None),
        }
    }

    pub(crate) fn importing_from(
        rate: u32,
        importer: &Path,
        path: &Path,
        child: import::ImportChild,
    ) -> Self {
        let track = Self::new(
            rate,
            Some(importer.to_path_buf()),
            Some(path.to_path_buf()),
            false,
        );
        *track.import.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        track
    }

    pub(crate) fn for_recording(rate: u32) -> Self {
        Self::new(rate, None, None, true)
    }

    pub(crate) fn empty_sentinel(rate: u32) -> Self {
        Self::new(rate, None, None, true)
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn importer(&self) -> Option<&Path> {
        self.importer.as_deref()
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    /// An importer subprocess is still attached.
    pub fn importing(&self) -> bool {
        self.import
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The import pipe's fd, for the coordination poll set.
    pub(crate) fn import_fd(&self) -> Option<std::os::fd::RawFd> {
        self.import
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.fd())
    }

    /// Whole frames currently readable.
    pub fn length(&self) -> u32 {
        self.length.load(Ordering::Acquire)
    }

    /// Track length in seconds.
    pub fn seconds(&self) -> f64 {
        f64::from(self.length()) / f64::from(self.rate)
    }

    /// Read one published stereo frame.
    pub fn frame(&self, n: u32) -> Option<(i16, i16)> {
        if n >= self.length() {
            return None;
        }
        let idx = n as usize;
        let ptr = self.blocks[idx / BLOCK_SAMPLES].load(Ordering::Acquire);
        let offset = (idx % BLOCK_SAMPLES) * TRACK_CHANNELS;
        // SAFETY: n is below the acquire-loaded length, so the block
        // pointer is published and the frame bytes were written before the
        // release add that made them visible.
        unsafe { Some((*ptr.add(offset), *ptr.add(offset + 1))) }
    }

    /// Allocate one more block. Fails permanently once the track is
    /// exhausted (cap reached, allocator refused, or pinning failed).
    fn more_space(&self) -> Result<()> {
        rt_not_allowed();

        let nblocks = self.nblocks.load(Ordering::Relaxed);
        if self.exhausted.load(Ordering::Relaxed) || nblocks as usize >= MAX_BLOCKS {
            if !self.exhausted.swap(true, Ordering::Relaxed) {
                warn!("maximum track length reached");
                status::set(StatusLevel::Alert, "Track too long, truncated");
            }
            return Err(Error::AllocationExhausted { blocks: nblocks });
        }

        let block = vec![0i16; BLOCK_PCM_WORDS].into_boxed_slice();
        let ptr = Box::into_raw(block).cast::<i16>();

        if store::mlock_enabled() {
            // SAFETY: ptr covers exactly one freshly allocated block.
            let r = unsafe { libc::mlock(ptr.cast(), BLOCK_PCM_BYTES) };
            if r != 0 {
                warn!("mlock failed: {}", std::io::Error::last_os_error());
                // SAFETY: reconstructing the box allocated above.
                unsafe {
                    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                        ptr,
                        BLOCK_PCM_WORDS,
                    )));
                }
                self.exhausted.store(true, Ordering::Relaxed);
                return Err(Error::AllocationExhausted { blocks: nblocks });
            }
        }

        self.blocks[nblocks as usize].store(ptr, Ordering::Release);
        self.nblocks.store(nblocks + 1, Ordering::Relaxed);

        debug!(
            "allocated track block {} ({} bytes total)",
            nblocks + 1,
            u64::from(nblocks + 1) * BLOCK_PCM_BYTES as u64
        );

        Ok(())
    }

    /// Writable region for incoming PCM: at least one byte, up to the end
    /// of the current block.
    pub(crate) fn pcm_region(&self) -> Result<(*mut u8, usize)> {
        let bytes = self.bytes.load(Ordering::Relaxed);
        let block = (bytes / BLOCK_PCM_BYTES as u64) as usize;
        if block == self.nblocks.load(Ordering::Relaxed) as usize {
            self.more_space()?;
        }
        let fill = (bytes % BLOCK_PCM_BYTES as u64) as usize;
        let ptr = self.blocks[block].load(Ordering::Relaxed).cast::<u8>();
        // SAFETY: fill stays within the block just ensured to exist.
        Ok((unsafe { ptr.add(fill) }, BLOCK_PCM_BYTES - fill))
    }

    /// Publish `len` freshly written bytes: bytes in, atomic add after.
    pub(crate) fn commit(&self, len: usize) {
        let bytes = self.bytes.load(Ordering::Relaxed) + len as u64;
        self.bytes.store(bytes, Ordering::Relaxed);

        let whole = (bytes / BYTES_PER_FRAME as u64) as u32;
        let published = self.length.load(Ordering::Relaxed);
        debug_assert!(whole >= published);
        self.length.fetch_add(whole - published, Ordering::Release);
    }

    /// Preallocate blocks for `frames` stereo frames (recording tracks).
    pub fn ensure_space(&self, frames: u32) -> Result<()> {
        while (self.nblocks.load(Ordering::Relaxed) as usize) * BLOCK_SAMPLES
            < frames as usize
        {
            self.more_space()?;
        }
        Ok(())
    }

    /// Write frames into preallocated, not-yet-published space.
    pub fn write_frames(&self, frame_offset: u32, frames: &[[i16; 2]]) -> Result<()> {
        self.ensure_space(frame_offset + frames.len() as u32)?;

        let flat: &[i16] = bytemuck::cast_slice(frames);
        let mut written = 0usize;
        let mut at = frame_offset as usize * TRACK_CHANNELS;
        while written < flat.len() {
            let block = at / BLOCK_PCM_WORDS;
            let offset = at % BLOCK_PCM_WORDS;
            let run = (BLOCK_PCM_WORDS - offset).min(flat.len() - written);
            let ptr = self.blocks[block].load(Ordering::Relaxed);
            // SAFETY: ensure_space allocated every touched block; the run
            // stays within one block.
            unsafe {
                std::ptr::copy_nonoverlapping(flat.as_ptr().add(written), ptr.add(offset), run);
            }
            written += run;
            at += run;
        }
        Ok(())
    }

    /// Atomically publish a recording's length.
    pub fn set_length(&self, frames: u32) {
        self.bytes
            .store(u64::from(frames) * BYTES_PER_FRAME as u64, Ordering::Relaxed);
        self.length.store(frames, Ordering::Release);
    }

    /// Ask the importer to stop early.
    pub(crate) fn terminate(&self) {
        let guard = self.import.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = guard.as_ref() {
            child.terminate();
            self.terminated.store(true, Ordering::Relaxed);
        }
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        // Imports hold a reference until completion, so a live child here
        // means teardown raced shutdown; reap it rather than leak.
        if let Some(child) = self
            .import
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            child.abandon();
        }

        for slot in self.blocks.iter_mut() {
            let ptr = *slot.get_mut();
            if !ptr.is_null() {
                // SAFETY: every non-null slot came from Box::into_raw of a
                // BLOCK_PCM_WORDS slice in more_space().
                unsafe {
                    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                        ptr,
                        BLOCK_PCM_WORDS,
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_track_round_trip() {
        let track = Track::for_recording(48_000);
        assert_eq!(track.length(), 0);
        assert!(track.finished());

        let frames: Vec<[i16; 2]> = (0..1000).map(|i| [i as i16, -(i as i16)]).collect();
        track.write_frames(0, &frames).unwrap();
        // Nothing readable until the length is published.
        assert!(track.frame(0).is_none());

        track.set_length(1000);
        assert_eq!(track.length(), 1000);
        assert_eq!(track.frame(0), Some((0, 0)));
        assert_eq!(track.frame(999), Some((999, -999)));
        assert!(track.frame(1000).is_none());
    }

    #[test]
    fn test_write_crosses_block_boundary() {
        let track = Track::for_recording(48_000);
        let start = (BLOCK_SAMPLES - 2) as u32;
        let frames = [[1i16, 2], [3, 4], [5, 6], [7, 8]];
        track.write_frames(start, &frames).unwrap();
        track.set_length(start + 4);
        assert_eq!(track.frame(start + 1), Some((3, 4)));
        assert_eq!(track.frame(start + 2), Some((5, 6)));
    }

    #[test]
    fn test_commit_publishes_whole_frames_only() {
        let track = Track::for_recording(44_100);
        let (_, len) = track.pcm_region().unwrap();
        assert_eq!(len, BLOCK_PCM_BYTES);

        // Six bytes is one whole frame plus a residual half.
        track.commit(6);
        assert_eq!(track.length(), 1);
        track.commit(2);
        assert_eq!(track.length(), 2);
    }

    #[test]
    fn test_ensure_space_counts_blocks() {
        let track = Track::for_recording(44_100);
        track.ensure_space(BLOCK_SAMPLES as u32 + 1).unwrap();
        assert_eq!(track.nblocks.load(Ordering::Relaxed), 2);
    }
}
