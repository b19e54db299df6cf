//! The coordination thread ("rig") and the realtime thread.
//!
//! The rig owns the single process-wide mutex (registry + importing
//! tracks) and a poll loop over its wake pipe, the coordination tick
//! timer, and every importing track's pipe. It suspends only in `poll`,
//! only while holding no locks.

pub mod controller;
pub mod realtime;
pub mod thread;

use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use smallvec::SmallVec;
use tracing::debug;

use crate::engine::Engine;
use crate::error::Result;
use crate::input::HardwareInput;
use crate::track::{Track, TrackStore};
use crate::util::rtlog::RtLogDrain;

pub use controller::Controller;
pub use realtime::Rt;
pub use thread::{is_realtime, mark_realtime, rt_not_allowed};

const EVENT_WAKE: u8 = 0x00;
const EVENT_QUIT: u8 = 0x01;

/// Wake pipe + tick timer + up to four importing tracks. Imports beyond
/// the cap keep their hold and are polled as slots free up.
const MAX_POLL_ENTRIES: usize = 6;

/// Coordination tick period (1 ms).
const TICK_NS: u32 = 1_000_000;

/// Ticks between stats lines (~1 s).
const STATS_TICKS: u64 = 1000;

/// The coordination hub: wake pipe, tick timer, and the store mutex.
pub struct Rig {
    event_rx: RawFd,
    event_tx: RawFd,
    tick_fd: RawFd,
    store: Mutex<TrackStore>,
    log_drain: Mutex<RtLogDrain>,
}

impl Rig {
    /// Create the rig: wake pipe (non-blocking read end) plus the tick
    /// timerfd that drives hardware polling.
    pub fn new(log_drain: RtLogDrain) -> io::Result<Arc<Self>> {
        let mut pipe_fds = [0 as RawFd; 2];
        // SAFETY: plain pipe(2) into a local array.
        if unsafe { libc::pipe(pipe_fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let [event_rx, event_tx] = pipe_fds;

        // SAFETY: fds just created.
        unsafe {
            let flags = libc::fcntl(event_rx, libc::F_GETFL);
            if flags < 0 || libc::fcntl(event_rx, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                let err = io::Error::last_os_error();
                libc::close(event_rx);
                libc::close(event_tx);
                return Err(err);
            }
        }

        // SAFETY: timerfd creation and arming with a local itimerspec.
        let tick_fd = unsafe {
            let fd = libc::timerfd_create(
                libc::CLOCK_MONOTONIC,
                libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
            );
            if fd < 0 {
                let err = io::Error::last_os_error();
                libc::close(event_rx);
                libc::close(event_tx);
                return Err(err);
            }
            let timer = libc::itimerspec {
                it_interval: libc::timespec {
                    tv_sec: 0,
                    tv_nsec: TICK_NS as libc::c_long,
                },
                it_value: libc::timespec {
                    tv_sec: 0,
                    tv_nsec: TICK_NS as libc::c_long,
                },
            };
            if libc::timerfd_settime(fd, 0, &timer, std::ptr::null_mut()) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                libc::close(event_rx);
                libc::close(event_tx);
                return Err(err);
            }
            fd
        };

        Ok(Arc::new(Self {
            event_rx,
            event_tx,
            tick_fd,
            store: Mutex::new(TrackStore::new()),
            log_drain: Mutex::new(log_drain),
        }))
    }

    fn store(&self) -> MutexGuard<'_, TrackStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Post one event byte into the loop.
    fn post_event(&self, event: u8) -> io::Result<()> {
        rt_not_allowed();
        // SAFETY: writing one byte from a local.
        if unsafe { libc::write(self.event_tx, (&raw const event).cast(), 1) } != 1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wake the loop so it rebuilds its poll set.
    pub fn wake(&self) -> io::Result<()> {
        self.post_event(EVENT_WAKE)
    }

    /// Ask the loop to exit. Callable from other threads and (being a
    /// single pipe write) from signal handlers via the raw fd.
    pub fn quit(&self) -> io::Result<()> {
        self.post_event(EVENT_QUIT)
    }

    /// The raw write end of the event pipe, for async-signal handlers.
    pub fn event_fd(&self) -> RawFd {
        self.event_tx
    }

    /// Import-or-dedup a track and register its pipe with the loop.
    pub fn acquire_track(&self, importer: &Path, path: &Path, rate: u32) -> Result<Arc<Track>> {
        rt_not_allowed();
        let track = self.store().acquire_by_import(importer, path, rate)?;
        let _ = self.wake();
        Ok(track)
    }

    /// Finish use of a track handle.
    pub fn release_track(&self, track: Arc<Track>) {
        self.store().release(track);
    }

    /// The coordination loop. Runs on the calling thread until QUIT.
    pub fn run(&self, engine: &mut Engine, hw: &mut dyn HardwareInput) -> io::Result<()> {
        let mut tick_count: u64 = 0;

        loop {
            // Assemble the poll set under the lock, then release it for
            // the (unbounded) suspension.
            let mut fds: SmallVec<[libc::pollfd; MAX_POLL_ENTRIES]> = SmallVec::new();
            fds.push(libc::pollfd {
                fd: self.event_rx,
                events: libc::POLLIN,
                revents: 0,
            });
            fds.push(libc::pollfd {
                fd: self.tick_fd,
                events: libc::POLLIN,
                revents: 0,
            });
            let mut polled: SmallVec<[Arc<Track>; 4]> = SmallVec::new();
            {
                let store = self.store();
                for track in store.importing_tracks() {
                    if fds.len() >= MAX_POLL_ENTRIES {
                        break;
                    }
                    if let Some(fd) = track.import_fd() {
                        fds.push(libc::pollfd {
                            fd,
                            events: libc::POLLIN,
                            revents: 0,
                        });
                        polled.push(track.clone());
                    }
                }
            }

            // SAFETY: fds lives across the call; no timeout.
            let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if r < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            // Drain the event pipe.
            if fds[0].revents != 0 {
                loop {
                    let mut byte = 0u8;
                    // SAFETY: one byte into a local; fd is non-blocking.
                    let z = unsafe { libc::read(self.event_rx, (&raw mut byte).cast(), 1) };
                    if z < 0 {
                        let err = io::Error::last_os_error();
                        if err.kind() == io::ErrorKind::WouldBlock {
                            break;
                        }
                        return Err(err);
                    }
                    if z == 0 {
                        break;
                    }
                    match byte {
                        EVENT_WAKE => {}
                        EVENT_QUIT => {
                            debug!("rig loop quitting");
                            return Ok(());
                        }
                        _ => unreachable!("unknown rig event {byte}"),
                    }
                }
            }

            // Coordination tick: hardware poll plus the stats cadence.
            if fds[1].revents != 0 {
                let mut expirations: u64 = 0;
                // SAFETY: timerfd reads deliver a u64 expiration count.
                let z = unsafe {
                    libc::read(self.tick_fd, (&raw mut expirations).cast(), 8)
                };
                if z == 8 && expirations > 0 {
                    hw.poll(engine);
                    tick_count += 1;
                    if tick_count.is_multiple_of(STATS_TICKS) {
                        hw.log_stats(engine);
                    }
                }
            }

            // Critical section: flush realtime logs, pump imports.
            self.log_drain
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .flush();
            {
                let mut store = self.store();
                for (slot, track) in polled.iter().enumerate() {
                    if fds[2 + slot].revents == 0 {
                        continue;
                    }
                    if track.handle() {
                        store.finish_import(track);
                    }
                }
            }
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        // SAFETY: fds are owned by the rig and closed exactly once.
        unsafe {
            libc::close(self.event_rx);
            libc::close(self.event_tx);
            libc::close(self.tick_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    use crate::engine::{AudioBackend, DspStats, PlayerInput};
    use crate::input::create_hardware;
    use crate::settings::Settings;
    use crate::util::rtlog;

    struct NullAudio;

    impl AudioBackend for NullAudio {
        fn pollfds(&self) -> Vec<RawFd> {
            Vec::new()
        }
        fn start(&self) {}
        fn stop(&self) {}
        fn handle(&self) {}
        fn position(&self, _deck: usize) -> f64 {
            0.0
        }
        fn motor_speed(&self, _deck: usize) -> f64 {
            1.0
        }
        fn set_track(&self, _deck: usize, _track: Arc<Track>) {}
        fn stats(&self) -> DspStats {
            DspStats::default()
        }
    }

    fn fake_importer(dir: &Path) -> std::path::PathBuf {
        let importer = dir.join("import.sh");
        std::fs::write(&importer, "#!/bin/sh\nexec cat \"$2\"\n").unwrap();
        std::fs::set_permissions(&importer, std::fs::Permissions::from_mode(0o755)).unwrap();
        importer
    }

    #[test]
    fn test_loop_pumps_imports_and_quits() {
        let dir = tempfile::tempdir().unwrap();
        let importer = fake_importer(dir.path());
        let payload = dir.path().join("tone.raw");
        std::fs::write(&payload, vec![0u8; 4 * 500]).unwrap();

        let (_logger, drain) = rtlog::queue();
        let rig = Rig::new(drain).unwrap();
        let audio: Arc<dyn AudioBackend> = Arc::new(NullAudio);
        let inputs = [Arc::new(PlayerInput::new()), Arc::new(PlayerInput::new())];
        let scratch_input = inputs[1].clone();

        let mut engine = Engine::new(Settings::default(), audio, rig.clone(), inputs, None);
        let mut hw = create_hardware();
        // No hardware in the test environment: init reports degraded.
        let _ = hw.init(&mut engine);

        let loop_rig = rig.clone();
        let runner = std::thread::spawn(move || {
            let result = loop_rig.run(&mut engine, hw.as_mut());
            (result, engine)
        });

        // Import through the running loop.
        let track = rig
            .acquire_track(&importer, &payload, 44_100)
            .expect("import starts");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !track.finished() {
            assert!(Instant::now() < deadline, "loop never pumped the import");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(track.length(), 500);

        // The fallback profile must be advancing the scratch target.
        std::thread::sleep(Duration::from_millis(50));
        assert!(scratch_input.target_position() > 0.0);
        assert!(scratch_input.touched());

        rig.quit().unwrap();
        let (result, engine) = runner.join().unwrap();
        result.unwrap();
        assert!(engine.beat_deck.player.input.just_play());

        rig.release_track(track);
    }
}
