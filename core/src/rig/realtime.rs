//! The realtime thread: elevated-priority polling of the audio device and
//! any controllers.
//!
//! `start` blocks until the spawned thread has actually raised its
//! scheduling priority (or reported failure), so callers know the latency
//! guarantee holds before audio begins.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use anyhow::{bail, Context};
use tracing::{info, warn};

use super::controller::Controller;
use super::thread::mark_realtime;
use crate::engine::AudioBackend;

/// Raise the calling thread to SCHED_FIFO at `priority`.
fn raise_priority(priority: i32) -> io::Result<()> {
    // SAFETY: plain scheduler queries/updates on the current thread.
    unsafe {
        let max_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if priority > max_priority {
            return Err(io::Error::other(format!(
                "invalid scheduling priority (maximum {max_priority})"
            )));
        }

        let param = libc::sched_param {
            sched_priority: priority,
        };
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Realtime thread state, maintained across start() and stop().
pub struct Rt {
    audio: Arc<dyn AudioBackend>,
    controllers: Vec<Arc<dyn Controller>>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Rt {
    pub fn new(audio: Arc<dyn AudioBackend>) -> Self {
        Self {
            audio,
            controllers: Vec::new(),
            finished: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn add_controller(&mut self, controller: Arc<dyn Controller>) {
        self.controllers.push(controller);
    }

    /// Launch the realtime thread (if there is anything to poll) and start
    /// audio. Blocks until the priority raise has succeeded or failed.
    pub fn start(&mut self, priority: i32) -> anyhow::Result<()> {
        assert!(priority >= 0);

        let mut fds: Vec<libc::pollfd> = Vec::new();
        let mut push_fds = |raw: Vec<std::os::fd::RawFd>| {
            fds.extend(raw.into_iter().map(|fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            }));
        };
        push_fds(self.audio.pollfds());
        for controller in &self.controllers {
            push_fds(controller.pollfds());
        }

        if !fds.is_empty() {
            info!("launching realtime thread for {} descriptors", fds.len());

            let audio = self.audio.clone();
            let controllers = self.controllers.clone();
            let finished = self.finished.clone();
            // Start barrier: the thread reports whether the priority raise
            // worked before we let audio begin.
            let (ready_tx, ready_rx) = mpsc::channel::<bool>();

            let handle = std::thread::Builder::new()
                .name("platter-rt".into())
                .spawn(move || {
                    mark_realtime();

                    if priority != 0 {
                        if let Err(e) = raise_priority(priority) {
                            warn!("failed to get realtime priority: {e}");
                            finished.store(true, Ordering::Relaxed);
                        }
                    }
                    let ok = !finished.load(Ordering::Relaxed);
                    let _ = ready_tx.send(ok);
                    if !ok {
                        return;
                    }

                    rt_main(&audio, &controllers, &finished, fds);
                })
                .context("failed to spawn realtime thread")?;
            self.handle = Some(handle);

            let ok = ready_rx.recv().unwrap_or(false);
            if !ok {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                bail!("realtime thread could not raise its priority");
            }
        }

        self.audio.start();
        Ok(())
    }

    /// Stop audio and join the realtime thread.
    pub fn stop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
        self.audio.stop();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("realtime thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Rt {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// The realtime loop: suspend in poll, then dispatch handlers. Never
/// allocates, never takes a mutex, never touches the track store.
fn rt_main(
    audio: &Arc<dyn AudioBackend>,
    controllers: &[Arc<dyn Controller>],
    finished: &AtomicBool,
    mut fds: Vec<libc::pollfd>,
) {
    while !finished.load(Ordering::Relaxed) {
        // SAFETY: fds points at a live pollfd array for the whole call.
        let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if r < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            // Nothing sane to do at realtime priority with a dead poll set.
            tracing::error!("realtime poll failed: {err}");
            std::process::abort();
        }

        for controller in controllers {
            controller.handle();
        }
        audio.handle();
    }
}
