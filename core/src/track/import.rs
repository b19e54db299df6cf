//! Importer subprocess plumbing.
//!
//! The importer is an external program invoked as
//! `<importer> import <path> <sample_rate>`; it writes interleaved signed
//! 16-bit stereo PCM to stdout and exits 0. The pipe is switched to
//! non-blocking so the coordination thread can pump it from its poll loop.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use super::Track;
use crate::util::status::{self, StatusLevel};

/// A running importer and its non-blocking output pipe.
pub(crate) struct ImportChild {
    child: Child,
    fd: RawFd,
}

impl ImportChild {
    pub fn spawn(importer: &Path, path: &Path, rate: u32) -> io::Result<Self> {
        let mut child = Command::new(importer)
            .arg("import")
            .arg(path)
            .arg(rate.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;

        let fd = child
            .stdout
            .as_ref()
            .expect("importer stdout was requested piped")
            .as_raw_fd();

        // SAFETY: fd belongs to the child handle we own.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Self { child, fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Send SIGTERM; the death is reaped later through the pipe.
    pub fn terminate(&self) {
        // SAFETY: signalling our own child's pid.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
        }
    }

    /// Close the pipe and reap the child.
    pub fn finish(mut self) -> io::Result<ExitStatus> {
        drop(self.child.stdout.take());
        self.child.wait()
    }

    /// Kill and reap without caring about the outcome (teardown path).
    pub fn abandon(mut self) {
        self.terminate();
        drop(self.child.stdout.take());
        let _ = self.child.wait();
    }
}

impl Track {
    /// Pump the import pipe after poll reported activity.
    ///
    /// Reads until EAGAIN (returns false: still importing) or EOF/error
    /// (completes the import, reaps the child, returns true). The caller
    /// drops the import hold after a true return.
    pub(crate) fn handle(&self) -> bool {
        let mut guard = self.import.lock().unwrap_or_else(|e| e.into_inner());
        let Some(child) = guard.as_ref() else {
            return false;
        };

        loop {
            let Ok((ptr, len)) = self.pcm_region() else {
                // Exhausted: stop pulling; closing the pipe below ends the
                // importer with SIGPIPE.
                break;
            };

            // SAFETY: the region is writable, unpublished track memory.
            let n = unsafe { libc::read(child.fd(), ptr.cast(), len) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return false;
                }
                warn!("import read: {err}");
                break;
            }
            if n == 0 {
                break; // EOF
            }
            self.commit(n as usize);
        }

        let child = guard.take().expect("import child present");
        drop(guard);

        match child.finish() {
            Ok(code) if code.success() => {
                debug!("track import completed ({} frames)", self.length());
                self.finished.store(true, Ordering::Relaxed);
            }
            Ok(code) => {
                warn!("track import exited with {code}");
                if !self.terminated() {
                    if let Some(path) = self.path() {
                        status::set(
                            StatusLevel::Alert,
                            format!("Error importing {}", path.display()),
                        );
                    }
                }
            }
            Err(e) => warn!("couldn't reap importer: {e}"),
        }

        true
    }
}
