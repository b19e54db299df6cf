//! platterd - the platterbox appliance daemon.
//!
//! Wires the control-plane core to the hardware and the audio backend,
//! then parks on the coordination loop until a QUIT arrives (signal or
//! otherwise).
//!
//! # Usage
//!
//! ```bash
//! platterd --music /media
//! platterd --config /etc/platterbox.toml --stats -v
//! ```

use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use platterbox_core::engine::{AudioBackend, DspStats, PlayerInput};
use platterbox_core::input::create_hardware;
use platterbox_core::rig::{Rig, Rt};
use platterbox_core::util::rtlog;
use platterbox_core::{track, Engine, Settings, Track};

/// Realtime priority for the audio thread.
const RT_PRIORITY: i32 = 75;

#[derive(Parser)]
#[command(name = "platterd")]
#[command(author, version, about = "platterbox two-deck turntable appliance daemon")]
struct Args {
    /// Settings file (TOML). Defaults apply when absent.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Music library root to scan for the navigation buttons.
    #[arg(long, short = 'm', default_value = "/media")]
    music: PathBuf,

    /// Override the importer program from the settings file.
    #[arg(long)]
    importer: Option<PathBuf>,

    /// Log to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit the once-per-second stats line.
    #[arg(long)]
    stats: bool,

    /// Verbose logging (-v debug, -vv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Lock track memory into RAM (needs a suitable rlimit).
    #[arg(long)]
    mlock: bool,
}

/// Placeholder backend for bring-up: the production DSP links in behind
/// the same trait and supplies real descriptors and positions.
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

/// Write end of the rig's event pipe, for the signal handler.
static SIGNAL_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(_signum: libc::c_int) {
    let fd = SIGNAL_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        // A single pipe write is async-signal-safe. 0x01 = QUIT.
        let byte = 0x01u8;
        // SAFETY: fd is the rig's event pipe, kept open for process life.
        unsafe {
            libc::write(fd, (&raw const byte).cast(), 1);
        }
    }
}

fn install_signal_handlers(fd: RawFd) -> Result<()> {
    SIGNAL_FD.store(fd, Ordering::Relaxed);

    // SAFETY: sigaction with a handler that only performs a pipe write.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(std::io::Error::last_os_error())
                    .context("installing signal handler");
            }
        }
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    if !args.stats {
        filter = filter.add_directive("stats=off".parse()?);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_writer(Arc::new(file)).with_ansi(false).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(importer) = &args.importer {
        settings.importer = importer.clone();
    }

    if args.mlock {
        track::use_mlock();
    }

    let (_rt_logger, log_drain) = rtlog::queue();
    let rig = Rig::new(log_drain).context("creating coordination rig")?;
    install_signal_handlers(rig.event_fd())?;

    let audio: Arc<dyn AudioBackend> = Arc::new(NullAudio);
    let inputs = [Arc::new(PlayerInput::new()), Arc::new(PlayerInput::new())];

    let mut engine = Engine::new(
        settings,
        audio.clone(),
        rig.clone(),
        inputs,
        Some(&args.music),
    );

    let mut hw = create_hardware();
    if !hw.init(&mut engine) {
        warn!("no input hardware present; running with the fallback profile");
    }

    let mut rt = Rt::new(audio);
    rt.start(RT_PRIORITY)
        .context("starting realtime thread")?;

    info!("platterd running");
    let result = rig.run(&mut engine, hw.as_mut());

    rt.stop();
    info!("platterd stopped");

    result.context("coordination loop failed")
}
