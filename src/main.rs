//! okay-robot-daemon: voice-command daemon for a small mobile robot
//!
//! Listens for a wake phrase, then turns spoken commands into motion,
//! gestures and autonomous modes, while a background hazard monitor can
//! stop the robot at any time:
//! - Session state machine arbitrating speech against hazards
//! - Keyword command interpreter with an optional LLM fallback
//! - Interruptible action routines with a safe-stop postcondition
//! - Proximity and drop-off monitoring on a dedicated thread

mod actions;
mod config;
mod events;
mod feedback;
mod hardware;
mod hazard;
mod interpreter;
mod keyboard;
mod lifecycle;
mod session;
mod speech;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::actions::ActionLibrary;
use crate::config::Config;
use crate::events::SessionEvent;
use crate::feedback::SoundCue;
use crate::hazard::{HazardCell, HazardMonitor};
use crate::interpreter::OpenAiFallback;
use crate::keyboard::KeyboardListener;
use crate::lifecycle::ShutdownSignal;
use crate::session::SessionController;
use crate::speech::SpeechSource;

/// Pause between the engine cue and the startup greeting
const STARTUP_CUE_PAUSE: Duration = Duration::from_secs(1);
/// Extra time on top of the configured shutdown timeout before giving up on the session
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "okay-robot-daemon", version, about)]
struct Cli {
    /// Config file; defaults to $OKAY_ROBOT_CONFIG or ~/.config/okay-robot/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Transcriber command printing one transcript per line (default: read stdin)
    #[arg(long, value_name = "CMD")]
    speech_command: Option<String>,

    /// Disable keyboard control
    #[arg(long)]
    no_keyboard: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "okay-robot-daemon starting");

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(command) = &cli.speech_command {
        config.speech.command = Some(command.split_whitespace().map(String::from).collect());
    }
    if cli.no_keyboard {
        config.keyboard.enabled = false;
    }
    let config = Arc::new(config);
    info!(
        robot = %config.robot_name,
        wake = ?config.wake.phrases,
        backend = ?config.hardware.backend,
        fallback = config.fallback_active(),
        "configuration loaded"
    );

    // Actuator failures here are fatal; nothing has moved yet
    let actuator = hardware::connect(&config.hardware).context("failed to initialize actuators")?;
    let library = ActionLibrary::new(Arc::clone(&actuator));
    if let Err(e) = library.safe_stop() {
        warn!(error = %e, "initial reset failed");
    }

    let shutdown = ShutdownSignal::new();
    let hazards = HazardCell::new();

    let monitor = HazardMonitor::new(Arc::clone(&actuator), hazards.clone(), Arc::clone(&config));
    monitor.start().context("failed to start hazard monitor")?;

    let speaker = feedback::speaker_for(&config.feedback);

    // Session controller -> event log
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    let mut controller = SessionController::new(
        Arc::clone(&config),
        library,
        Arc::clone(&speaker),
        hazards,
        event_tx.clone(),
    );

    if config.fallback_active() {
        match OpenAiFallback::new(&config.fallback, &config.robot_name) {
            Ok(fallback) => {
                info!(model = %config.fallback.model, "LLM fallback enabled");
                controller = controller.with_fallback(Arc::new(fallback));
            }
            Err(e) => warn!(error = %e, "continuing without LLM fallback"),
        }
    } else if config.fallback.enabled {
        warn!("LLM fallback enabled but no API key set, using keyword matching only");
    }

    // Speech channel -> session controller
    let (utterance_tx, utterance_rx) = mpsc::channel(32);
    let source = match &config.speech.command {
        Some(argv) => SpeechSource::Command(argv.clone()),
        None => SpeechSource::Stdin,
    };
    let reads_stdin = source == SpeechSource::Stdin;
    let _speech = speech::spawn_source(source, utterance_tx).context("failed to start speech channel")?;

    // Keyboard listener -> session controller
    let (key_tx, key_rx) = mpsc::channel(32);
    let keyboard = KeyboardListener::new(key_tx);
    if !config.keyboard.enabled {
        debug!("keyboard control disabled by configuration");
    } else if reads_stdin {
        info!("keyboard control unavailable while stdin carries speech");
    } else {
        match keyboard.start() {
            Ok(()) => info!("keyboard control enabled"),
            Err(e) => warn!(error = %e, "continuing without keyboard control"),
        }
    }

    let mut event_rx = event_tx.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => info!(%event, "session event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "session event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    speaker.play(SoundCue::Engine);
    tokio::time::sleep(STARTUP_CUE_PAUSE).await;
    let wake = config.wake.phrases.first().map(String::as_str).unwrap_or("okay robot");
    speaker.say(&format!(
        "Hello! I am {}. Say '{}' to wake me up!",
        config.robot_name, wake
    ));

    info!("daemon initialized, waiting for wake phrase");

    let mut session = tokio::spawn(controller.run(utterance_rx, key_rx, shutdown.token()));

    tokio::select! {
        _ = shutdown.wait() => {
            info!("shutting down...");
            let limit = config.shutdown_timeout() + SHUTDOWN_GRACE;
            match timeout(limit, &mut session).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "session task failed"),
                Err(_) => {
                    warn!("session did not stop in time");
                    session.abort();
                }
            }
        }

        result = &mut session => {
            if let Err(e) = result {
                error!(error = %e, "session task failed");
            }
            info!("session ended, shutting down...");
        }
    }

    let final_stop = tokio::task::spawn_blocking(move || hardware::safe_stop(actuator.as_ref()));
    match timeout(config.shutdown_timeout(), final_stop).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "final safe-stop failed"),
        Ok(Err(e)) => error!(error = %e, "final safe-stop task failed"),
        Err(_) => warn!("final safe-stop did not finish in time, exiting anyway"),
    }
    keyboard.stop();
    monitor.stop();

    info!("okay-robot-daemon stopped");

    // blocking stdin reads would otherwise hold the runtime open
    std::process::exit(0)
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
