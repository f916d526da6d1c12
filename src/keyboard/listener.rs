//! Terminal key listener
//!
//! Puts the terminal in raw mode and reads key events on a dedicated
//! thread, forwarding bound keys to the session controller.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event};
use crossterm::terminal;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::keys::{command_for, KeyCommand};

/// How long one poll waits before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur in the keyboard listener
#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("keyboard listener is already running")]
    AlreadyRunning,

    #[error("stdin is not a terminal")]
    NotATerminal,

    #[error("failed to enter raw mode: {0}")]
    RawMode(std::io::Error),

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Operator keyboard listener
pub struct KeyboardListener {
    command_tx: mpsc::Sender<KeyCommand>,
    running: Arc<AtomicBool>,
}

impl KeyboardListener {
    pub fn new(command_tx: mpsc::Sender<KeyCommand>) -> Self {
        Self {
            command_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start listening on a dedicated thread until `stop()` is called
    pub fn start(&self) -> Result<(), KeyboardError> {
        if !std::io::stdin().is_terminal() {
            return Err(KeyboardError::NotATerminal);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(KeyboardError::AlreadyRunning);
        }
        if let Err(e) = terminal::enable_raw_mode() {
            self.running.store(false, Ordering::SeqCst);
            return Err(KeyboardError::RawMode(e));
        }

        let command_tx = self.command_tx.clone();
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("keyboard-listener".to_string())
            .spawn(move || {
                info!("keyboard listener started");
                read_keys(&command_tx, &running);
                if let Err(e) = terminal::disable_raw_mode() {
                    error!(error = %e, "failed to restore terminal");
                }
                running.store(false, Ordering::SeqCst);
                info!("keyboard listener stopped");
            });

        if let Err(e) = spawned {
            let _ = terminal::disable_raw_mode();
            self.running.store(false, Ordering::SeqCst);
            return Err(KeyboardError::ThreadSpawn(e.to_string()));
        }
        Ok(())
    }

    /// Stop listening and restore the terminal
    ///
    /// The thread itself exits within one poll interval.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Err(e) = terminal::disable_raw_mode() {
                error!(error = %e, "failed to restore terminal");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn read_keys(command_tx: &mpsc::Sender<KeyCommand>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                error!(error = %e, "keyboard poll failed");
                return;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(e) => {
                error!(error = %e, "keyboard read failed");
                return;
            }
        };

        let Some(command) = command_for(&key) else {
            continue;
        };
        debug!(?command, "key command");
        let quit = command == KeyCommand::Quit;
        if command_tx.blocking_send(command).is_err() {
            // controller is gone
            return;
        }
        if quit {
            return;
        }
    }
}
