//! Speech channel
//!
//! Transcripts arrive one per line, either on stdin or on the stdout of an
//! external transcriber process. The stream cannot be restarted: when it
//! ends, the channel closes and the daemon shuts down.

use std::borrow::Cow;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One transcribed utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub raw_text: String,
    pub received_at: Instant,
}

impl Utterance {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            received_at: Instant::now(),
        }
    }
}

/// Where transcripts come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechSource {
    Stdin,
    /// Program and arguments of a transcriber printing one line per utterance
    Command(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech command is empty")]
    EmptyCommand,

    #[error("failed to start speech command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("speech command has no stdout")]
    NoStdout,
}

/// Start forwarding transcripts into `tx`
pub fn spawn_source(source: SpeechSource, tx: mpsc::Sender<Utterance>) -> Result<JoinHandle<()>, SpeechError> {
    match source {
        SpeechSource::Stdin => {
            info!("reading transcripts from stdin");
            Ok(tokio::spawn(forward_lines(tokio::io::stdin(), tx)))
        }
        SpeechSource::Command(argv) => {
            let (program, args) = argv.split_first().ok_or(SpeechError::EmptyCommand)?;
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| SpeechError::Spawn {
                    program: program.clone(),
                    source,
                })?;
            let stdout = child.stdout.take().ok_or(SpeechError::NoStdout)?;
            info!(%program, "reading transcripts from speech command");

            let program = program.clone();
            Ok(tokio::spawn(async move {
                forward_lines(stdout, tx).await;
                match child.wait().await {
                    Ok(status) => info!(%program, %status, "speech command exited"),
                    Err(e) => warn!(%program, error = %e, "failed to reap speech command"),
                }
            }))
        }
    }
}

/// Forward non-blank lines until end of stream or the receiver goes away
///
/// Bytes that are not UTF-8 are dropped from the line rather than ending
/// the stream.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<Utterance>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("speech channel ended");
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if matches!(line, Cow::Owned(_)) {
                    warn!("transcript contained invalid UTF-8");
                }
                let text = line.trim_matches(|c: char| c.is_whitespace() || c == char::REPLACEMENT_CHARACTER);
                if text.is_empty() {
                    continue;
                }
                debug!(text, "heard");
                if tx.send(Utterance::new(text)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "speech channel read failed");
                return;
            }
        }
    }
}
