//! Hardware bridge backend
//!
//! Spawns a helper process that owns the motor/servo drivers and talks to
//! it over stdin/stdout with the length-prefixed JSON protocol. A dedicated
//! thread owns the pipes and answers one request at a time; callers wait
//! at most the configured call timeout for their reply.
//!
//! Any timeout or I/O failure leaves the pipe mid-frame, so the bridge is
//! then killed and every later call fails with `Unavailable`.

use std::io::{BufReader, BufWriter};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::protocol::{read_message, write_message, Request, Response};
use super::{Actuator, ActuatorError};

type Reply = mpsc::Sender<Result<Response, ActuatorError>>;

/// One request handed to the I/O thread
struct Job {
    request: Request,
    reply: Reply,
}

/// Actuator backed by an external bridge process
pub struct BridgeCar {
    jobs: Mutex<mpsc::Sender<Job>>,
    child: Mutex<Child>,
    broken: AtomicBool,
    call_timeout: Duration,
}

impl BridgeCar {
    /// Spawn the bridge and confirm it answers a ping
    pub fn spawn(command: &[String], call_timeout: Duration) -> Result<Self, ActuatorError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ActuatorError::Unavailable("empty bridge command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ActuatorError::Unavailable(format!("failed to spawn {program}: {e}")))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ActuatorError::Unavailable("bridge stdio not captured".to_string()));
            }
        };

        let (jobs_tx, jobs_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("hardware-bridge".to_string())
            .spawn(move || serve(jobs_rx, BufWriter::new(stdin), BufReader::new(stdout)));
        if let Err(e) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ActuatorError::Unavailable(format!("failed to spawn bridge thread: {e}")));
        }

        let car = Self {
            jobs: Mutex::new(jobs_tx),
            child: Mutex::new(child),
            broken: AtomicBool::new(false),
            call_timeout,
        };

        match car.call(Request::Ping) {
            Ok(Response::Pong) => Ok(car),
            Ok(other) => Err(ActuatorError::Unavailable(format!(
                "unexpected handshake response: {other:?}"
            ))),
            Err(e) => Err(ActuatorError::Unavailable(format!("bridge handshake failed: {e}"))),
        }
    }

    /// Whether the bridge has been given up on
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    fn call(&self, request: Request) -> Result<Response, ActuatorError> {
        let op = request.op();
        if self.is_broken() {
            return Err(ActuatorError::Unavailable(format!("{op}: hardware bridge is down")));
        }

        debug!(?request, "bridge request");
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.jobs.lock().send(Job { request, reply: reply_tx }).is_err() {
            self.disable("bridge thread has exited");
            return Err(ActuatorError::Unavailable(format!("{op}: hardware bridge is down")));
        }

        match reply_rx.recv_timeout(self.call_timeout) {
            Ok(Ok(Response::Error { code, message })) => Err(ActuatorError::Command {
                op,
                message: format!("{code}: {message}"),
            }),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.disable(&e.to_string());
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.disable("request timed out");
                Err(ActuatorError::Unavailable(format!(
                    "{op}: no reply within {}ms",
                    self.call_timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.disable("bridge thread has exited");
                Err(ActuatorError::Unavailable(format!("{op}: hardware bridge is down")))
            }
        }
    }

    /// Kill the helper; the stream can no longer be trusted
    fn disable(&self, reason: &str) {
        if self.broken.swap(true, Ordering::SeqCst) {
            return;
        }
        error!(reason, "hardware bridge out of sync, disabling it");
        if let Err(e) = self.child.lock().kill() {
            warn!(error = %e, "failed to kill hardware bridge");
        }
    }

    fn command(&self, request: Request) -> Result<(), ActuatorError> {
        let op = request.op();
        match self.call(request)? {
            Response::Ok => Ok(()),
            other => Err(ActuatorError::Protocol(format!("{op}: unexpected response {other:?}"))),
        }
    }
}

/// I/O thread: one request, one response, until the first failure
fn serve(jobs: mpsc::Receiver<Job>, mut stdin: BufWriter<ChildStdin>, mut stdout: BufReader<ChildStdout>) {
    for job in jobs {
        let result = write_message(&mut stdin, &job.request).and_then(|()| read_message(&mut stdout));
        let failed = result.is_err();
        let _ = job.reply.send(result);
        if failed {
            debug!("bridge thread stopping after I/O failure");
            return;
        }
    }
}

impl Actuator for BridgeCar {
    fn set_speed(&self, speed: i16) -> Result<(), ActuatorError> {
        self.command(Request::SetSpeed { speed })
    }

    fn set_steering(&self, angle: i16) -> Result<(), ActuatorError> {
        self.command(Request::SetSteering { angle })
    }

    fn set_pan(&self, angle: i16) -> Result<(), ActuatorError> {
        self.command(Request::SetPan { angle })
    }

    fn set_tilt(&self, angle: i16) -> Result<(), ActuatorError> {
        self.command(Request::SetTilt { angle })
    }

    fn stop(&self) -> Result<(), ActuatorError> {
        self.command(Request::Stop)
    }

    fn read_distance(&self) -> Result<f64, ActuatorError> {
        match self.call(Request::ReadDistance) {
            Ok(Response::Distance { cm }) => Ok(cm),
            Ok(other) => Err(ActuatorError::Sensor(format!("unexpected response {other:?}"))),
            Err(e) => Err(ActuatorError::Sensor(e.to_string())),
        }
    }

    fn read_grayscale(&self) -> Result<[u16; 3], ActuatorError> {
        match self.call(Request::ReadGrayscale) {
            Ok(Response::Grayscale { values }) => Ok(values),
            Ok(other) => Err(ActuatorError::Sensor(format!("unexpected response {other:?}"))),
            Err(e) => Err(ActuatorError::Sensor(e.to_string())),
        }
    }
}

impl Drop for BridgeCar {
    fn drop(&mut self) {
        let child = self.child.get_mut();
        if let Err(e) = child.kill() {
            debug!(error = %e, "hardware bridge already gone");
        }
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    /// Bridge scripted with `sh -c`; frames are written with printf octal escapes
    fn scripted(script: &str) -> Result<BridgeCar, ActuatorError> {
        BridgeCar::spawn(&["sh".to_string(), "-c".to_string(), script.to_string()], TIMEOUT)
    }

    // 15-byte `{"type":"pong"}` frame
    const PONG: &str = r#"printf '\017\000\000\000{"type":"pong"}'"#;

    #[test]
    fn test_missing_program_is_unavailable() {
        let result = BridgeCar::spawn(&["/nonexistent/okay-robot-bridge".to_string()], TIMEOUT);
        assert!(matches!(result, Err(ActuatorError::Unavailable(_))));
    }

    #[test]
    fn test_empty_command_is_unavailable() {
        assert!(matches!(BridgeCar::spawn(&[], TIMEOUT), Err(ActuatorError::Unavailable(_))));
    }

    #[test]
    fn test_silent_bridge_fails_handshake() {
        // `true` exits immediately without answering the ping
        let result = BridgeCar::spawn(&["true".to_string()], TIMEOUT);
        assert!(matches!(result, Err(ActuatorError::Unavailable(_))));
    }

    #[test]
    fn test_stalled_bridge_times_out() {
        let car = scripted(&format!("{PONG}; exec sleep 10")).unwrap();

        let started = Instant::now();
        assert!(car.read_distance().is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(car.is_broken());

        // later calls fail at once instead of queueing behind the stall
        let started = Instant::now();
        assert!(matches!(car.stop(), Err(ActuatorError::Unavailable(_))));
        assert!(started.elapsed() < TIMEOUT);
    }

    #[test]
    fn test_truncated_frame_disables_bridge() {
        // a 20-byte frame whose body runs into the next frame's header
        let script = format!(
            r#"{PONG}; printf '\024\000\000\000{{"type":"ok"}}\015\000\000\000{{"type":"ok"}}'; exec sleep 10"#
        );
        let car = scripted(&script).unwrap();

        assert!(matches!(car.stop(), Err(ActuatorError::Protocol(_))));
        assert!(car.is_broken());
        // the leftover bytes are never read as a reply
        assert!(matches!(car.set_steering(0), Err(ActuatorError::Unavailable(_))));
    }
}
