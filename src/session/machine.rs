//! Session controller
//!
//! Arbitrates speech-derived intent against hazard-derived interrupts.
//! One routine holds the actuators at a time; a newer directive cancels it
//! and waits in a single-slot pending cell, so overlapping commands
//! collapse to the latest one. A CRITICAL hazard cancels whatever is
//! running and empties that slot before anything else is dispatched.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{Mode, Session};
use crate::actions::{Action, ActionLibrary, AutonomousKind, Outcome, Routine};
use crate::config::Config;
use crate::events::{SessionEvent, SleepReason};
use crate::feedback::{SoundCue, Speaker};
use crate::hardware::ActuatorError;
use crate::hazard::{HazardCell, HazardEvent, HazardKind, Severity};
use crate::interpreter::{
    CommandInterpreter, ConversationLog, Directive, Fallback, FallbackError, FallbackReply, ModeTarget, Query,
};
use crate::keyboard::KeyCommand;
use crate::speech::Utterance;

const STILL_HERE: &str = "Yes, I'm here! What's up?";
const NOT_UNDERSTOOD: &str = "I didn't understand that. Try saying a command like forward, turn left, or dance.";
const APOLOGY: &str = "Sorry, I couldn't reach my brain right now.";
const AUTONOMOUS_STOPPED: &str = "Autonomous mode stopped. I'm listening for commands.";
const STOPPED: &str = "Stopped!";
const HELP: &str = "I can go forward, backward, turn left or right, look around, dance, celebrate, \
                    patrol, track lines, avoid obstacles, and more! Just tell me what to do.";

/// Forwarded WARN hazards beyond this are dropped
const WARNING_BUFFER: usize = 4;

type RoutineResult = Result<Outcome, ActuatorError>;
type FallbackResult = Result<FallbackReply, FallbackError>;

/// The routine currently holding the actuators
struct InFlight {
    routine: Routine,
    cancel: CancellationToken,
    handle: JoinHandle<RoutineResult>,
    started_at: Instant,
    warnings: Option<mpsc::Sender<HazardEvent>>,
}

/// An outstanding fallback request
struct Consultation {
    text: String,
    handle: JoinHandle<FallbackResult>,
}

/// The voice-command state machine
pub struct SessionController {
    config: Arc<Config>,
    interpreter: CommandInterpreter,
    library: ActionLibrary,
    speaker: Arc<dyn Speaker>,
    fallback: Option<Arc<dyn Fallback>>,
    hazards: HazardCell,
    event_tx: broadcast::Sender<SessionEvent>,
    session: Session,
    in_flight: Option<InFlight>,
    pending: Option<Routine>,
    /// Obstacle avoidance halted by a CRITICAL, waiting for it to clear
    hazard_hold: bool,
    hazard_active: bool,
    consultation: Option<Consultation>,
    conversation: ConversationLog,
}

impl SessionController {
    pub fn new(
        config: Arc<Config>,
        library: ActionLibrary,
        speaker: Arc<dyn Speaker>,
        hazards: HazardCell,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            interpreter: CommandInterpreter::new(&config),
            conversation: ConversationLog::new(config.fallback.context_turns),
            config,
            library,
            speaker,
            fallback: None,
            hazards,
            event_tx,
            session: Session::new(),
            in_flight: None,
            pending: None,
            hazard_hold: false,
            hazard_active: false,
            consultation: None,
        }
    }

    /// Consult `fallback` for transcripts the keyword matcher misses
    pub fn with_fallback(mut self, fallback: Arc<dyn Fallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    /// Whether a routine currently holds the actuators
    pub fn is_executing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Run the conversational loop until shutdown, end of speech or quit
    ///
    /// Always finishes by bringing the robot to rest.
    pub async fn run(
        mut self,
        mut utterances: mpsc::Receiver<Utterance>,
        mut keys: mpsc::Receiver<KeyCommand>,
        shutdown: CancellationToken,
    ) {
        info!(mode = %self.session.mode, "session controller started");
        let mut keys_open = true;

        loop {
            let deadline = self.session.idle_deadline(self.config.command_timeout());

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }

                _ = self.hazards.notified() => self.on_hazard(),

                result = routine_finished(&mut self.in_flight) => self.on_routine_finished(result),

                utterance = utterances.recv() => match utterance {
                    Some(utterance) => self.on_utterance(utterance),
                    None => {
                        info!("speech channel closed");
                        break;
                    }
                },

                key = keys.recv(), if keys_open => match key {
                    Some(KeyCommand::Directive(directive)) => self.on_key(directive),
                    Some(KeyCommand::Quit) => {
                        info!("quit requested from keyboard");
                        break;
                    }
                    None => keys_open = false,
                },

                reply = consultation_finished(&mut self.consultation) => self.on_fallback_reply(reply),

                _ = idle(deadline) => self.on_idle_timeout(),
            }
        }

        self.shut_down().await;
    }

    fn on_utterance(&mut self, utterance: Utterance) {
        let text = utterance.raw_text.as_str();
        match self.session.mode {
            Mode::Sleeping => {
                if self.interpreter.is_wake_phrase(text) {
                    self.wake();
                } else {
                    debug!(text, "ignored while sleeping");
                }
            }
            Mode::Awake | Mode::Autonomous(_) => {
                info!(text, "heard");
                self.session.touch();
                let directive = self.interpreter.interpret(text);
                self.dispatch(directive);
            }
            Mode::ShuttingDown => {}
        }
    }

    fn on_key(&mut self, directive: Directive) {
        if !self.session.mode.is_attentive() {
            debug!(%directive, mode = %self.session.mode, "key ignored");
            return;
        }
        info!(%directive, "key");
        self.session.touch();
        self.dispatch(directive);
    }

    fn wake(&mut self) {
        info!("wake phrase detected");
        self.session.touch();
        self.set_mode(Mode::Awake);
        self.emit(SessionEvent::Woke);
        self.say(&format!(
            "Hi there! I'm {}. What would you like me to do?",
            self.config.robot_name
        ));
        if self.config.wake.nod_on_wake {
            self.submit(Routine::Action(Action::Nod));
        }
    }

    fn dispatch(&mut self, directive: Directive) {
        // a critical hazard lands before the next command
        self.on_hazard();

        match directive {
            Directive::WakeWord => self.say(STILL_HERE),
            Directive::Action(action) => self.request_action(action, true),
            Directive::ModeChange(target) => self.change_mode(target),
            Directive::Sound(cue) => self.play(cue),
            Directive::Query(query) => self.answer(query),
            Directive::Unrecognized(text) => self.unrecognized(text),
        }
    }

    fn request_action(&mut self, action: Action, acknowledge: bool) {
        match self.session.mode {
            Mode::Autonomous(kind) if action == Action::Stop => {
                self.say(STOPPED);
                self.leave_autonomous(kind);
            }
            Mode::Autonomous(kind) => {
                self.say(&format!("I'm in {} mode. Say stop mode first.", kind));
                self.drop_directive(Routine::Action(action));
            }
            Mode::Awake => {
                if action == Action::Stop {
                    self.say(STOPPED);
                } else if acknowledge {
                    self.say(&format!("Got it, {}!", action));
                }
                self.submit(Routine::Action(action));
            }
            Mode::Sleeping | Mode::ShuttingDown => self.drop_directive(Routine::Action(action)),
        }
    }

    fn change_mode(&mut self, target: ModeTarget) {
        match target {
            ModeTarget::Sleep => self.fall_asleep(SleepReason::Requested),
            ModeTarget::Awake => {
                match self.session.mode.autonomous_kind() {
                    Some(kind) => self.leave_autonomous(kind),
                    None => self.abandon(),
                }
                self.say(AUTONOMOUS_STOPPED);
            }
            ModeTarget::Autonomous(kind) => self.enter_autonomous(kind),
        }
    }

    fn enter_autonomous(&mut self, kind: AutonomousKind) {
        if let Mode::Autonomous(current) = self.session.mode {
            if current != kind {
                info!(%current, requested = %kind, "autonomous switch needs stop mode first");
                self.say(&format!("I'm already in {} mode. Say stop mode first.", current));
                self.drop_directive(Routine::Autonomous(kind));
                return;
            }
        }

        self.say(&format!("Starting {} mode. Say stop to exit.", kind));
        self.set_mode(Mode::Autonomous(kind));

        if kind == AutonomousKind::ObstacleAvoidance && self.hazards.levels().any_critical() {
            info!("hazard still critical, obstacle avoidance waits for it to clear");
            self.hazard_hold = true;
            self.abandon();
            return;
        }
        self.hazard_hold = false;
        self.submit(Routine::Autonomous(kind));
    }

    fn leave_autonomous(&mut self, kind: AutonomousKind) {
        info!(mode = %kind, "leaving autonomous mode");
        self.hazard_hold = false;
        self.abandon();
        self.set_mode(Mode::Awake);
    }

    fn fall_asleep(&mut self, reason: SleepReason) {
        let wake = self
            .config
            .wake
            .phrases
            .first()
            .map(String::as_str)
            .unwrap_or("okay robot");
        let announcement = match reason {
            SleepReason::IdleTimeout => format!(
                "I haven't heard anything for a while. Going to sleep. Say '{}' to wake me again.",
                wake
            ),
            SleepReason::Requested => format!("Going to sleep. Say '{}' to wake me again.", wake),
        };
        self.say(&announcement);

        self.hazard_hold = false;
        self.abandon();
        self.cancel_consultation();
        self.set_mode(Mode::Sleeping);
        self.emit(SessionEvent::Slept { reason });
    }

    fn on_idle_timeout(&mut self) {
        if self.session.mode.is_attentive() {
            info!(
                timeout_secs = self.config.wake.command_timeout_secs,
                "command timeout, going to sleep"
            );
            self.fall_asleep(SleepReason::IdleTimeout);
        }
    }

    fn play(&mut self, cue: SoundCue) {
        self.speaker.play(cue);
        match cue {
            SoundCue::Horn => self.say("Beep beep!"),
            SoundCue::Engine => self.say("Vroom vroom!"),
        }
    }

    fn answer(&mut self, query: Query) {
        match query {
            Query::Status => match self.library.actuator().read_distance() {
                Ok(distance) if distance >= 0.0 => self.say(&format!(
                    "I'm doing great! Distance ahead is {} centimeters.",
                    round_cm(distance)
                )),
                Ok(_) => self.say("I'm doing great and ready for commands!"),
                Err(e) => {
                    warn!(error = %e, "distance read failed");
                    self.say("I'm doing great and ready for commands!");
                }
            },
            Query::Help => self.say(HELP),
        }
    }

    fn unrecognized(&mut self, text: String) {
        let fallback = match &self.fallback {
            Some(fallback) if !text.is_empty() => Arc::clone(fallback),
            _ => {
                info!(%text, "not understood");
                self.say(NOT_UNDERSTOOD);
                return;
            }
        };

        if let Some(previous) = self.consultation.take() {
            debug!(previous = %previous.text, "superseding fallback request");
            previous.handle.abort();
        }

        let prompt = self.fallback_prompt(&text);
        let context = self.conversation.recent();
        let limit = self.config.fallback_timeout();
        info!(%text, turns = context.len(), "asking fallback");

        let handle = tokio::spawn(async move {
            match timeout(limit, fallback.respond(&prompt, &context)).await {
                Ok(result) => result,
                Err(_) => Err(FallbackError::Timeout(limit)),
            }
        });
        self.consultation = Some(Consultation { text, handle });
    }

    /// Prefix the transcript with the proximity reading while too close
    fn fallback_prompt(&self, text: &str) -> String {
        if self.hazards.levels().get(HazardKind::Proximity) != Some(Severity::Critical) {
            return text.to_string();
        }
        let distance = self.library.actuator().read_distance().unwrap_or(0.0);
        format!("<<<Ultrasonic sense too close: {}cm>>> {}", round_cm(distance), text)
    }

    fn on_fallback_reply(&mut self, result: Result<FallbackResult, JoinError>) {
        let Some(done) = self.consultation.take() else {
            return;
        };
        if !self.session.mode.is_attentive() {
            debug!(text = %done.text, "discarding fallback reply");
            return;
        }

        match result {
            Ok(Ok(reply)) => {
                info!(speech = %reply.speech, directives = ?reply.directives, "fallback replied");
                self.session.touch();
                self.conversation.push(done.text, reply.speech.clone());
                if !reply.speech.is_empty() {
                    self.say(&reply.speech);
                }
                self.act_on_reply(reply.directives);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "fallback failed");
                self.say(APOLOGY);
            }
            Err(e) => {
                error!(error = %e, "fallback task failed");
                self.say(APOLOGY);
            }
        }
    }

    /// A named mode wins over named actions; several actions run as one sequence
    fn act_on_reply(&mut self, directives: Vec<Directive>) {
        let mut target = None;
        let mut actions = Vec::new();
        for directive in directives {
            match directive {
                Directive::ModeChange(t) if target.is_none() => target = Some(t),
                Directive::Action(action) => actions.push(action),
                other => debug!(directive = %other, "ignoring fallback directive"),
            }
        }

        if let Some(target) = target {
            if !actions.is_empty() {
                debug!(?actions, "mode change replaces the named actions");
            }
            self.change_mode(target);
            return;
        }
        match actions.as_slice() {
            [] => {}
            [action] => self.request_action(*action, false),
            _ => self.request_sequence(actions),
        }
    }

    fn request_sequence(&mut self, actions: Vec<Action>) {
        let routine = Routine::Sequence(actions);
        match self.session.mode {
            Mode::Awake => self.submit(routine),
            Mode::Autonomous(kind) => {
                self.say(&format!("I'm in {} mode. Say stop mode first.", kind));
                self.drop_directive(routine);
            }
            Mode::Sleeping | Mode::ShuttingDown => self.drop_directive(routine),
        }
    }

    fn cancel_consultation(&mut self) {
        if let Some(consultation) = self.consultation.take() {
            debug!(text = %consultation.text, "dropping outstanding fallback request");
            consultation.handle.abort();
        }
    }

    fn on_hazard(&mut self) {
        let (event, levels) = self.hazards.take();

        if let Some(event) = event {
            self.hazard_active = true;
            self.emit(SessionEvent::HazardRaised {
                kind: event.kind,
                severity: event.severity,
            });
            match event.severity {
                Severity::Critical => self.preempt(event),
                Severity::Warn => self.forward_warning(event),
            }
        }

        if self.hazard_active && levels.is_clear() {
            self.hazard_active = false;
            info!("hazards cleared");
            self.emit(SessionEvent::HazardCleared);
        }

        if self.hazard_hold && !levels.any_critical() {
            self.resume_after_hazard();
        }
    }

    /// Stop everything for a CRITICAL without changing mode
    fn preempt(&mut self, event: HazardEvent) {
        warn!(
            kind = ?event.kind,
            value = event.measured_value,
            mode = %self.session.mode,
            "critical hazard, stopping"
        );
        if let Some(dropped) = self.pending.take() {
            self.drop_directive(dropped);
        }
        if self.session.mode == Mode::Autonomous(AutonomousKind::ObstacleAvoidance) {
            self.hazard_hold = true;
        }
        self.halt();
    }

    fn forward_warning(&self, event: HazardEvent) {
        if self.session.mode != Mode::Autonomous(AutonomousKind::ObstacleAvoidance) || event.kind != HazardKind::Proximity {
            debug!(kind = ?event.kind, "warning ignored in this mode");
            return;
        }
        if let Some(tx) = self.in_flight.as_ref().and_then(|f| f.warnings.as_ref()) {
            if tx.try_send(event).is_err() {
                debug!("avoidance policy busy, warning dropped");
            }
        }
    }

    fn resume_after_hazard(&mut self) {
        self.hazard_hold = false;
        if self.session.mode == Mode::Autonomous(AutonomousKind::ObstacleAvoidance) {
            info!("hazard cleared, resuming obstacle avoidance");
            self.submit(Routine::Autonomous(AutonomousKind::ObstacleAvoidance));
        }
    }

    /// Run `routine` now, or cancel the current one and run it next
    fn submit(&mut self, routine: Routine) {
        match &self.in_flight {
            None => self.start(routine),
            Some(current) => {
                debug!(current = %current.routine, next = %routine, "interrupting for newer directive");
                current.cancel.cancel();
                if let Some(dropped) = self.pending.replace(routine) {
                    self.drop_directive(dropped);
                }
            }
        }
    }

    fn start(&mut self, routine: Routine) {
        let cancel = CancellationToken::new();
        let library = self.library.clone();
        let token = cancel.clone();

        let (handle, warnings) = if let Routine::Autonomous(kind) = routine {
            let (tx, rx) = mpsc::channel(WARNING_BUFFER);
            let config = Arc::clone(&self.config);
            let handle = tokio::spawn(async move { library.run_autonomous(kind, &config, &token, rx).await });
            (handle, Some(tx))
        } else {
            let steps = routine.steps(&self.config.motion).unwrap_or_default();
            let handle = tokio::spawn(async move { library.perform(&steps, &token).await });
            (handle, None)
        };

        info!(routine = %routine, "routine started");
        self.emit(SessionEvent::RoutineStarted {
            name: routine.to_string(),
        });
        self.in_flight = Some(InFlight {
            routine,
            cancel,
            handle,
            started_at: Instant::now(),
            warnings,
        });
    }

    fn on_routine_finished(&mut self, result: Result<RoutineResult, JoinError>) {
        let Some(done) = self.in_flight.take() else {
            return;
        };
        let name = done.routine.to_string();
        let duration_ms = done.started_at.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(Outcome::Completed)) => {
                info!(routine = %name, duration_ms, "routine completed");
                self.emit(SessionEvent::RoutineCompleted { name, duration_ms });
            }
            Ok(Ok(Outcome::Interrupted)) => {
                info!(routine = %name, duration_ms, "routine interrupted");
                self.emit(SessionEvent::RoutineInterrupted { name, duration_ms });
            }
            Ok(Err(e)) => self.routine_failed(name, e.to_string()),
            Err(e) => {
                // the task never reached its own safe-stop
                if let Err(stop) = self.library.safe_stop() {
                    error!(error = %stop, "safe-stop after task failure failed");
                }
                self.routine_failed(name, e.to_string());
            }
        }

        self.start_pending();
    }

    fn routine_failed(&mut self, name: String, error: String) {
        error!(action = %name, %error, "routine failed");
        self.emit(SessionEvent::RoutineFailed { name, error });
        if self.session.mode.autonomous_kind().is_some() {
            self.hazard_hold = false;
            self.set_mode(Mode::Awake);
        }
    }

    fn start_pending(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(routine) = self.pending.take() else {
            return;
        };
        let runnable = match routine {
            Routine::Action(_) | Routine::Sequence(_) => self.session.mode == Mode::Awake,
            Routine::Autonomous(kind) => self.session.mode == Mode::Autonomous(kind) && !self.hazard_hold,
        };
        if runnable {
            self.start(routine);
        } else {
            self.drop_directive(routine);
        }
    }

    /// Drop the pending directive and bring the actuators to rest
    fn abandon(&mut self) {
        if let Some(dropped) = self.pending.take() {
            self.drop_directive(dropped);
        }
        self.halt();
    }

    /// Cancel the running routine, or safe-stop directly when idle
    fn halt(&mut self) {
        match &self.in_flight {
            Some(current) => current.cancel.cancel(),
            None => {
                if let Err(e) = self.library.safe_stop() {
                    error!(error = %e, "safe-stop failed");
                }
            }
        }
    }

    fn drop_directive(&self, routine: Routine) {
        debug!(%routine, "directive dropped");
        self.emit(SessionEvent::DirectiveDropped {
            directive: routine.to_string(),
        });
    }

    fn set_mode(&mut self, mode: Mode) {
        let old = self.session.mode;
        if old == mode {
            return;
        }
        info!(from = %old, to = %mode, "mode transition");

        if let Mode::Autonomous(kind) = old {
            self.emit(SessionEvent::ModeExited { mode: kind.to_string() });
        }
        self.session.mode = mode;
        if let Mode::Autonomous(kind) = mode {
            self.emit(SessionEvent::ModeEntered { mode: kind.to_string() });
        }
    }

    async fn shut_down(&mut self) {
        info!("session shutting down");
        self.set_mode(Mode::ShuttingDown);
        self.pending = None;
        self.cancel_consultation();

        if let Some(current) = self.in_flight.take() {
            current.cancel.cancel();
            match timeout(self.config.shutdown_timeout(), current.handle).await {
                Ok(_) => debug!(routine = %current.routine, "routine wound down"),
                Err(_) => warn!(routine = %current.routine, "routine did not stop in time"),
            }
        }

        if let Err(e) = self.library.safe_stop() {
            error!(error = %e, "final safe-stop failed");
        }
        info!("session stopped");
    }

    fn say(&self, text: &str) {
        self.speaker.say(text);
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "session event");
        let _ = self.event_tx.send(event);
    }
}

async fn routine_finished(slot: &mut Option<InFlight>) -> Result<RoutineResult, JoinError> {
    match slot {
        Some(in_flight) => (&mut in_flight.handle).await,
        None => std::future::pending().await,
    }
}

async fn consultation_finished(slot: &mut Option<Consultation>) -> Result<FallbackResult, JoinError> {
    match slot {
        Some(consultation) => (&mut consultation.handle).await,
        None => std::future::pending().await,
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn round_cm(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}
