//! Key bindings for the operator keyboard
//!
//! Maps single key presses to the same directives speech produces, plus
//! a quit command.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::actions::{Action, AutonomousKind};
use crate::feedback::SoundCue;
use crate::interpreter::{Directive, ModeTarget, Query};

/// What a key press asks the session to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Arbitrated exactly like a spoken directive
    Directive(Directive),
    /// Shut the daemon down
    Quit,
}

/// Translate one key event; `None` for unbound keys and releases
pub fn command_for(event: &KeyEvent) -> Option<KeyCommand> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    // Ctrl-C in raw mode never reaches the signal handler
    if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c') {
        return Some(KeyCommand::Quit);
    }

    let action = |a| Some(KeyCommand::Directive(Directive::Action(a)));
    let mode = |t| Some(KeyCommand::Directive(Directive::ModeChange(t)));

    match event.code {
        KeyCode::Up => action(Action::Forward),
        KeyCode::Down => action(Action::Backward),
        KeyCode::Left => action(Action::TurnLeft),
        KeyCode::Right => action(Action::TurnRight),
        KeyCode::Esc => Some(KeyCommand::Quit),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            ' ' => action(Action::Stop),
            'w' => action(Action::LookUp),
            'a' => action(Action::LookLeft),
            'x' => action(Action::LookDown),
            'e' => action(Action::LookRight),
            'c' => action(Action::LookCenter),
            'd' => action(Action::Dance),
            's' => action(Action::ShakeHead),
            'n' => action(Action::Nod),
            'v' => action(Action::WaveHands),
            'b' => action(Action::Celebrate),
            'g' => action(Action::ActCute),
            't' => action(Action::Think),
            'p' => action(Action::Patrol),
            'o' => action(Action::SpinAround),
            'j' => action(Action::TwistBody),
            'k' => action(Action::Depressed),
            'r' => action(Action::Reset),
            'h' => Some(KeyCommand::Directive(Directive::Sound(SoundCue::Horn))),
            '1' => mode(ModeTarget::Autonomous(AutonomousKind::LineTracking)),
            '2' => mode(ModeTarget::Autonomous(AutonomousKind::ObstacleAvoidance)),
            '0' => mode(ModeTarget::Awake),
            '?' => Some(KeyCommand::Directive(Directive::Query(Query::Help))),
            'q' => Some(KeyCommand::Quit),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_arrow_keys_drive() {
        assert_eq!(
            command_for(&press(KeyCode::Up)),
            Some(KeyCommand::Directive(Directive::Action(Action::Forward)))
        );
        assert_eq!(
            command_for(&press(KeyCode::Left)),
            Some(KeyCommand::Directive(Directive::Action(Action::TurnLeft)))
        );
    }

    #[test]
    fn test_space_stops() {
        assert_eq!(
            command_for(&press(KeyCode::Char(' '))),
            Some(KeyCommand::Directive(Directive::Action(Action::Stop)))
        );
    }

    #[test]
    fn test_mode_keys() {
        assert_eq!(
            command_for(&press(KeyCode::Char('2'))),
            Some(KeyCommand::Directive(Directive::ModeChange(ModeTarget::Autonomous(
                AutonomousKind::ObstacleAvoidance
            ))))
        );
        assert_eq!(
            command_for(&press(KeyCode::Char('0'))),
            Some(KeyCommand::Directive(Directive::ModeChange(ModeTarget::Awake)))
        );
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(command_for(&press(KeyCode::Char('q'))), Some(KeyCommand::Quit));
        assert_eq!(command_for(&press(KeyCode::Esc)), Some(KeyCommand::Quit));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(command_for(&ctrl_c), Some(KeyCommand::Quit));
    }

    #[test]
    fn test_unbound_and_release() {
        assert_eq!(command_for(&press(KeyCode::Char('z'))), None);
        let mut release = press(KeyCode::Up);
        release.kind = KeyEventKind::Release;
        assert_eq!(command_for(&release), None);
    }
}
