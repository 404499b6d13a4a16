//! Engine states across a playback session.

use std::fmt;

use crate::config::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    Seek,
    Pause,
    Toggle,
    /// A single-shot mode committed its crop.
    Completed,
}

impl SuspendReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspendReason::Seek => "seek",
            SuspendReason::Pause => "pause",
            SuspendReason::Toggle => "toggle",
            SuspendReason::Completed => "completed",
        }
    }

    /// Suspensions that end on resume rather than on a toggle.
    pub fn is_playback(&self) -> bool {
        matches!(self, SuspendReason::Seek | SuspendReason::Pause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No file loaded yet.
    Unloaded,
    /// File loaded, waiting for a manual start.
    Loaded,
    Active,
    Suspended(SuspendReason),
    /// The detector rejected its configuration; nothing runs until the next
    /// file.
    Disabled,
    Ended,
}

impl EngineState {
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Active)
    }

    /// Running, or paused by playback and expected to come back.
    pub fn is_running(&self) -> bool {
        match self {
            EngineState::Active => true,
            EngineState::Suspended(reason) => reason.is_playback(),
            _ => false,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Unloaded => f.write_str("unloaded"),
            EngineState::Loaded => f.write_str("loaded"),
            EngineState::Active => f.write_str("active"),
            EngineState::Suspended(reason) => write!(f, "suspended ({})", reason.as_str()),
            EngineState::Disabled => f.write_str("disabled"),
            EngineState::Ended => f.write_str("ended"),
        }
    }
}

/// What a manual toggle does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Start,
    Suspend,
    Resume,
    /// Drop the crop, return to source and wait for the next toggle.
    Revert,
    Ignore,
}

pub fn toggle_action(state: EngineState, mode: Mode) -> ToggleAction {
    if mode == Mode::Disabled {
        return ToggleAction::Ignore;
    }
    match state {
        EngineState::Loaded => ToggleAction::Start,
        EngineState::Active | EngineState::Suspended(SuspendReason::Seek | SuspendReason::Pause) => {
            if mode.is_single_shot() {
                ToggleAction::Revert
            } else {
                ToggleAction::Suspend
            }
        }
        EngineState::Suspended(SuspendReason::Toggle) => ToggleAction::Resume,
        EngineState::Suspended(SuspendReason::Completed) => ToggleAction::Revert,
        EngineState::Unloaded | EngineState::Disabled | EngineState::Ended => ToggleAction::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_modes_suspend_and_resume() {
        assert_eq!(
            toggle_action(EngineState::Active, Mode::AutoStart),
            ToggleAction::Suspend
        );
        assert_eq!(
            toggle_action(EngineState::Suspended(SuspendReason::Toggle), Mode::AutoStart),
            ToggleAction::Resume
        );
        assert_eq!(
            toggle_action(EngineState::Loaded, Mode::AutoManual),
            ToggleAction::Start
        );
    }

    #[test]
    fn single_modes_revert() {
        assert_eq!(
            toggle_action(EngineState::Active, Mode::OnDemand),
            ToggleAction::Revert
        );
        assert_eq!(
            toggle_action(
                EngineState::Suspended(SuspendReason::Completed),
                Mode::SingleStart
            ),
            ToggleAction::Revert
        );
    }

    #[test]
    fn disabled_mode_and_terminal_states_ignore_toggle() {
        assert_eq!(
            toggle_action(EngineState::Loaded, Mode::Disabled),
            ToggleAction::Ignore
        );
        assert_eq!(
            toggle_action(EngineState::Disabled, Mode::AutoStart),
            ToggleAction::Ignore
        );
        assert_eq!(
            toggle_action(EngineState::Ended, Mode::AutoStart),
            ToggleAction::Ignore
        );
    }

    #[test]
    fn running_includes_playback_suspensions() {
        assert!(EngineState::Suspended(SuspendReason::Seek).is_running());
        assert!(!EngineState::Suspended(SuspendReason::Toggle).is_running());
        assert_eq!(
            EngineState::Suspended(SuspendReason::Pause).to_string(),
            "suspended (pause)"
        );
    }
}
