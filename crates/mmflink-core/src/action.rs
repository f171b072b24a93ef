//! Action codes and the device action state machine.
//!
//! The management service speaks in three-digit action codes. Inbound
//! commands carry one of them, and the device reports its own current code
//! back in every status message. This module keeps both directions as closed
//! enums and owns the transition table between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Action code carried by an inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InboundAction {
    /// `000` - back to idle.
    Idle,
    /// `100` - prepare for an upcoming job.
    Prepare,
    /// `101` - download and print a task.
    Print,
    /// `102` - pause the running print.
    Pause,
    /// `103` - cancel the running print.
    Cancel,
    /// `104` - resume a paused print.
    Resume,
    /// `300` - publish a status report right away.
    StatusRequest,
    /// Any code this device does not understand.
    Unknown(String),
}

impl InboundAction {
    /// Parse a wire code. Never fails: unrecognised codes map to `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "000" => Self::Idle,
            "100" => Self::Prepare,
            "101" => Self::Print,
            "102" => Self::Pause,
            "103" => Self::Cancel,
            "104" => Self::Resume,
            "300" => Self::StatusRequest,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire code for this action.
    pub fn code(&self) -> &str {
        match self {
            Self::Idle => "000",
            Self::Prepare => "100",
            Self::Print => "101",
            Self::Pause => "102",
            Self::Cancel => "103",
            Self::Resume => "104",
            Self::StatusRequest => "300",
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for InboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The device's current high-level action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// No job.
    #[default]
    Idle,
    /// The service announced a job.
    Prepare,
    /// A job is printing.
    Printing,
    /// The service asked for a pause.
    Paused,
    /// The service asked for a cancel.
    CancelRequested,
    /// The service asked for a resume.
    ResumeRequested,
}

impl ActionState {
    /// Wire code reported in status messages.
    pub fn code(self) -> &'static str {
        match self {
            Self::Idle => "000",
            Self::Prepare => "100",
            Self::Printing => "101",
            Self::Paused => "102",
            Self::CancelRequested => "103",
            Self::ResumeRequested => "104",
        }
    }

    /// Human-readable status label reported next to the code.
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Idle | Self::CancelRequested => "free",
            Self::Prepare => "prepare",
            Self::Printing | Self::Paused | Self::ResumeRequested => "printing",
        }
    }

    /// Parse a wire code back into a state.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "000" => Some(Self::Idle),
            "100" => Some(Self::Prepare),
            "101" => Some(Self::Printing),
            "102" => Some(Self::Paused),
            "103" => Some(Self::CancelRequested),
            "104" => Some(Self::ResumeRequested),
            _ => None,
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lifecycle notification from the local printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintEvent {
    Started,
    Done,
    Cancelled,
    Paused,
    Resumed,
}

/// What happens to the current task id on a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    Keep,
    Set(String),
    Clear,
}

/// A state change to apply atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// New action state, `None` to leave it untouched.
    pub action: Option<ActionState>,
    pub task: TaskUpdate,
}

impl Transition {
    /// A transition that changes nothing.
    pub const fn none() -> Self {
        Self {
            action: None,
            task: TaskUpdate::Keep,
        }
    }

    fn to(action: ActionState) -> Self {
        Self {
            action: Some(action),
            task: TaskUpdate::Keep,
        }
    }

    /// Whether applying this transition has no effect.
    pub fn is_none(&self) -> bool {
        self.action.is_none() && self.task == TaskUpdate::Keep
    }

    /// Transition for an inbound command.
    ///
    /// `task_id` is only consulted for print commands.
    pub fn for_command(action: &InboundAction, task_id: Option<&str>) -> Self {
        match action {
            InboundAction::Prepare => Self::to(ActionState::Prepare),
            InboundAction::Print => Self {
                action: Some(ActionState::Printing),
                task: TaskUpdate::Set(task_id.unwrap_or_default().to_string()),
            },
            InboundAction::Pause => Self::to(ActionState::Paused),
            InboundAction::Cancel => Self {
                action: Some(ActionState::CancelRequested),
                task: TaskUpdate::Clear,
            },
            InboundAction::Resume => Self::to(ActionState::ResumeRequested),
            InboundAction::Idle | InboundAction::StatusRequest | InboundAction::Unknown(_) => {
                Self::none()
            }
        }
    }

    /// Transition for a local print-lifecycle notification.
    pub fn for_print_event(event: PrintEvent) -> Self {
        match event {
            PrintEvent::Started | PrintEvent::Paused | PrintEvent::Resumed => {
                Self::to(ActionState::Printing)
            }
            PrintEvent::Done => Self::to(ActionState::Idle),
            PrintEvent::Cancelled => Self {
                action: Some(ActionState::Idle),
                task: TaskUpdate::Clear,
            },
        }
    }
}
