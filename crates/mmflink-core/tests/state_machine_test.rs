//! State Machine Tests
//!
//! Drives decoded commands and local print events through the transition
//! table and checks the resulting action state and task id:
//! - Print / cancel / done sequences
//! - Cancel while idle
//! - Unknown codes

use mmflink_core::action::{ActionState, PrintEvent, TaskUpdate, Transition};
use mmflink_core::message::InboundCommand;

#[derive(Debug, Default)]
struct Device {
    action: ActionState,
    task_id: String,
}

impl Device {
    fn apply(&mut self, transition: Transition) {
        if let Some(action) = transition.action {
            self.action = action;
        }
        match transition.task {
            TaskUpdate::Keep => {}
            TaskUpdate::Set(id) => self.task_id = id,
            TaskUpdate::Clear => self.task_id.clear(),
        }
    }

    fn command(&mut self, payload: &str) {
        let cmd = InboundCommand::from_slice(payload.as_bytes()).unwrap();
        self.apply(Transition::for_command(&cmd.action, cmd.task_id.as_deref()));
    }

    fn event(&mut self, event: PrintEvent) {
        self.apply(Transition::for_print_event(event));
    }
}

#[test]
fn test_print_then_cancel() {
    let mut device = Device::default();
    device.command(r#"{"action_code":"101","task_id":"T1","filename":"f.gcode"}"#);
    assert_eq!(device.action, ActionState::Printing);
    assert_eq!(device.task_id, "T1");

    device.command(r#"{"action_code":"103"}"#);
    assert_eq!(device.action, ActionState::CancelRequested);
    assert!(device.task_id.is_empty());

    device.event(PrintEvent::Cancelled);
    assert_eq!(device.action, ActionState::Idle);
}

#[test]
fn test_repeated_cancel_when_idle() {
    let mut device = Device::default();
    for _ in 0..3 {
        device.command(r#"{"action_code":"103"}"#);
        assert!(device.task_id.is_empty());
        assert_eq!(device.action.status_label(), "free");
    }
    device.event(PrintEvent::Cancelled);
    assert_eq!(device.action, ActionState::Idle);
    assert!(device.task_id.is_empty());
}

#[test]
fn test_local_events_interleaved() {
    let mut device = Device::default();
    device.command(r#"{"action_code":"101","task_id":"T2","filename":"a.gcode"}"#);
    device.command(r#"{"action_code":"102"}"#);
    assert_eq!(device.action, ActionState::Paused);

    // Local pause confirmation lands after the remote request.
    device.event(PrintEvent::Paused);
    assert_eq!(device.action, ActionState::Printing);

    device.command(r#"{"action_code":"104"}"#);
    assert_eq!(device.action, ActionState::ResumeRequested);
    device.event(PrintEvent::Resumed);
    assert_eq!(device.action, ActionState::Printing);
    assert_eq!(device.task_id, "T2");

    device.event(PrintEvent::Done);
    assert_eq!(device.action, ActionState::Idle);
}

#[test]
fn test_new_print_replaces_task() {
    let mut device = Device::default();
    device.command(r#"{"action_code":"101","task_id":"T1","filename":"a.gcode"}"#);
    device.command(r#"{"action_code":"101","task_id":"T9","filename":"b.gcode"}"#);
    assert_eq!(device.task_id, "T9");
}

#[test]
fn test_unknown_and_status_codes_change_nothing() {
    let mut device = Device::default();
    device.command(r#"{"action_code":"100"}"#);
    assert_eq!(device.action, ActionState::Prepare);

    device.command(r#"{"action_code":"777"}"#);
    device.command(r#"{"action_code":"300"}"#);
    device.command(r#"{"action_code":"000"}"#);
    assert_eq!(device.action, ActionState::Prepare);
}
