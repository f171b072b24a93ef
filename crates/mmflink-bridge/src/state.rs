//! Shared device state: action, task and last temperatures.

use mmflink_core::action::{ActionState, TaskUpdate, Transition};
use mmflink_core::identity::DeviceIdentity;
use mmflink_core::telemetry::{TemperatureSample, Temperatures};
use parking_lot::RwLock;
use std::sync::Arc;

/// Identity shared between the session, the router and the reporter.
pub type SharedIdentity = Arc<RwLock<DeviceIdentity>>;

/// A consistent copy of the device state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub action: ActionState,
    /// Empty when no job is assigned.
    pub task_id: String,
    pub temperatures: Temperatures,
}

/// Lock-guarded device state.
///
/// Inbound commands go through [`DeviceState::apply`], which advances the
/// command epoch. Local printer notifications go through
/// [`DeviceState::observe`] and leave the epoch alone. A print command
/// reserves an epoch when it arrives and lands only through
/// [`DeviceState::apply_if_current`], so any command received after it wins.
#[derive(Debug, Default)]
pub struct DeviceState {
    inner: RwLock<StateCell>,
}

#[derive(Debug, Default)]
struct StateCell {
    current: DeviceSnapshot,
    epoch: u64,
}

impl StateCell {
    fn commit(&mut self, transition: Transition) -> DeviceSnapshot {
        if let Some(action) = transition.action {
            self.current.action = action;
        }
        match transition.task {
            TaskUpdate::Keep => {}
            TaskUpdate::Set(task_id) => self.current.task_id = task_id,
            TaskUpdate::Clear => self.current.task_id.clear(),
        }
        self.current.clone()
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an inbound command's transition and return the state after it.
    /// Anything other than a no-op supersedes pending print commands.
    pub fn apply(&self, transition: Transition) -> DeviceSnapshot {
        let mut cell = self.inner.write();
        if !transition.is_none() {
            cell.epoch += 1;
        }
        cell.commit(transition)
    }

    /// Apply a transition reported by the local printer.
    pub fn observe(&self, transition: Transition) -> DeviceSnapshot {
        self.inner.write().commit(transition)
    }

    /// Claim the next command epoch for a command that completes later.
    pub fn reserve(&self) -> u64 {
        let mut cell = self.inner.write();
        cell.epoch += 1;
        cell.epoch
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Apply `transition` only if no command arrived since `ticket` was
    /// reserved. Returns `None` when the reservation was superseded.
    pub fn apply_if_current(&self, ticket: u64, transition: Transition) -> Option<DeviceSnapshot> {
        let mut cell = self.inner.write();
        if cell.epoch != ticket {
            return None;
        }
        Some(cell.commit(transition))
    }

    pub fn record_temperature(&self, sample: TemperatureSample) {
        self.inner.write().current.temperatures.record(sample);
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.inner.read().current.clone()
    }

    pub fn action(&self) -> ActionState {
        self.inner.read().current.action
    }

    pub fn task_id(&self) -> String {
        self.inner.read().current.task_id.clone()
    }
}
