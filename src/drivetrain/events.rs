//! Gear-change notifications. The drivetrain pushes; the car drains and hands
//! them to the assists in the same tick, before the driveline integrates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DrivetrainEvent {
    ShiftRequested { from: usize, to: usize },
    GearEngaged { gear: usize },
    Grinding { target: usize, mismatch_rpm: f32 },
    RequestTimedOut { target: usize },
}

impl DrivetrainEvent {
    pub fn is_downshift_request(&self) -> bool {
        matches!(self, DrivetrainEvent::ShiftRequested { from, to } if to < from)
    }
}

#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: Vec<DrivetrainEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: DrivetrainEvent) {
        tracing::debug!(?event, "drivetrain event");
        self.events.push(event);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, DrivetrainEvent> {
        self.events.drain(..)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
