//! Fixed-interval task table polled from the control loop.
//!
//! Each task is gated by its own interval; the loop calls [`PeriodicTasks::due`]
//! on every tick and runs whatever comes back, in table order.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ScheduleTick,
    Sample,
    Telemetry,
    StatusReport,
    Heartbeat,
    ConnectionCheck,
}

struct Slot {
    kind: TaskKind,
    every: Duration,
    next: Instant,
}

pub struct PeriodicTasks {
    slots: Vec<Slot>,
}

impl PeriodicTasks {
    /// All tasks become due on the first poll.
    pub fn new(table: &[(TaskKind, Duration)], start: Instant) -> Self {
        Self {
            slots: table
                .iter()
                .map(|&(kind, every)| Slot {
                    kind,
                    every,
                    next: start,
                })
                .collect(),
        }
    }

    /// Tasks due at `now`. A task that fell behind fires once, not once per
    /// missed interval.
    pub fn due(&mut self, now: Instant) -> Vec<TaskKind> {
        let mut due = Vec::new();
        for slot in &mut self.slots {
            if now >= slot.next {
                due.push(slot.kind);
                slot.next = now + slot.every;
            }
        }
        due
    }

    pub fn interval(&self, kind: TaskKind) -> Option<Duration> {
        self.slots.iter().find(|s| s.kind == kind).map(|s| s.every)
    }
}
