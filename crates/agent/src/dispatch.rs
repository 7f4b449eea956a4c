//! Immediate command path.
//!
//! A message tagged `action: "schedule"` is schedule metadata and must never
//! reach the actuators from here, whatever the router decided about it.

use tracing::{debug, info};

use crate::command::{Command, CommandKind, OnOff};
use crate::output::DeviceOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The `(cmd, value)` pair was written to the output.
    Applied { kind: CommandKind, value: OnOff },
    /// The message carried `action: "schedule"`.
    Suppressed,
    /// `cmd` or `value` was missing.
    Incomplete,
}

pub fn dispatch(command: &Command, output: &mut dyn DeviceOutput) -> Dispatch {
    if command.is_schedule() {
        debug!(cmd = ?command.cmd, "schedule metadata, not actuating");
        return Dispatch::Suppressed;
    }
    let (Some(kind), Some(value)) = (command.cmd, command.value) else {
        return Dispatch::Incomplete;
    };
    output.set(kind, value);
    info!(output = %kind, %value, "command applied");
    Dispatch::Applied { kind, value }
}
