//! Wire types for inbound commands and the fixed-width trigger timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "PUMP", alias = "pump")]
    Pump,
    #[serde(rename = "LIGHT", alias = "light")]
    Light,
    #[serde(rename = "VALVE", alias = "valve")]
    Valve,
}

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [Self::Pump, Self::Light, Self::Valve];

    /// Key used in outbound status reports ("pump", "light", "valve").
    pub fn status_key(self) -> &'static str {
        match self {
            Self::Pump => "pump",
            Self::Light => "light",
            Self::Valve => "valve",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pump => write!(f, "PUMP"),
            Self::Light => write!(f, "LIGHT"),
            Self::Valve => write!(f, "VALVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnOff {
    #[serde(rename = "on", alias = "ON")]
    On,
    #[serde(rename = "off", alias = "OFF")]
    Off,
}

impl OnOff {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Local wall-clock time as `YYYY-MM-DDTHH:MM:SS`.
///
/// The width is fixed and every field is zero-padded, so the derived
/// (lexicographic) ordering of the inner string is chronological ordering.
/// Construction always goes through [`Timestamp::parse`] or
/// [`Timestamp::from_datetime`], which enforce that shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(String);

const TIMESTAMP_LEN: usize = 19;

impl Timestamp {
    pub fn parse(s: &str) -> Result<Self, ErrorKind> {
        if s.len() != TIMESTAMP_LEN {
            return Err(ErrorKind::ParseError(format!(
                "timestamp '{s}' is not YYYY-MM-DDTHH:MM:SS"
            )));
        }
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
        .map_err(|e| ErrorKind::ParseError(format!("timestamp '{s}': {e}")))?;
        Ok(Self(s.to_string()))
    }

    pub fn from_datetime(dt: PrimitiveDateTime) -> Result<Self, ErrorKind> {
        let s = dt
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]"
            ))
            .map_err(|_| ErrorKind::ClockUnavailable)?;
        Self::parse(&s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Timestamp {
    type Error = ErrorKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// `action` field. Anything other than `"schedule"` is kept verbatim and
/// treated as a plain command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Schedule,
    Other(String),
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        if s == "schedule" {
            Self::Schedule
        } else {
            Self::Other(s)
        }
    }
}

impl From<Value> for Action {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Self::from(s),
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Scheduled,
    Deleted,
}

/// A decoded command payload. Every field is optional on the wire; whether
/// the message means anything is decided by the router and dispatcher.
/// `status` and `time` are only kept when `action` is `"schedule"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub cmd: Option<CommandKind>,
    pub value: Option<OnOff>,
    pub action: Option<Action>,
    pub status: Option<ScheduleStatus>,
    pub time: Option<Timestamp>,
}

impl Command {
    pub fn immediate(cmd: CommandKind, value: OnOff) -> Self {
        Self {
            cmd: Some(cmd),
            value: Some(value),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn schedule(cmd: CommandKind, value: OnOff, status: ScheduleStatus, time: Timestamp) -> Self {
        Self {
            cmd: Some(cmd),
            value: Some(value),
            action: Some(Action::Schedule),
            status: Some(status),
            time: Some(time),
        }
    }

    pub fn is_schedule(&self) -> bool {
        self.action == Some(Action::Schedule)
    }
}

/// Command as it appears on the wire. The schedule-only fields stay raw
/// until `action` says they matter.
#[derive(Deserialize)]
struct WireCommand {
    cmd: Option<CommandKind>,
    value: Option<OnOff>,
    action: Option<Value>,
    status: Option<Value>,
    time: Option<Value>,
}

impl TryFrom<WireCommand> for Command {
    type Error = ErrorKind;

    fn try_from(w: WireCommand) -> Result<Self, Self::Error> {
        let mut command = Command {
            cmd: w.cmd,
            value: w.value,
            action: w.action.map(Action::from),
            ..Command::default()
        };
        if command.is_schedule() {
            command.status = w.status.map(ScheduleStatus::deserialize).transpose()?;
            command.time = w.time.map(Timestamp::deserialize).transpose()?;
        }
        Ok(command)
    }
}

/// Our own `{"cmd":"pump","status":1}` report, echoed back by the broker on
/// the device topic. Any other field makes it a command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusEcho {
    pub cmd: String,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    StatusEcho(StatusEcho),
    Command(Command),
}

/// Decode a transport payload. This is the only place a `ParseError` is
/// produced for inbound traffic.
pub fn decode(payload: &[u8]) -> Result<IncomingMessage, ErrorKind> {
    let value: Value = serde_json::from_slice(payload)?;
    if let Ok(echo) = StatusEcho::deserialize(&value) {
        return Ok(IncomingMessage::StatusEcho(echo));
    }
    let wire = WireCommand::deserialize(value)?;
    Command::try_from(wire).map(IncomingMessage::Command)
}

// ===========================================================================
// Tests
// ===========================================================================
