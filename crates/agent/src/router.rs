//! Topic layout and inbound message routing.
//!
//! ```text
//!  <device_id>/device   ──▶ immediate guard ──▶ dispatch()
//!                       └─▶ schedule guard  ──▶ ScheduleStore add / remove
//!  <group_id>/schedule  ──▶ schedule guard  ──▶ ScheduleStore add / remove
//! ```
//!
//! The two guards are evaluated independently; a device-topic message that
//! carries both a command shape and schedule metadata goes through both, and
//! `dispatch()` applies its own suppression.

use tracing::{debug, info, warn};

use crate::command::{decode, Command, IncomingMessage, ScheduleStatus};
use crate::dispatch::{dispatch, Dispatch};
use crate::error::ErrorKind;
use crate::output::DeviceOutput;
use crate::schedule::{ScheduleEntry, ScheduleStore};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub device: String,
    pub group: Option<String>,
    pub heartbeat: String,
    pub telemetry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    Device,
    Group,
}

impl Topics {
    pub fn new(device_id: &str, group_id: Option<&str>) -> Self {
        Self {
            device: format!("{device_id}/device"),
            group: group_id.map(|g| format!("{g}/schedule")),
            heartbeat: format!("{device_id}/id"),
            telemetry: format!("{device_id}/Sensor"),
        }
    }

    /// Topics that must be (re)subscribed after every connect.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics = vec![self.device.clone()];
        topics.extend(self.group.clone());
        topics
    }

    pub fn classify(&self, topic: &str) -> Option<TopicClass> {
        if topic == self.device {
            Some(TopicClass::Device)
        } else if self.group.as_deref() == Some(topic) {
            Some(TopicClass::Group)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Routing outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEdit {
    Added(ScheduleEntry),
    AlreadyPending,
    Removed(ScheduleEntry),
    NotFound,
    /// `action: "schedule"` with `status` but no `cmd`, `value` or `time`.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    UnknownTopic,
    Malformed(ErrorKind),
    StatusEcho,
    Handled {
        immediate: Option<Dispatch>,
        schedule: Option<ScheduleEdit>,
    },
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Route one inbound message. Problems are logged here and reported in the
/// returned summary; nothing is propagated as an error.
pub fn route(
    topics: &Topics,
    topic: &str,
    payload: &[u8],
    store: &mut ScheduleStore,
    output: &mut dyn DeviceOutput,
) -> Routed {
    let Some(class) = topics.classify(topic) else {
        debug!(%topic, "unhandled topic");
        return Routed::UnknownTopic;
    };

    let command = match decode(payload) {
        Ok(IncomingMessage::Command(c)) => c,
        Ok(IncomingMessage::StatusEcho(_)) => return Routed::StatusEcho,
        Err(e) => {
            warn!(%topic, "dropping message: {e}");
            return Routed::Malformed(e);
        }
    };

    let immediate = (class == TopicClass::Device && command.cmd.is_some() && command.value.is_some())
        .then(|| dispatch(&command, output));

    let schedule = (command.is_schedule() && command.status.is_some())
        .then(|| edit_schedule(&command, store));

    if immediate.is_none() && schedule.is_none() {
        debug!(%topic, "message has no actionable fields");
    }

    Routed::Handled {
        immediate,
        schedule,
    }
}

fn edit_schedule(command: &Command, store: &mut ScheduleStore) -> ScheduleEdit {
    let (Some(kind), Some(value), Some(time), Some(status)) =
        (command.cmd, command.value, command.time.clone(), command.status)
    else {
        return ScheduleEdit::Incomplete;
    };

    match status {
        ScheduleStatus::Scheduled => {
            let entry = ScheduleEntry {
                command: kind,
                value,
                trigger_time: time.clone(),
            };
            if store.add(kind, value, time) {
                info!(output = %kind, %value, trigger_time = %entry.trigger_time, "schedule added");
                ScheduleEdit::Added(entry)
            } else {
                debug!(output = %kind, %value, trigger_time = %entry.trigger_time, "schedule already pending");
                ScheduleEdit::AlreadyPending
            }
        }
        ScheduleStatus::Deleted => match store.remove_matching(kind, value, &time) {
            Some(entry) => {
                info!(output = %kind, %value, trigger_time = %time, "schedule deleted");
                ScheduleEdit::Removed(entry)
            }
            None => {
                debug!(output = %kind, %value, trigger_time = %time, "{}", ErrorKind::NotFound);
                ScheduleEdit::NotFound
            }
        },
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, OnOff, Timestamp};
    use crate::output::RecordingOutput;

    fn topics() -> Topics {
        Topics::new("1", Some("greenhouse"))
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn run(topic: &str, json: &str) -> (Routed, ScheduleStore, RecordingOutput) {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        let routed = route(&topics(), topic, json.as_bytes(), &mut store, &mut out);
        (routed, store, out)
    }

    // -- Topics ---------------------------------------------------------

    #[test]
    fn topic_names() {
        let t = topics();
        assert_eq!(t.device, "1/device");
        assert_eq!(t.group.as_deref(), Some("greenhouse/schedule"));
        assert_eq!(t.heartbeat, "1/id");
        assert_eq!(t.telemetry, "1/Sensor");
    }

    #[test]
    fn subscriptions_include_group_when_configured() {
        assert_eq!(topics().subscriptions(), ["1/device", "greenhouse/schedule"]);
        assert_eq!(Topics::new("7", None).subscriptions(), ["7/device"]);
    }

    #[test]
    fn classify_topics() {
        let t = topics();
        assert_eq!(t.classify("1/device"), Some(TopicClass::Device));
        assert_eq!(t.classify("greenhouse/schedule"), Some(TopicClass::Group));
        assert_eq!(t.classify("2/device"), None);
        assert_eq!(t.classify("1/device/extra"), None);
        assert_eq!(t.classify(""), None);
    }

    // -- Immediate path ---------------------------------------------------

    #[test]
    fn immediate_command_actuates_and_leaves_store_alone() {
        let (routed, store, out) = run("1/device", r#"{"cmd":"PUMP","value":"on"}"#);
        assert_eq!(
            routed,
            Routed::Handled {
                immediate: Some(Dispatch::Applied {
                    kind: CommandKind::Pump,
                    value: OnOff::On
                }),
                schedule: None
            }
        );
        assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)]);
        assert!(store.is_empty());
    }

    #[test]
    fn immediate_command_on_group_topic_is_ignored() {
        let (routed, _, out) = run("greenhouse/schedule", r#"{"cmd":"PUMP","value":"on"}"#);
        assert_eq!(
            routed,
            Routed::Handled {
                immediate: None,
                schedule: None
            }
        );
        assert!(out.writes.is_empty());
    }

    // -- Schedule path ----------------------------------------------------

    #[test]
    fn schedule_message_adds_once_without_actuating() {
        let json = r#"{"cmd":"VALVE","value":"on","action":"schedule","status":"scheduled","time":"2024-01-01T07:00:00"}"#;
        let (routed, store, out) = run("1/device", json);

        assert!(out.writes.is_empty());
        assert_eq!(store.len(), 1);
        assert!(store
            .find(CommandKind::Valve, OnOff::On, &ts("2024-01-01T07:00:00"))
            .is_some());
        assert!(matches!(
            routed,
            Routed::Handled {
                immediate: Some(Dispatch::Suppressed),
                schedule: Some(ScheduleEdit::Added(_))
            }
        ));
    }

    #[test]
    fn duplicate_schedule_message_is_idempotent() {
        let json = r#"{"cmd":"LIGHT","value":"off","action":"schedule","status":"scheduled","time":"2024-01-01T22:00:00"}"#;
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        route(&topics(), "1/device", json.as_bytes(), &mut store, &mut out);
        let second = route(&topics(), "greenhouse/schedule", json.as_bytes(), &mut store, &mut out);

        assert_eq!(store.len(), 1);
        assert_eq!(
            second,
            Routed::Handled {
                immediate: None,
                schedule: Some(ScheduleEdit::AlreadyPending)
            }
        );
    }

    #[test]
    fn delete_message_removes_matching_entry() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Pump, OnOff::Off, ts("2024-01-01T08:00:00"));

        let json = r#"{"cmd":"PUMP","value":"off","action":"schedule","status":"deleted","time":"2024-01-01T08:00:00"}"#;
        let routed = route(&topics(), "greenhouse/schedule", json.as_bytes(), &mut store, &mut out);

        assert!(store.is_empty());
        assert!(out.writes.is_empty());
        assert!(matches!(
            routed,
            Routed::Handled {
                schedule: Some(ScheduleEdit::Removed(_)),
                ..
            }
        ));
    }

    #[test]
    fn delete_of_missing_entry_is_benign() {
        let json = r#"{"cmd":"PUMP","value":"off","action":"schedule","status":"deleted","time":"2024-01-01T08:00:00"}"#;
        let (routed, store, _) = run("1/device", json);
        assert!(store.is_empty());
        assert!(matches!(
            routed,
            Routed::Handled {
                schedule: Some(ScheduleEdit::NotFound),
                ..
            }
        ));
    }

    #[test]
    fn schedule_without_time_is_incomplete() {
        let json = r#"{"cmd":"PUMP","value":"on","action":"schedule","status":"scheduled"}"#;
        let (routed, store, out) = run("1/device", json);
        assert!(store.is_empty());
        assert!(out.writes.is_empty());
        assert_eq!(
            routed,
            Routed::Handled {
                immediate: Some(Dispatch::Suppressed),
                schedule: Some(ScheduleEdit::Incomplete)
            }
        );
    }

    #[test]
    fn status_without_schedule_action_does_not_edit_store() {
        let json = r#"{"cmd":"PUMP","value":"on","status":"scheduled","time":"2024-01-01T08:00:00"}"#;
        let (routed, store, out) = run("1/device", json);
        assert!(store.is_empty());
        assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)]);
        assert_eq!(
            routed,
            Routed::Handled {
                immediate: Some(Dispatch::Applied {
                    kind: CommandKind::Pump,
                    value: OnOff::On
                }),
                schedule: None
            }
        );
    }

    #[test]
    fn command_with_numeric_status_is_applied() {
        let (routed, store, out) = run("1/device", r#"{"cmd":"PUMP","value":"on","status":1}"#);
        assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)]);
        assert!(store.is_empty());
        assert!(matches!(
            routed,
            Routed::Handled {
                immediate: Some(Dispatch::Applied { .. }),
                schedule: None
            }
        ));
    }

    #[test]
    fn stray_schedule_fields_do_not_block_command() {
        for json in [
            r#"{"cmd":"PUMP","value":"on","time":"soon"}"#,
            r#"{"cmd":"PUMP","value":"on","status":"paused"}"#,
            r#"{"cmd":"PUMP","value":"on","action":5}"#,
        ] {
            let (routed, _, out) = run("1/device", json);
            assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)], "{json}");
            assert!(
                matches!(
                    routed,
                    Routed::Handled {
                        immediate: Some(Dispatch::Applied { .. }),
                        ..
                    }
                ),
                "{json}: {routed:?}"
            );
        }
    }

    #[test]
    fn bad_time_on_schedule_message_is_malformed() {
        let json = r#"{"cmd":"PUMP","value":"on","action":"schedule","status":"scheduled","time":"soon"}"#;
        let (routed, store, out) = run("1/device", json);
        assert!(matches!(routed, Routed::Malformed(ErrorKind::ParseError(_))));
        assert!(store.is_empty());
        assert!(out.writes.is_empty());
    }

    // -- Drops ------------------------------------------------------------

    #[test]
    fn malformed_payload_is_dropped() {
        let (routed, store, out) = run("1/device", "{oops");
        assert!(matches!(routed, Routed::Malformed(ErrorKind::ParseError(_))));
        assert!(store.is_empty());
        assert!(out.writes.is_empty());
    }

    #[test]
    fn partial_payload_is_silently_ignored() {
        let (routed, _, out) = run("1/device", r#"{"value":"on"}"#);
        assert_eq!(
            routed,
            Routed::Handled {
                immediate: None,
                schedule: None
            }
        );
        assert!(out.writes.is_empty());
    }

    #[test]
    fn own_status_echo_is_ignored() {
        let (routed, _, out) = run("1/device", r#"{"cmd":"pump","status":0}"#);
        assert_eq!(routed, Routed::StatusEcho);
        assert!(out.writes.is_empty());
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let (routed, _, out) = run("2/device", r#"{"cmd":"PUMP","value":"on"}"#);
        assert_eq!(routed, Routed::UnknownTopic);
        assert!(out.writes.is_empty());
    }
}
