use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::command::{CommandKind, OnOff};
use crate::output::DeviceOutput;
use crate::schedule::{ScheduleEntry, ScheduleStore};
use crate::sensors::SensorSnapshot;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

/// Read-only mirror of the control loop's state for the web endpoint. Only
/// the control loop writes it.
pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub device_id: String,
    pub mqtt_connected: bool,
    pub outputs: BTreeMap<&'static str, OnOff>,
    pub schedules: Vec<ScheduleEntry>,
    pub sensors: Option<SensorSnapshot>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Command,
    Schedule,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub device_id: String,
    pub mqtt_connected: bool,
    pub outputs: BTreeMap<&'static str, OnOff>,
    pub schedules: Vec<ScheduleEntry>,
    pub sensors: Option<SensorSnapshot>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(device_id: &str) -> Self {
        Self {
            started_at: Instant::now(),
            device_id: device_id.to_string(),
            mqtt_connected: false,
            outputs: CommandKind::ALL
                .iter()
                .map(|k| (k.status_key(), OnOff::Off))
                .collect(),
            schedules: Vec::new(),
            sensors: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared(device_id: &str) -> SharedState {
        Arc::new(RwLock::new(Self::new(device_id)))
    }

    /// Copy the current outputs and pending schedules.
    pub fn sync(&mut self, output: &dyn DeviceOutput, store: &ScheduleStore) {
        for kind in CommandKind::ALL {
            self.outputs.insert(kind.status_key(), output.get(kind));
        }
        self.schedules = store.entries().to_vec();
    }

    pub fn record_sensors(&mut self, snapshot: SensorSnapshot) {
        self.sensors = Some(snapshot);
    }

    pub fn record(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            device_id: self.device_id.clone(),
            mqtt_connected: self.mqtt_connected,
            outputs: self.outputs.clone(),
            schedules: self.schedules.clone(),
            sensors: self.sensors,
            events: self.events.iter().rev().cloned().collect(),
        }
    }
}
