//! Outbound reports: output status, heartbeat and sensor telemetry.
//!
//! Everything here only reads state.

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::CommandKind;
use crate::error::ErrorKind;
use crate::output::DeviceOutput;
use crate::sensors::SensorSnapshot;
use crate::transport::{publish_json, Publisher};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub cmd: &'static str,
    pub status: u8,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatPayload<'a> {
    #[serde(rename = "espID")]
    pub device_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TelemetryPayload {
    #[serde(rename = "Temp")]
    pub temperature_c: f64,
    pub humidity: f64,
    pub water_percent: u8,
}

impl From<&SensorSnapshot> for TelemetryPayload {
    fn from(s: &SensorSnapshot) -> Self {
        Self {
            temperature_c: s.temperature_c,
            humidity: s.humidity_pct,
            water_percent: s.water_percent(),
        }
    }
}

pub fn status_payloads(output: &dyn DeviceOutput) -> Vec<StatusPayload> {
    CommandKind::ALL
        .iter()
        .map(|&kind| StatusPayload {
            cmd: kind.status_key(),
            status: u8::from(output.get(kind).is_on()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Publish one status message per actuator on the device topic. Returns how
/// many were accepted by the transport.
pub fn report_status(publisher: &dyn Publisher, topic: &str, output: &dyn DeviceOutput) -> usize {
    let mut sent = 0;
    for payload in status_payloads(output) {
        match publish_json(publisher, topic, &payload) {
            Ok(()) => sent += 1,
            Err(e) => warn!(output = payload.cmd, "status report dropped: {e}"),
        }
    }
    debug!(%topic, sent, "status reported");
    sent
}

pub fn report_heartbeat(
    publisher: &dyn Publisher,
    topic: &str,
    device_id: &str,
) -> Result<(), ErrorKind> {
    publish_json(publisher, topic, &HeartbeatPayload { device_id })
}

pub fn report_telemetry(
    publisher: &dyn Publisher,
    topic: &str,
    snapshot: &SensorSnapshot,
) -> Result<(), ErrorKind> {
    publish_json(publisher, topic, &TelemetryPayload::from(snapshot))
}
