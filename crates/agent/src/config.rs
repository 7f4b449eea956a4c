//! TOML config file loading and validation.
//!
//! Every field has a default, so an empty (or absent) file yields a working
//! development agent.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::output::PinMap;
use crate::tasks::TaskKind;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_id: String,
    /// Devices sharing a group also listen on `<group_id>/schedule`.
    pub group_id: Option<String>,
    pub mqtt: MqttSection,
    pub outputs: OutputsSection,
    pub intervals: IntervalsSection,
    pub clock: ClockSection,
    pub safety: SafetySection,
    pub web: WebSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    pub keep_alive_sec: u64,
    /// Bounded request queue between the client and the event loop.
    pub queue_cap: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputsSection {
    pub pump_pin: i64,
    pub light_pin: i64,
    pub valve_pin: i64,
    pub active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntervalsSection {
    pub schedule_sec: u64,
    pub sample_sec: u64,
    pub telemetry_sec: u64,
    pub status_sec: u64,
    pub heartbeat_sec: u64,
    pub connection_check_sec: u64,
    pub reconnect_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockSection {
    pub utc_offset_hours: i8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    /// Pump is forced off above this water level. `None` disables the cutoff.
    pub pump_cutoff_percent: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub enabled: bool,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "1".to_string(),
            group_id: None,
            mqtt: MqttSection::default(),
            outputs: OutputsSection::default(),
            intervals: IntervalsSection::default(),
            clock: ClockSection::default(),
            safety: SafetySection::default(),
            web: WebSection::default(),
        }
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_sec: 30,
            queue_cap: 20,
        }
    }
}

impl Default for OutputsSection {
    fn default() -> Self {
        Self {
            pump_pin: 21,
            light_pin: 19,
            valve_pin: 18,
            active_low: false,
        }
    }
}

impl Default for IntervalsSection {
    fn default() -> Self {
        Self {
            schedule_sec: 1,
            sample_sec: 2,
            telemetry_sec: 10,
            status_sec: 10,
            heartbeat_sec: 60,
            connection_check_sec: 5,
            reconnect_sec: 2,
        }
    }
}

impl Default for ClockSection {
    fn default() -> Self {
        Self { utc_offset_hours: 7 }
    }
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            pump_cutoff_percent: Some(90),
        }
    }
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: std::ops::RangeInclusive<i64> = 2..=27;

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

impl Config {
    pub fn pin_map(&self) -> PinMap {
        // Range-checked by validate().
        PinMap {
            pump: self.outputs.pump_pin as u8,
            light: self.outputs.light_pin as u8,
            valve: self.outputs.valve_pin as u8,
        }
    }

    pub fn task_table(&self) -> Vec<(TaskKind, Duration)> {
        let i = &self.intervals;
        vec![
            (TaskKind::ScheduleTick, Duration::from_secs(i.schedule_sec)),
            (TaskKind::Sample, Duration::from_secs(i.sample_sec)),
            (TaskKind::Telemetry, Duration::from_secs(i.telemetry_sec)),
            (TaskKind::StatusReport, Duration::from_secs(i.status_sec)),
            (TaskKind::Heartbeat, Duration::from_secs(i.heartbeat_sec)),
            (TaskKind::ConnectionCheck, Duration::from_secs(i.connection_check_sec)),
        ]
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.reconnect_sec)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate the whole config. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_identity(&mut errors);
        self.validate_mqtt(&mut errors);
        self.validate_outputs(&mut errors);
        self.validate_intervals(&mut errors);
        self.validate_misc(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_identity(&self, errors: &mut Vec<String>) {
        check_topic_segment("device_id", &self.device_id, errors);
        if let Some(group) = &self.group_id {
            check_topic_segment("group_id", group, errors);
        }
    }

    fn validate_mqtt(&self, errors: &mut Vec<String>) {
        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt.host is empty".to_string());
        }
        if self.mqtt.port == 0 {
            errors.push("mqtt.port must be non-zero".to_string());
        }
        if self.mqtt.keep_alive_sec == 0 {
            errors.push("mqtt.keep_alive_sec must be positive".to_string());
        }
        if self.mqtt.queue_cap == 0 {
            errors.push("mqtt.queue_cap must be positive".to_string());
        }
    }

    fn validate_outputs(&self, errors: &mut Vec<String>) {
        let mut seen_pins: HashSet<i64> = HashSet::new();
        let o = &self.outputs;

        for (name, pin) in [
            ("pump_pin", o.pump_pin),
            ("light_pin", o.light_pin),
            ("valve_pin", o.valve_pin),
        ] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "outputs.{name} {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else if !seen_pins.insert(pin) {
                errors.push(format!(
                    "outputs.{name} {pin} is already used by another output"
                ));
            }
        }
    }

    fn validate_intervals(&self, errors: &mut Vec<String>) {
        let i = &self.intervals;
        for (name, value) in [
            ("schedule_sec", i.schedule_sec),
            ("sample_sec", i.sample_sec),
            ("telemetry_sec", i.telemetry_sec),
            ("status_sec", i.status_sec),
            ("heartbeat_sec", i.heartbeat_sec),
            ("connection_check_sec", i.connection_check_sec),
            ("reconnect_sec", i.reconnect_sec),
        ] {
            if value == 0 {
                errors.push(format!("intervals.{name} must be positive"));
            }
        }
    }

    fn validate_misc(&self, errors: &mut Vec<String>) {
        if !(-12..=14).contains(&self.clock.utc_offset_hours) {
            errors.push(format!(
                "clock.utc_offset_hours {} out of range [-12, 14]",
                self.clock.utc_offset_hours
            ));
        }
        if let Some(cutoff) = self.safety.pump_cutoff_percent {
            if cutoff > 100 {
                errors.push(format!(
                    "safety.pump_cutoff_percent {cutoff} out of range [0, 100]"
                ));
            }
        }
        if self.web.enabled && self.web.port == 0 {
            errors.push("web.port must be non-zero when web is enabled".to_string());
        }
    }
}

/// Ids become MQTT topic segments: no separators, no wildcards.
fn check_topic_segment(name: &str, value: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{name} is empty"));
    } else if value.contains(['/', '+', '#']) {
        errors.push(format!(
            "{name} '{value}' must not contain '/', '+' or '#'"
        ));
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// defaults.
pub fn load(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::warn!(%path, "config file not found, using defaults");
        Config::default()
    };
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
