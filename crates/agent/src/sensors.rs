//! Environment sensors: temperature, humidity and water level.
//!
//! Sampling the hardware is out of scope for the agent; it only depends on
//! [`SensorSource`]. [`SimSensors`] is a stateful simulator for running the
//! agent on a development host:
//! - random walk with mean reversion for temperature and humidity
//! - per-reading ADC noise on the water level
//! - closed-loop pump response (the tank fills while the pump is on)

use serde::Serialize;

/// Full-scale water level ADC count that maps to 100 %.
pub const WATER_RAW_FULL: i32 = 3900;

/// 12-bit ADC ceiling.
const ADC_MAX: f64 = 4095.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub water_raw: i32,
}

impl SensorSnapshot {
    pub fn water_percent(&self) -> u8 {
        water_percent(self.water_raw)
    }
}

/// Linear map of `raw` from `0..=WATER_RAW_FULL` onto `0..=100`, clamped.
pub fn water_percent(raw: i32) -> u8 {
    let pct = raw.saturating_mul(100) / WATER_RAW_FULL;
    pct.clamp(0, 100) as u8
}

pub trait SensorSource {
    fn sample(&mut self) -> SensorSnapshot;
    /// Tell the source whether the pump is currently running.
    fn set_pumping(&mut self, _on: bool) {}
}

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    (0..12).map(|_| fastrand::f64()).sum::<f64>() - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct SimSensors {
    temperature: f64,
    humidity: f64,
    water: f64,

    temp_center: f64,
    humidity_center: f64,
    mean_reversion: f64,

    /// Evaporation per sample (ADC counts).
    drain_per_sample: f64,
    /// Fill rate per sample while pumping (ADC counts).
    fill_per_sample: f64,
    noise_sigma: f64,
    pumping: bool,
}

impl SimSensors {
    pub fn new() -> Self {
        Self {
            temperature: gaussian(27.0, 1.0),
            humidity: gaussian(65.0, 3.0),
            water: gaussian(1900.0, 150.0),
            temp_center: 27.0,
            humidity_center: 65.0,
            mean_reversion: 0.05,
            drain_per_sample: 4.0,
            fill_per_sample: 60.0,
            noise_sigma: 25.0,
            pumping: false,
        }
    }
}

impl Default for SimSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimSensors {
    fn sample(&mut self) -> SensorSnapshot {
        self.temperature += self.mean_reversion * (self.temp_center - self.temperature)
            + gaussian(0.0, 0.15);
        self.humidity = (self.humidity
            + self.mean_reversion * (self.humidity_center - self.humidity)
            + gaussian(0.0, 0.8))
        .clamp(0.0, 100.0);

        let fill = if self.pumping { self.fill_per_sample } else { 0.0 };
        self.water = (self.water - self.drain_per_sample + fill).clamp(0.0, ADC_MAX);

        let water_raw = (self.water + gaussian(0.0, self.noise_sigma))
            .round()
            .clamp(0.0, ADC_MAX) as i32;

        SensorSnapshot {
            temperature_c: (self.temperature * 10.0).round() / 10.0,
            humidity_pct: (self.humidity * 10.0).round() / 10.0,
            water_raw,
        }
    }

    fn set_pumping(&mut self, on: bool) {
        self.pumping = on;
    }
}

/// Scripted readings for tests.
#[cfg(test)]
pub(crate) struct ScriptedSensors {
    pub(crate) next: SensorSnapshot,
    pub(crate) pumping: bool,
}

#[cfg(test)]
impl ScriptedSensors {
    pub(crate) fn with_water(water_raw: i32) -> Self {
        Self {
            next: SensorSnapshot {
                temperature_c: 25.0,
                humidity_pct: 60.0,
                water_raw,
            },
            pumping: false,
        }
    }
}

#[cfg(test)]
impl SensorSource for ScriptedSensors {
    fn sample(&mut self) -> SensorSnapshot {
        self.next
    }

    fn set_pumping(&mut self, on: bool) {
        self.pumping = on;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
