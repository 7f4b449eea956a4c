//! Actuator outputs (pump, light, valve). The `gpio` feature gates the real
//! rppal driver; without it, a mock board keeps levels in memory and logs
//! every change.

use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

use crate::command::{CommandKind, OnOff};

/// Write/read access to the actuators. `get` returns the last written level
/// and never touches the hardware state.
pub trait DeviceOutput {
    fn set(&mut self, kind: CommandKind, value: OnOff);
    fn get(&self, kind: CommandKind) -> OnOff;
}

/// Pin assignment for each actuator (BCM numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub pump: u8,
    pub light: u8,
    pub valve: u8,
}

impl PinMap {
    pub fn pin(&self, kind: CommandKind) -> u8 {
        match kind {
            CommandKind::Pump => self.pump,
            CommandKind::Light => self.light,
            CommandKind::Valve => self.valve,
        }
    }
}

// ---------------------------------------------------------------------------
// Real GPIO board (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct OutputBoard {
    pins: HashMap<CommandKind, OutputPin>,
    levels: HashMap<CommandKind, OnOff>,
    active_low: bool, // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl OutputBoard {
    pub fn new(pin_map: PinMap, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut pins = HashMap::new();
        let mut levels = HashMap::new();

        for kind in CommandKind::ALL {
            let pin_num = pin_map.pin(kind);
            let mut pin = gpio.get(pin_num)?.into_output();
            // Everything starts OFF.
            if active_low {
                pin.set_high();
            } else {
                pin.set_low();
            }
            info!(output = %kind, gpio = pin_num, active_low, "output registered");
            pins.insert(kind, pin);
            levels.insert(kind, OnOff::Off);
        }

        Ok(Self {
            pins,
            levels,
            active_low,
        })
    }
}

#[cfg(feature = "gpio")]
impl DeviceOutput for OutputBoard {
    fn set(&mut self, kind: CommandKind, value: OnOff) {
        if let Some(pin) = self.pins.get_mut(&kind) {
            // active-low: LOW = ON, HIGH = OFF
            if value.is_on() != self.active_low {
                pin.set_high();
            } else {
                pin.set_low();
            }
            self.levels.insert(kind, value);
            info!(output = %kind, %value, "output set");
        }
    }

    fn get(&self, kind: CommandKind) -> OnOff {
        self.levels.get(&kind).copied().unwrap_or(OnOff::Off)
    }
}

// ---------------------------------------------------------------------------
// Mock board (development, no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct OutputBoard {
    pub(crate) levels: HashMap<CommandKind, OnOff>,
}

#[cfg(not(feature = "gpio"))]
impl OutputBoard {
    pub fn new(pin_map: PinMap, _active_low: bool) -> Result<Self> {
        let mut levels = HashMap::new();
        for kind in CommandKind::ALL {
            info!(output = %kind, gpio = pin_map.pin(kind), "[mock-gpio] output registered (not wired)");
            levels.insert(kind, OnOff::Off);
        }
        Ok(Self { levels })
    }
}

#[cfg(not(feature = "gpio"))]
impl DeviceOutput for OutputBoard {
    fn set(&mut self, kind: CommandKind, value: OnOff) {
        self.levels.insert(kind, value);
        info!(output = %kind, %value, "[mock-gpio] output set");
    }

    fn get(&self, kind: CommandKind) -> OnOff {
        self.levels.get(&kind).copied().unwrap_or(OnOff::Off)
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Records every write so tests can assert on exact actuation counts.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingOutput {
    pub(crate) writes: Vec<(CommandKind, OnOff)>,
    levels: HashMap<CommandKind, OnOff>,
}

#[cfg(test)]
impl DeviceOutput for RecordingOutput {
    fn set(&mut self, kind: CommandKind, value: OnOff) {
        self.writes.push((kind, value));
        self.levels.insert(kind, value);
    }

    fn get(&self, kind: CommandKind) -> OnOff {
        self.levels.get(&kind).copied().unwrap_or(OnOff::Off)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
