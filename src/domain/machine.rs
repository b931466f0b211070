// Machine domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of measurement channels per quantity.
pub const CHANNELS: usize = 6;

/// Lot label shown when the device reports no active lot.
pub const LOT_ENDED: &str = "LOT ENDED";

/// Lot label shown until the first successful read.
pub const LOT_CONNECTING: &str = "CONNECTING...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub u32);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[serde(rename = "run")]
    Running,
    #[serde(rename = "stop")]
    Stopped,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == RunState::Running
    }
}

/// Static description of a machine, taken from configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineProfile {
    pub id: MachineId,
    pub name: String,
    pub department: String,
    pub spec: String,
}

/// Per-lot reference values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standards {
    pub voltage: f64,
    pub amperage: f64,
}

/// One decoded sample for one machine, as published in the telemetry store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineReading {
    #[serde(flatten)]
    pub profile: MachineProfile,
    #[serde(rename = "mode")]
    pub run_state: RunState,
    #[serde(rename = "lot")]
    pub lot_identifier: String,
    #[serde(rename = "stdV")]
    pub standard_voltage: f64,
    #[serde(rename = "stdA")]
    pub standard_amperage: f64,
    #[serde(rename = "volts")]
    pub channel_voltages: [f64; CHANNELS],
    #[serde(rename = "amps")]
    pub channel_amperages: [f64; CHANNELS],
    #[serde(rename = "currentV")]
    average_voltage: f64,
    #[serde(rename = "currentA")]
    average_amperage: f64,
    pub last_update: DateTime<Utc>,
}

impl MachineReading {
    /// Placeholder published before a device has ever answered.
    pub fn connecting(profile: MachineProfile, at: DateTime<Utc>) -> Self {
        Self {
            profile,
            run_state: RunState::Stopped,
            lot_identifier: LOT_CONNECTING.to_string(),
            standard_voltage: 0.0,
            standard_amperage: 0.0,
            channel_voltages: [0.0; CHANNELS],
            channel_amperages: [0.0; CHANNELS],
            average_voltage: 0.0,
            average_amperage: 0.0,
            last_update: at,
        }
    }

    pub fn new(
        profile: MachineProfile,
        run_state: RunState,
        lot_identifier: String,
        standards: Standards,
        channel_voltages: [f64; CHANNELS],
        channel_amperages: [f64; CHANNELS],
        last_update: DateTime<Utc>,
    ) -> Self {
        Self {
            profile,
            run_state,
            lot_identifier,
            standard_voltage: standards.voltage,
            standard_amperage: standards.amperage,
            average_voltage: channel_average(&channel_voltages),
            average_amperage: channel_average(&channel_amperages),
            channel_voltages,
            channel_amperages,
            last_update,
        }
    }

    pub fn id(&self) -> MachineId {
        self.profile.id
    }

    pub fn standards(&self) -> Standards {
        Standards {
            voltage: self.standard_voltage,
            amperage: self.standard_amperage,
        }
    }

    pub fn average_voltage(&self) -> f64 {
        self.average_voltage
    }

    pub fn average_amperage(&self) -> f64 {
        self.average_amperage
    }

    /// Copy of this reading with only the run state changed.
    pub fn with_run_state(&self, run_state: RunState) -> Self {
        Self {
            run_state,
            ..self.clone()
        }
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean rounded to two decimals; 0 for an empty slice.
pub fn channel_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
pub(crate) fn test_profile(id: u32) -> MachineProfile {
    MachineProfile {
        id: MachineId(id),
        name: format!("MC-{:02}", id),
        department: "forming".to_string(),
        spec: "STD-X".to_string(),
    }
}
