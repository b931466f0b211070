// Alarm classification
use super::history::HistoryEntry;
use super::machine::{MachineReading, RunState, Standards};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelKind {
    Volt,
    Amp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub timestamp: DateTime<Utc>,
    pub channel_kind: ChannelKind,
    /// 1-based channel number.
    pub channel_index: usize,
    pub observed_value: f64,
    pub reference_value: f64,
}

/// Alarm flags for a dashboard card, evaluated on channel averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAlarm {
    pub voltage_alarm: bool,
    pub amperage_alarm: bool,
}

/// Voltage is held to a symmetric band around the standard.
pub fn voltage_out_of_band(value: f64, standard: f64, tolerance: f64) -> bool {
    (value - standard).abs() > tolerance
}

/// Amperage only alarms on overload; under-current is never reported.
pub fn amperage_overload(value: f64, standard: f64, tolerance: f64) -> bool {
    value > standard + tolerance
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmEvaluator {
    tolerance: f64,
}

impl Default for AlarmEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl AlarmEvaluator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    #[cfg(test)]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn classify(
        &self,
        entry: &HistoryEntry,
        run_state: RunState,
        standards: Standards,
    ) -> Vec<AlarmEvent> {
        if !run_state.is_running() {
            return Vec::new();
        }

        let volts = entry
            .channel_voltages
            .iter()
            .enumerate()
            .filter(|&(_, &v)| voltage_out_of_band(v, standards.voltage, self.tolerance))
            .map(|(i, &v)| AlarmEvent {
                timestamp: entry.timestamp,
                channel_kind: ChannelKind::Volt,
                channel_index: i + 1,
                observed_value: v,
                reference_value: standards.voltage,
            });

        let amps = entry
            .channel_amperages
            .iter()
            .enumerate()
            .filter(|&(_, &a)| amperage_overload(a, standards.amperage, self.tolerance))
            .map(|(i, &a)| AlarmEvent {
                timestamp: entry.timestamp,
                channel_kind: ChannelKind::Amp,
                channel_index: i + 1,
                observed_value: a,
                reference_value: standards.amperage,
            });

        volts.chain(amps).collect()
    }

    #[cfg(test)]
    pub fn classify_reading(&self, reading: &MachineReading) -> Vec<AlarmEvent> {
        self.classify(
            &HistoryEntry::from_reading(reading, reading.last_update),
            reading.run_state,
            reading.standards(),
        )
    }

    pub fn dashboard(&self, reading: &MachineReading) -> DashboardAlarm {
        if !reading.run_state.is_running() {
            return DashboardAlarm::default();
        }
        DashboardAlarm {
            voltage_alarm: voltage_out_of_band(
                reading.average_voltage(),
                reading.standard_voltage,
                self.tolerance,
            ),
            amperage_alarm: amperage_overload(
                reading.average_amperage(),
                reading.standard_amperage,
                self.tolerance,
            ),
        }
    }
}
