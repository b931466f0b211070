// Port to the persistence collaborator for logged readings
use crate::domain::history::{BacklogEntry, HistoryEntry};
use crate::domain::machine::{MachineId, MachineReading, Standards, CHANNELS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A lot seen in the log for one machine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSummary {
    pub lot_no: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub samples: usize,
}

/// One exported row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedReading {
    pub timestamp: DateTime<Utc>,
    pub lot_no: String,
    pub std_volt: f64,
    pub std_amp: f64,
    pub volts: [f64; CHANNELS],
    pub amps: [f64; CHANNELS],
    pub avg_volt: f64,
    pub avg_amp: f64,
}

impl LoggedReading {
    pub fn from_reading(reading: &MachineReading) -> Self {
        Self {
            timestamp: reading.last_update,
            lot_no: reading.lot_identifier.clone(),
            std_volt: reading.standard_voltage,
            std_amp: reading.standard_amperage,
            volts: reading.channel_voltages,
            amps: reading.channel_amperages,
            avg_volt: reading.average_voltage(),
            avg_amp: reading.average_amperage(),
        }
    }

    /// The row as a history entry together with the standards it was logged under.
    pub fn backlog_entry(&self) -> BacklogEntry {
        BacklogEntry {
            entry: HistoryEntry {
                timestamp: self.timestamp,
                channel_voltages: self.volts,
                channel_amperages: self.amps,
            },
            standards: Standards {
                voltage: self.std_volt,
                amperage: self.std_amp,
            },
        }
    }
}

#[async_trait]
pub trait ReadingLog: Send + Sync {
    /// Record a reading taken while the machine was running
    async fn log_reading(&self, reading: &MachineReading) -> anyhow::Result<()>;

    /// Lots seen for a machine, most recent first
    async fn lots(&self, machine: MachineId) -> anyhow::Result<Vec<LotSummary>>;

    /// Rows of one lot, oldest first
    async fn readings_for_lot(&self, machine: MachineId, lot: &str) -> anyhow::Result<Vec<LoggedReading>>;

    /// Last `count` rows across all lots, oldest first
    async fn recent(&self, machine: MachineId, count: usize) -> anyhow::Result<Vec<LoggedReading>>;
}
