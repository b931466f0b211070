use crate::application::supervisor::PollTiming;
use crate::domain::alarm::{AlarmEvaluator, DEFAULT_TOLERANCE};
use crate::domain::history::{DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENT_ALARM_CAPACITY};
use crate::domain::machine::{MachineId, MachineProfile};
use crate::domain::session::SessionLimits;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub server: ServerSettings,
    pub acquisition: AcquisitionSettings,
    pub monitor: MonitorSettings,
    pub log: LogSettings,
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub listen: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSettings {
    pub polling_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub io_timeout_ms: u64,
    pub unit_id: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorSettings {
    pub refresh_interval_ms: u64,
    pub history_capacity: usize,
    pub alarm_tolerance: f64,
    pub recent_alarm_capacity: usize,
    pub backlog_rows: usize,
    pub alarm_backlog_rows: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub retention_per_machine: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MachineConfig {
    pub id: u32,
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub spec: String,
}

fn default_port() -> u16 {
    502
}

impl MachineConfig {
    pub fn profile(&self) -> MachineProfile {
        MachineProfile {
            id: MachineId(self.id),
            name: self.name.clone(),
            department: self.department.clone(),
            spec: self.spec.clone(),
        }
    }
}

impl AcquisitionSettings {
    pub fn timing(&self) -> PollTiming {
        PollTiming {
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl MonitorSettings {
    pub fn evaluator(&self) -> AlarmEvaluator {
        AlarmEvaluator::new(self.alarm_tolerance)
    }

    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            history_capacity: self.history_capacity,
            recent_alarm_capacity: self.recent_alarm_capacity,
            evaluator: self.evaluator(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.machines.is_empty(), "no machines configured");

        let mut ids = HashSet::new();
        for machine in &self.machines {
            anyhow::ensure!(ids.insert(machine.id), "duplicate machine id {}", machine.id);
        }

        anyhow::ensure!(self.acquisition.polling_interval_ms > 0, "polling_interval_ms must be positive");
        anyhow::ensure!(self.acquisition.reconnect_backoff_ms > 0, "reconnect_backoff_ms must be positive");
        anyhow::ensure!(self.acquisition.io_timeout_ms > 0, "io_timeout_ms must be positive");
        anyhow::ensure!(self.monitor.refresh_interval_ms > 0, "refresh_interval_ms must be positive");
        anyhow::ensure!(self.monitor.history_capacity > 0, "history_capacity must be positive");
        anyhow::ensure!(self.monitor.recent_alarm_capacity > 0, "recent_alarm_capacity must be positive");
        anyhow::ensure!(self.monitor.alarm_tolerance >= 0.0, "alarm_tolerance must not be negative");
        anyhow::ensure!(self.log.retention_per_machine > 0, "retention_per_machine must be positive");
        Ok(())
    }
}

fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.listen", "0.0.0.0:3000")?
        .set_default("acquisition.polling_interval_ms", 60_000)?
        .set_default("acquisition.reconnect_backoff_ms", 5_000)?
        .set_default("acquisition.io_timeout_ms", 3_000)?
        .set_default("acquisition.unit_id", 1)?
        .set_default("monitor.refresh_interval_ms", 1_000)?
        .set_default("monitor.history_capacity", DEFAULT_HISTORY_CAPACITY as u64)?
        .set_default("monitor.alarm_tolerance", DEFAULT_TOLERANCE)?
        .set_default("monitor.recent_alarm_capacity", DEFAULT_RECENT_ALARM_CAPACITY as u64)?
        .set_default("monitor.backlog_rows", 20)?
        .set_default("monitor.alarm_backlog_rows", 50)?
        .set_default("log.retention_per_machine", 10_000)?)
}

/// Defaults, then `config/monitor.*`, then `MONITOR__SECTION__KEY` variables.
pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = builder()?
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("MONITOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: MonitorConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
