// Machine service - Snapshot reads of the store and log queries
use crate::application::error::MonitorError;
use crate::application::reading_log::{LoggedReading, LotSummary, ReadingLog};
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::alarm::{AlarmEvaluator, AlarmEvent, DashboardAlarm};
use crate::domain::machine::{MachineId, MachineReading, RunState};
use serde::Serialize;
use std::sync::Arc;

/// A dashboard card: the latest reading plus its alarm flags.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSummary {
    #[serde(flatten)]
    pub reading: MachineReading,
    #[serde(flatten)]
    pub alarm: DashboardAlarm,
}

#[derive(Clone)]
pub struct MachineService {
    store: Arc<TelemetryStore>,
    log: Arc<dyn ReadingLog>,
    evaluator: AlarmEvaluator,
    alarm_backlog_rows: usize,
}

impl MachineService {
    pub fn new(
        store: Arc<TelemetryStore>,
        log: Arc<dyn ReadingLog>,
        evaluator: AlarmEvaluator,
        alarm_backlog_rows: usize,
    ) -> Self {
        Self {
            store,
            log,
            evaluator,
            alarm_backlog_rows,
        }
    }

    pub fn list_machines(&self) -> Vec<MachineReading> {
        self.store.list().iter().map(|r| MachineReading::clone(r)).collect()
    }

    pub fn get_machine(&self, id: MachineId) -> Result<MachineReading, MonitorError> {
        self.store.get(id).map(|r| MachineReading::clone(&r))
    }

    pub fn dashboard(&self) -> Vec<MachineSummary> {
        self.store
            .list()
            .iter()
            .map(|r| MachineSummary {
                alarm: self.evaluator.dashboard(r),
                reading: MachineReading::clone(r),
            })
            .collect()
    }

    /// Alarms found in the logged backlog, newest first. Every row was logged while
    /// running and is held to the standards it was logged with.
    pub async fn alarm_backlog(&self, id: MachineId) -> anyhow::Result<Vec<AlarmEvent>> {
        self.store.get(id)?;
        let rows = self.log.recent(id, self.alarm_backlog_rows).await?;

        let mut alarms: Vec<AlarmEvent> = rows
            .iter()
            .map(LoggedReading::backlog_entry)
            .flat_map(|b| self.evaluator.classify(&b.entry, RunState::Running, b.standards))
            .collect();
        alarms.reverse();
        Ok(alarms)
    }

    pub async fn lots(&self, id: MachineId) -> anyhow::Result<Vec<LotSummary>> {
        self.store.get(id)?;
        self.log.lots(id).await
    }

    pub async fn export(&self, id: MachineId, lot: &str) -> anyhow::Result<Vec<LoggedReading>> {
        self.store.get(id)?;
        self.log.readings_for_lot(id, lot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::{test_profile, RunState, Standards, CHANNELS};
    use crate::infrastructure::memory_log::InMemoryReadingLog;
    use chrono::Utc;

    fn reading(id: u32, lot: &str, volt: f64) -> MachineReading {
        MachineReading::new(
            test_profile(id),
            RunState::Running,
            lot.to_string(),
            Standards {
                voltage: 12.0,
                amperage: 5.0,
            },
            [volt; CHANNELS],
            [5.0; CHANNELS],
            Utc::now(),
        )
    }

    fn reading_with_standard(lot: &str, standard: f64, volt: f64) -> MachineReading {
        MachineReading::new(
            test_profile(1),
            RunState::Running,
            lot.to_string(),
            Standards {
                voltage: standard,
                amperage: 5.0,
            },
            [volt; CHANNELS],
            [5.0; CHANNELS],
            Utc::now(),
        )
    }

    fn service() -> (MachineService, Arc<TelemetryStore>, Arc<InMemoryReadingLog>) {
        let store = TelemetryStore::new([test_profile(2), test_profile(1)]);
        let log = Arc::new(InMemoryReadingLog::new(100));
        let service = MachineService::new(store.clone(), log.clone(), AlarmEvaluator::default(), 50);
        (service, store, log)
    }

    #[test]
    fn test_list_and_get() {
        let (service, _, _) = service();

        let ids: Vec<u32> = service.list_machines().iter().map(|r| r.id().0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(service.get_machine(MachineId(1)).is_ok());
        assert_eq!(
            service.get_machine(MachineId(7)).unwrap_err(),
            MonitorError::NotFound(MachineId(7))
        );
    }

    #[test]
    fn test_dashboard_flags() {
        let (service, store, _) = service();
        store.claim_writer(MachineId(1)).unwrap().publish(reading(1, "A", 13.0));

        let cards = service.dashboard();
        let card = cards.iter().find(|c| c.reading.id() == MachineId(1)).unwrap();
        assert!(card.alarm.voltage_alarm);

        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json["voltageAlarm"], true);
        assert_eq!(json["lot"], "A");
    }

    #[tokio::test]
    async fn test_alarm_backlog_newest_first() {
        let (service, store, log) = service();
        log.log_reading(&reading(1, "A", 13.0)).await.unwrap();
        log.log_reading(&reading(1, "A", 12.0)).await.unwrap();
        log.log_reading(&reading(1, "A", 11.0)).await.unwrap();
        store.claim_writer(MachineId(1)).unwrap().publish(reading(1, "A", 12.0));

        let alarms = service.alarm_backlog(MachineId(1)).await.unwrap();
        assert_eq!(alarms.len(), 2 * CHANNELS);
        assert_eq!(alarms[0].observed_value, 11.0);
        assert_eq!(alarms[0].channel_index, CHANNELS);
        assert_eq!(alarms.last().unwrap().observed_value, 13.0);
    }

    #[tokio::test]
    async fn test_log_queries_require_known_machine() {
        let (service, _, log) = service();
        log.log_reading(&reading(1, "A", 12.0)).await.unwrap();

        assert_eq!(service.lots(MachineId(1)).await.unwrap().len(), 1);
        assert_eq!(service.export(MachineId(1), "A").await.unwrap().len(), 1);

        let err = service.lots(MachineId(9)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<MonitorError>(),
            Some(&MonitorError::NotFound(MachineId(9)))
        );
    }

    #[tokio::test]
    async fn test_alarm_backlog_keeps_logged_standards() {
        let (service, store, log) = service();
        for _ in 0..3 {
            log.log_reading(&reading_with_standard("A", 12.0, 12.0)).await.unwrap();
        }
        let writer = store.claim_writer(MachineId(1)).unwrap();
        writer.publish(reading_with_standard("B", 20.0, 20.0));

        // lot A rows were in band for their own standard
        assert!(service.alarm_backlog(MachineId(1)).await.unwrap().is_empty());

        log.log_reading(&reading_with_standard("B", 20.0, 25.0)).await.unwrap();
        writer.mark_stopped();

        // a stopped machine still reports what it raised while running
        let alarms = service.alarm_backlog(MachineId(1)).await.unwrap();
        assert_eq!(alarms.len(), CHANNELS);
        assert!(alarms.iter().all(|a| a.reference_value == 20.0 && a.observed_value == 25.0));
    }
}
