// Monitoring session for one machine: history, chart and lot tracking
use super::alarm::{AlarmEvaluator, AlarmEvent};
use super::chart::{ChartError, ChartSeriesBuffer, ChartSnapshot};
use super::history::{BacklogEntry, HistoryEntry, HistoryRingBuffer};
use super::machine::{channel_average, MachineId, MachineReading, CHANNELS, LOT_ENDED};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    pub history_capacity: usize,
    pub recent_alarm_capacity: usize,
    pub evaluator: AlarmEvaluator,
}

/// What a renderer needs to react to after a tick.
///
/// `Opened` carries the cumulative alarm log; later `Sample`s carry only the alarms
/// they raised, and `LotStarted` empties the log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    #[serde(rename_all = "camelCase")]
    Opened {
        machine: MachineReading,
        history: Vec<HistoryEntry>,
        recent_alarms: Vec<AlarmEvent>,
        alarm_log: Vec<AlarmEvent>,
        chart: ChartSnapshot,
    },
    LotChanged { lot: String },
    /// The buffers were reset because a new lot started.
    LotStarted { lot: String },
    #[serde(rename_all = "camelCase")]
    Sample {
        entry: HistoryEntry,
        alarms: Vec<AlarmEvent>,
        average_voltage: f64,
        average_amperage: f64,
        alarm_count: usize,
    },
    Chart(ChartSnapshot),
}

pub struct MonitorSession {
    machine_id: MachineId,
    displayed_lot: String,
    history: HistoryRingBuffer,
    chart: ChartSeriesBuffer,
}

impl MonitorSession {
    /// Start a view on `reading`'s machine, seeding both buffers from a backlog of the
    /// displayed lot given oldest to newest.
    pub fn open(reading: &MachineReading, backlog: Vec<BacklogEntry>, limits: SessionLimits) -> Self {
        let mut session = Self {
            machine_id: reading.id(),
            displayed_lot: reading.lot_identifier.clone(),
            history: HistoryRingBuffer::new(
                limits.history_capacity,
                limits.recent_alarm_capacity,
                limits.evaluator,
            ),
            chart: ChartSeriesBuffer::new(limits.history_capacity),
        };

        let volts: Vec<f64> = backlog.iter().map(|b| channel_average(&b.entry.channel_voltages)).collect();
        let amps: Vec<f64> = backlog.iter().map(|b| channel_average(&b.entry.channel_amperages)).collect();
        let labels: Vec<String> = backlog.iter().map(|b| chart_label(b.entry.timestamp)).collect();

        session.history.fill(backlog);
        if let Err(e) = session.seed_chart(&volts, &amps, &labels) {
            tracing::warn!("Chart backlog for machine {} rejected: {}", session.machine_id, e);
        }
        session
    }

    /// A short backlog still seeds the chart one point at a time.
    fn seed_chart(&mut self, volts: &[f64], amps: &[f64], labels: &[String]) -> Result<(), ChartError> {
        if volts.len() > CHANNELS {
            return self.chart.ingest(volts, amps, labels);
        }
        for ((v, a), label) in volts.iter().zip(amps).zip(labels) {
            self.chart.ingest(&[*v], &[*a], std::slice::from_ref(label))?;
        }
        Ok(())
    }

    pub fn opened_event(&self, reading: &MachineReading) -> MonitorEvent {
        let mut machine = reading.clone();
        machine.lot_identifier = self.displayed_lot.clone();
        MonitorEvent::Opened {
            machine,
            history: self.history.entries().cloned().collect(),
            recent_alarms: self.history.recent_alarms().cloned().collect(),
            alarm_log: self.history.alarm_log().cloned().collect(),
            chart: self.chart.snapshot(),
        }
    }

    /// Feed one store snapshot taken at `at`.
    pub fn tick(&mut self, reading: &MachineReading, at: DateTime<Utc>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();

        if reading.lot_identifier != self.displayed_lot {
            self.displayed_lot = reading.lot_identifier.clone();
            events.push(MonitorEvent::LotChanged {
                lot: self.displayed_lot.clone(),
            });

            if self.displayed_lot != LOT_ENDED && reading.run_state.is_running() {
                tracing::info!(
                    "New lot {} on machine {}, resetting history",
                    self.displayed_lot,
                    self.machine_id
                );
                self.history.reset();
                self.chart.reset();
                events.push(MonitorEvent::LotStarted {
                    lot: self.displayed_lot.clone(),
                });
            }
        }

        let entry = HistoryEntry::from_reading(reading, at);
        let alarms = self
            .history
            .append(entry.clone(), reading.run_state, reading.standards());

        let label = chart_label(at);
        match self.chart.ingest(
            &reading.channel_voltages,
            &reading.channel_amperages,
            std::slice::from_ref(&label),
        ) {
            Ok(()) => {}
            Err(e) => tracing::warn!("Chart sample for machine {} rejected: {}", self.machine_id, e),
        }

        events.push(MonitorEvent::Sample {
            entry,
            alarms,
            average_voltage: reading.average_voltage(),
            average_amperage: reading.average_amperage(),
            alarm_count: self.history.alarm_count(),
        });
        events.push(MonitorEvent::Chart(self.chart.snapshot()));
        events
    }

    pub fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    #[cfg(test)]
    pub fn displayed_lot(&self) -> &str {
        &self.displayed_lot
    }

    #[cfg(test)]
    pub fn history(&self) -> &HistoryRingBuffer {
        &self.history
    }

    #[cfg(test)]
    pub fn chart(&self) -> &ChartSeriesBuffer {
        &self.chart
    }
}

fn chart_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d/%m/%y %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::{test_profile, RunState, Standards};
    use chrono::Duration;

    fn limits() -> SessionLimits {
        SessionLimits {
            history_capacity: 20,
            recent_alarm_capacity: 5,
            evaluator: AlarmEvaluator::default(),
        }
    }

    fn reading(lot: &str, run_state: RunState, volt: f64) -> MachineReading {
        MachineReading::new(
            test_profile(1),
            run_state,
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

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(seconds)
    }

    fn backlog(n: i64) -> Vec<BacklogEntry> {
        (0..n)
            .map(|s| BacklogEntry {
                entry: HistoryEntry {
                    timestamp: at(s),
                    channel_voltages: [12.0; CHANNELS],
                    channel_amperages: [5.0; CHANNELS],
                },
                standards: Standards {
                    voltage: 12.0,
                    amperage: 5.0,
                },
            })
            .collect()
    }

    fn resets(events: &[MonitorEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::LotStarted { .. }))
            .count()
    }

    #[test]
    fn test_open_seeds_history_and_chart() {
        let session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(25), limits());

        assert_eq!(session.history().len(), 20);
        assert_eq!(session.chart().len(), 20);
        assert_eq!(session.displayed_lot(), "A");
    }

    #[test]
    fn test_open_with_short_backlog() {
        let session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(3), limits());

        assert_eq!(session.history().len(), 3);
        assert_eq!(session.chart().len(), 3);
    }

    #[test]
    fn test_same_lot_appends_without_reset() {
        let mut session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(5), limits());
        let events = session.tick(&reading("A", RunState::Running, 12.0), at(100));

        assert_eq!(resets(&events), 0);
        assert_eq!(session.history().len(), 6);
        assert_eq!(session.chart().len(), 6);
    }

    #[test]
    fn test_new_running_lot_resets_once_before_append() {
        let mut session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(5), limits());
        let events = session.tick(&reading("B", RunState::Running, 13.0), at(100));

        assert_eq!(resets(&events), 1);
        assert_eq!(session.displayed_lot(), "B");
        // only the triggering entry survives the reset
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().entries().next().unwrap().timestamp, at(100));
        assert_eq!(session.history().alarm_count(), CHANNELS);
        assert_eq!(session.chart().len(), 1);

        let events = session.tick(&reading("B", RunState::Running, 12.0), at(101));
        assert_eq!(resets(&events), 0);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_lot_ended_updates_display_without_reset() {
        let mut session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(5), limits());
        let events = session.tick(&reading(LOT_ENDED, RunState::Stopped, 12.0), at(100));

        assert_eq!(resets(&events), 0);
        assert!(matches!(&events[0], MonitorEvent::LotChanged { lot } if lot == LOT_ENDED));
        assert_eq!(session.displayed_lot(), LOT_ENDED);
        assert_eq!(session.history().len(), 6);
    }

    #[test]
    fn test_change_while_stopped_never_resets() {
        let mut session = MonitorSession::open(&reading("A", RunState::Running, 12.0), backlog(5), limits());
        let events = session.tick(&reading("B", RunState::Stopped, 12.0), at(100));

        assert_eq!(resets(&events), 0);
        assert_eq!(session.displayed_lot(), "B");
        assert_eq!(session.history().len(), 6);

        // the lot is already displayed, so starting to run does not reset either
        let events = session.tick(&reading("B", RunState::Running, 12.0), at(101));
        assert_eq!(resets(&events), 0);
    }

    #[test]
    fn test_sample_event_carries_alarms() {
        let mut session = MonitorSession::open(&reading("A", RunState::Running, 12.0), Vec::new(), limits());
        let events = session.tick(&reading("A", RunState::Running, 12.9), at(1));

        let sample = events
            .iter()
            .find_map(|e| match e {
                MonitorEvent::Sample { alarms, alarm_count, .. } => Some((alarms.len(), *alarm_count)),
                _ => None,
            })
            .unwrap();
        assert_eq!(sample, (CHANNELS, CHANNELS));
        assert!(matches!(events.last(), Some(MonitorEvent::Chart(_))));
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = MonitorEvent::LotStarted { lot: "B".to_string() };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "lotStarted");
        assert_eq!(json["lot"], "B");
    }

    fn alarm_log_of(event: &MonitorEvent) -> Vec<AlarmEvent> {
        match event {
            MonitorEvent::Opened { alarm_log, .. } => alarm_log.clone(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_alarm_log_survives_ticks_until_new_lot() {
        let current = reading("A", RunState::Running, 12.0);
        let mut session = MonitorSession::open(&current, backlog(3), limits());
        assert!(alarm_log_of(&session.opened_event(&current)).is_empty());

        session.tick(&reading("A", RunState::Running, 13.0), at(100));
        session.tick(&reading("A", RunState::Running, 12.0), at(101));
        session.tick(&reading("A", RunState::Running, 13.0), at(102));

        let log = alarm_log_of(&session.opened_event(&current));
        assert_eq!(log.len(), 2 * CHANNELS);
        // newest first
        assert_eq!(log[0].timestamp, at(102));
        assert_eq!(log.last().unwrap().timestamp, at(100));

        session.tick(&reading("B", RunState::Running, 12.0), at(103));
        assert!(alarm_log_of(&session.opened_event(&current)).is_empty());
    }

    #[test]
    fn test_opened_event_serializes_alarm_log() {
        let current = reading("A", RunState::Running, 12.0);
        let mut session = MonitorSession::open(&current, Vec::new(), limits());
        session.tick(&reading("A", RunState::Running, 13.0), at(1));

        let json = serde_json::to_value(session.opened_event(&current)).unwrap();
        assert_eq!(json["type"], "opened");
        assert_eq!(json["alarmLog"].as_array().unwrap().len(), CHANNELS);
        assert_eq!(json["alarmLog"][0]["channelKind"], "Volt");
    }
}
