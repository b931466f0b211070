// Rolling history of readings with alarm sinks
use super::alarm::{AlarmEvaluator, AlarmEvent};
use super::machine::{MachineReading, RunState, Standards, CHANNELS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
pub const DEFAULT_RECENT_ALARM_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "volts")]
    pub channel_voltages: [f64; CHANNELS],
    #[serde(rename = "amps")]
    pub channel_amperages: [f64; CHANNELS],
}

impl HistoryEntry {
    pub fn from_reading(reading: &MachineReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            channel_voltages: reading.channel_voltages,
            channel_amperages: reading.channel_amperages,
        }
    }
}

/// A logged entry with the standards it was held to when it was taken.
///
/// Only running readings are logged, so a backlog entry is always judged as RUNNING.
#[derive(Debug, Clone, PartialEq)]
pub struct BacklogEntry {
    pub entry: HistoryEntry,
    pub standards: Standards,
}

/// Most recent entries of one monitored machine, newest first.
///
/// Every append is classified, and the raised alarms go to two sinks: a cumulative log
/// that only `reset` clears, and a short recent-alarm list with the same drop-oldest
/// rule as the entries. Both sinks are newest first.
#[derive(Debug, Clone)]
pub struct HistoryRingBuffer {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
    alarm_log: VecDeque<AlarmEvent>,
    recent_alarms: VecDeque<AlarmEvent>,
    recent_capacity: usize,
    evaluator: AlarmEvaluator,
}

impl HistoryRingBuffer {
    pub fn new(capacity: usize, recent_capacity: usize, evaluator: AlarmEvaluator) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
            alarm_log: VecDeque::new(),
            recent_alarms: VecDeque::with_capacity(recent_capacity + 1),
            recent_capacity,
            evaluator,
        }
    }

    /// Insert at the front, evicting the oldest entry past capacity.
    /// Returns the alarms raised by this entry.
    pub fn append(
        &mut self,
        entry: HistoryEntry,
        run_state: RunState,
        standards: Standards,
    ) -> Vec<AlarmEvent> {
        let alarms = self.evaluator.classify(&entry, run_state, standards);
        for alarm in &alarms {
            self.alarm_log.push_front(alarm.clone());
            self.push_recent(alarm.clone());
        }

        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        alarms
    }

    /// Replace the contents with a backlog given oldest to newest. Each entry is
    /// classified against its own standards.
    ///
    /// Backlog alarms only land in the recent-alarm list; the cumulative log keeps
    /// counting from the moment the view opened.
    pub fn fill(&mut self, backlog: Vec<BacklogEntry>) {
        self.reset();
        for BacklogEntry { entry, standards } in backlog {
            for alarm in self.evaluator.classify(&entry, RunState::Running, standards) {
                self.push_recent(alarm);
            }
            self.entries.push_front(entry);
        }
        self.entries.truncate(self.capacity);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.alarm_log.clear();
        self.recent_alarms.clear();
    }

    fn push_recent(&mut self, alarm: AlarmEvent) {
        self.recent_alarms.push_front(alarm);
        self.recent_alarms.truncate(self.recent_capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn alarm_log(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.alarm_log.iter()
    }

    pub fn recent_alarms(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.recent_alarms.iter()
    }

    pub fn alarm_count(&self) -> usize {
        self.alarm_log.len()
    }
}
