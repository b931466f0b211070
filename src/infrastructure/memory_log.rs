// In-memory reading log, bounded per machine
use crate::application::reading_log::{LoggedReading, LotSummary, ReadingLog};
use crate::domain::machine::{MachineId, MachineReading};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub struct InMemoryReadingLog {
    retention: usize,
    rows: RwLock<HashMap<MachineId, VecDeque<LoggedReading>>>,
}

impl InMemoryReadingLog {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            rows: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ReadingLog for InMemoryReadingLog {
    async fn log_reading(&self, reading: &MachineReading) -> anyhow::Result<()> {
        let mut rows = self.rows.write().await;
        let machine_rows = rows.entry(reading.id()).or_default();
        machine_rows.push_back(LoggedReading::from_reading(reading));
        while machine_rows.len() > self.retention {
            machine_rows.pop_front();
        }
        Ok(())
    }

    async fn lots(&self, machine: MachineId) -> anyhow::Result<Vec<LotSummary>> {
        let rows = self.rows.read().await;
        let mut lots: Vec<LotSummary> = Vec::new();

        for row in rows.get(&machine).into_iter().flatten() {
            match lots.iter_mut().find(|l| l.lot_no == row.lot_no) {
                Some(lot) => {
                    lot.last_seen = lot.last_seen.max(row.timestamp);
                    lot.first_seen = lot.first_seen.min(row.timestamp);
                    lot.samples += 1;
                }
                None => lots.push(LotSummary {
                    lot_no: row.lot_no.clone(),
                    first_seen: row.timestamp,
                    last_seen: row.timestamp,
                    samples: 1,
                }),
            }
        }

        lots.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(lots)
    }

    async fn readings_for_lot(&self, machine: MachineId, lot: &str) -> anyhow::Result<Vec<LoggedReading>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&machine)
            .into_iter()
            .flatten()
            .filter(|row| row.lot_no == lot)
            .cloned()
            .collect())
    }

    async fn recent(&self, machine: MachineId, count: usize) -> anyhow::Result<Vec<LoggedReading>> {
        let rows = self.rows.read().await;
        let Some(machine_rows) = rows.get(&machine) else {
            return Ok(Vec::new());
        };

        let skip = machine_rows.len().saturating_sub(count);
        Ok(machine_rows.iter().skip(skip).cloned().collect())
    }
}
