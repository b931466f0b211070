// Shared store of the latest reading per machine
use crate::application::error::MonitorError;
use crate::domain::machine::{MachineId, MachineProfile, MachineReading, RunState};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Latest reading of every configured machine.
///
/// Entries are created once at startup and never removed. Each entry has a single
/// writer, the [`StoreWriter`] claimed by that machine's supervisor. A write swaps in
/// a whole new `Arc<MachineReading>`, so readers see either the old record or the new
/// one.
pub struct TelemetryStore {
    order: Vec<MachineId>,
    readings: RwLock<HashMap<MachineId, Arc<MachineReading>>>,
    claimed: Mutex<HashSet<MachineId>>,
}

impl TelemetryStore {
    pub fn new(profiles: impl IntoIterator<Item = MachineProfile>) -> Arc<Self> {
        let now = Utc::now();
        let mut order = Vec::new();
        let mut readings = HashMap::new();
        for profile in profiles {
            order.push(profile.id);
            readings.insert(profile.id, Arc::new(MachineReading::connecting(profile, now)));
        }

        Arc::new(Self {
            order,
            readings: RwLock::new(readings),
            claimed: Mutex::new(HashSet::new()),
        })
    }

    pub fn get(&self, id: MachineId) -> Result<Arc<MachineReading>, MonitorError> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(MonitorError::NotFound(id))
    }

    /// Snapshots in configured machine order.
    pub fn list(&self) -> Vec<Arc<MachineReading>> {
        let readings = self.readings.read().unwrap_or_else(PoisonError::into_inner);
        self.order
            .iter()
            .filter_map(|id| readings.get(id).cloned())
            .collect()
    }

    /// Hand out the only writer for `id`.
    pub fn claim_writer(self: &Arc<Self>, id: MachineId) -> Result<StoreWriter, MonitorError> {
        if !self.order.contains(&id) {
            return Err(MonitorError::NotFound(id));
        }
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(id) {
            return Err(MonitorError::WriterClaimed(id));
        }
        Ok(StoreWriter {
            id,
            store: Arc::clone(self),
        })
    }

    fn set(&self, id: MachineId, reading: MachineReading) -> Result<(), MonitorError> {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        match readings.get_mut(&id) {
            Some(slot) => {
                *slot = Arc::new(reading);
                Ok(())
            }
            None => Err(MonitorError::NotFound(id)),
        }
    }

    fn update(&self, id: MachineId, f: impl FnOnce(&MachineReading) -> MachineReading) {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = readings.get_mut(&id) {
            *slot = Arc::new(f(slot));
        }
    }
}

/// Write access to one machine's entry.
pub struct StoreWriter {
    id: MachineId,
    store: Arc<TelemetryStore>,
}

impl StoreWriter {
    /// Replace the whole reading.
    pub fn publish(&self, reading: MachineReading) {
        // the entry exists for every id a writer can be claimed for
        if let Err(e) = self.store.set(self.id, reading) {
            tracing::error!("Dropping reading: {}", e);
        }
    }

    /// Flag the machine as stopped, keeping the last known values and `lastUpdate`.
    pub fn mark_stopped(&self) {
        self.store.update(self.id, |current| {
            current.with_run_state(RunState::Stopped)
        });
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        self.store
            .claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
