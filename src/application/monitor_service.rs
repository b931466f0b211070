// Monitor service - Live monitoring sessions pushed over a channel
use crate::application::error::MonitorError;
use crate::application::reading_log::{LoggedReading, ReadingLog};
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::machine::MachineId;
use crate::domain::session::{MonitorEvent, MonitorSession, SessionLimits};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

const EVENT_BUFFER: usize = 32;

#[derive(Clone)]
pub struct MonitorService {
    store: Arc<TelemetryStore>,
    log: Arc<dyn ReadingLog>,
    limits: SessionLimits,
    refresh_interval: Duration,
    backlog_rows: usize,
    shutdown: watch::Receiver<bool>,
}

impl MonitorService {
    pub fn new(
        store: Arc<TelemetryStore>,
        log: Arc<dyn ReadingLog>,
        limits: SessionLimits,
        refresh_interval: Duration,
        backlog_rows: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            log,
            limits,
            refresh_interval,
            backlog_rows,
            shutdown,
        }
    }

    /// Open a view on one machine. The first event is always `Opened`; afterwards the
    /// store is sampled every refresh interval. Dropping the receiver leaves the view
    /// and discards the session's buffers; so does process shutdown.
    pub async fn open_session(&self, id: MachineId) -> Result<mpsc::Receiver<MonitorEvent>, MonitorError> {
        let reading = self.store.get(id)?;

        let backlog = match self.log.readings_for_lot(id, &reading.lot_identifier).await {
            Ok(rows) => {
                let skip = rows.len().saturating_sub(self.backlog_rows);
                rows[skip..].iter().map(LoggedReading::backlog_entry).collect()
            }
            Err(e) => {
                tracing::warn!("No backlog for machine {}: {}", id, e);
                Vec::new()
            }
        };

        let session = MonitorSession::open(&reading, backlog, self.limits);
        let opened = session.opened_event(&reading);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tracing::debug!("Opened monitor session for machine {}", id);
        tokio::spawn(run_session(
            session,
            opened,
            Arc::clone(&self.store),
            self.refresh_interval,
            tx,
            self.shutdown.clone(),
        ));
        Ok(rx)
    }
}

async fn run_session(
    mut session: MonitorSession,
    opened: MonitorEvent,
    store: Arc<TelemetryStore>,
    refresh_interval: Duration,
    tx: mpsc::Sender<MonitorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = session.machine_id();
    if tx.send(opened).await.is_err() {
        return;
    }

    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tx.closed() => break,
            _ = shutdown.changed() => break,
        }

        let reading = match store.get(id) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!("Monitor session ended: {}", e);
                return;
            }
        };

        for event in session.tick(&reading, Utc::now()) {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("Monitor session for machine {} closed", id);
}
