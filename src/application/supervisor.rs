// Per-machine connection supervisor: connect, poll, decode, publish
use crate::application::reading_log::ReadingLog;
use crate::application::register_source::RegisterSource;
use crate::application::telemetry_store::StoreWriter;
use crate::domain::machine::{MachineProfile, MachineReading};
use crate::domain::register_map::decode;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub polling_interval: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(60),
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
    Reading,
}

/// Keeps one device session alive and republishes every decoded block.
///
/// Reads are strictly sequential: the next one is scheduled only after the previous
/// one finished. Failures never leave this type; they only flip the machine to
/// stopped in the store.
pub struct ConnectionSupervisor<S> {
    profile: MachineProfile,
    source: S,
    writer: StoreWriter,
    log: Arc<dyn ReadingLog>,
    timing: PollTiming,
    state: SupervisorState,
}

impl<S: RegisterSource> ConnectionSupervisor<S> {
    pub fn new(
        profile: MachineProfile,
        source: S,
        writer: StoreWriter,
        log: Arc<dyn ReadingLog>,
        timing: PollTiming,
    ) -> Self {
        Self {
            profile,
            source,
            writer,
            log,
            timing,
            state: SupervisorState::Disconnected,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Loop until `shutdown` flips to true or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "[{}] Supervising {} (poll {:?}, backoff {:?})",
            self.profile.name,
            self.source.endpoint(),
            self.timing.polling_interval,
            self.timing.reconnect_backoff
        );

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            let delay = self.step().await;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.source.disconnect().await;
        tracing::info!("[{}] Supervisor stopped", self.profile.name);
    }

    /// Advance the state machine by one action and return the delay before the next.
    pub async fn step(&mut self) -> Duration {
        match self.state {
            SupervisorState::Disconnected | SupervisorState::Connecting => self.connect().await,
            SupervisorState::Connected | SupervisorState::Reading => self.poll().await,
        }
    }

    async fn connect(&mut self) -> Duration {
        self.state = SupervisorState::Connecting;
        tracing::info!("[{}] Connecting to {}...", self.profile.name, self.source.endpoint());

        match self.source.connect().await {
            Ok(()) => {
                tracing::info!("[{}] Connected", self.profile.name);
                self.state = SupervisorState::Connected;
                Duration::ZERO
            }
            Err(e) => {
                tracing::warn!("[{}] Connection error: {}", self.profile.name, e);
                self.writer.mark_stopped();
                self.state = SupervisorState::Disconnected;
                self.timing.reconnect_backoff
            }
        }
    }

    async fn poll(&mut self) -> Duration {
        self.state = SupervisorState::Reading;

        match self.source.read_block().await {
            Ok(block) => {
                let decoded = decode(&block);
                let reading = MachineReading::new(
                    self.profile.clone(),
                    decoded.run_state,
                    decoded.lot_identifier,
                    decoded.standards,
                    decoded.channel_voltages,
                    decoded.channel_amperages,
                    Utc::now(),
                );
                if reading.run_state.is_running() {
                    self.log_in_background(reading.clone());
                }
                self.writer.publish(reading);
                self.state = SupervisorState::Connected;
            }
            Err(e) => {
                tracing::warn!("[{}] Read error: {}", self.profile.name, e);
                self.writer.mark_stopped();
                if e.is_session_lost() {
                    self.source.disconnect().await;
                    self.state = SupervisorState::Disconnected;
                } else {
                    self.state = SupervisorState::Connected;
                }
            }
        }

        self.timing.polling_interval
    }

    fn log_in_background(&self, reading: MachineReading) {
        let log = Arc::clone(&self.log);
        let name = self.profile.name.clone();
        tokio::spawn(async move {
            match log.log_reading(&reading).await {
                Ok(()) => tracing::debug!("[{}] Logged reading for lot {}", name, reading.lot_identifier),
                Err(e) => tracing::warn!("[{}] Failed to log reading: {}", name, e),
            }
        });
    }
}
