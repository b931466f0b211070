// Port to a field device exposing the telemetry register block
use crate::domain::register_map::RegisterBlock;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("cannot reach {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device answered with exception: {0}")]
    Exception(String),

    #[error("no answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("expected 41 registers, got {0}")]
    ShortBlock(usize),

    #[error("no open session")]
    NotConnected,
}

impl AcquisitionError {
    /// Whether the session has to be reopened before the next read.
    pub fn is_session_lost(&self) -> bool {
        match self {
            AcquisitionError::Connect { .. }
            | AcquisitionError::Transport(_)
            | AcquisitionError::Timeout(_)
            | AcquisitionError::NotConnected => true,
            AcquisitionError::Exception(_) | AcquisitionError::ShortBlock(_) => false,
        }
    }
}

/// A session to one device. Reads happen strictly one at a time.
#[async_trait]
pub trait RegisterSource: Send {
    /// Human readable target, used in logs.
    fn endpoint(&self) -> String;

    async fn connect(&mut self) -> Result<(), AcquisitionError>;

    async fn read_block(&mut self) -> Result<RegisterBlock, AcquisitionError>;

    /// Drop the session so the next `connect` starts fresh.
    async fn disconnect(&mut self);
}
