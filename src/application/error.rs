// Errors surfaced by the application layer
use crate::domain::machine::MachineId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("machine {0} is not configured")]
    NotFound(MachineId),

    #[error("machine {0} already has a store writer")]
    WriterClaimed(MachineId),
}
