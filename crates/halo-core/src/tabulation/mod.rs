//! Cooperative tabulation of the power-spectrum table across workers, with
//! per-worker checkpoint logs for resuming interrupted runs.

pub mod checkpoint;
pub mod generate;
pub mod manager;
pub mod workers;

pub use checkpoint::{CheckpointLog, CheckpointRecord, LoadedCheckpoint};
pub use generate::{GeneratedTable, TableRequest, generate_ps};
pub use manager::{TabulationManager, TabulationPhase, TabulationReport};
pub use workers::{
    Communicator, FileCommunicator, InProcessCommunicator, InProcessGroup, SoloCommunicator,
    WorkerContext,
};
