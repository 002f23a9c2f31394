//! Error types for autotriage.

use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Errors from the persisted key-value primitive.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Read failed for key {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Write failed for key {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coordination channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Task slot holds malformed data: {0}")]
    MalformedSlot(String),
}

/// Context-spawn primitive errors.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to open context at {address}: {reason}")]
    OpenFailed { address: String, reason: String },
}

/// Driver-side dispatch errors.
///
/// A result-waiter timeout is *not* an error — it is synthesized into a
/// terminal `timeout` outcome. These variants cover genuine faults only.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch already in flight for {link}")]
    AlreadyInFlight { link: String },

    #[error("Candidate {id} has no detail link")]
    MissingLink { id: String },
}

/// Worker-side errors. All of these are recovered locally into a terminal
/// `fail` result before the worker exits.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("No action control found after {attempts} attempts over {spent:?}")]
    ControlNotFound { attempts: u32, spent: Duration },

    #[error("Control activation rejected: {label}")]
    ActivationRejected { label: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
