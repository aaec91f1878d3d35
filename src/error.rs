use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatcherError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Device probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("Device service unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("Dispatch to device {device_id} failed: {reason}")]
    Dispatch { device_id: u32, reason: String },

    #[error("Request body is empty")]
    EmptyBody,

    #[error("Failed to decode request: {0}")]
    Decode(String),

    #[error("Sink delivery failed: {0}")]
    Sink(#[from] reqwest::Error),

    #[error("Dispatcher answered HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl DispatcherError {
    /// Probe failures mean "no device is free", never a hard failure.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            DispatcherError::ProbeTimeout(_) | DispatcherError::ProbeUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
