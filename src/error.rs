//! Error taxonomy for the control plane.
//!
//! Per-pod errors ([`PodClientError`]) never surface to the controller —
//! they are logged and counted, and the next tick is the retry boundary.
//! [`RegistryError`] and [`ConfigError`] are the only error types that
//! cross an external API boundary.

use thiserror::Error;

/// Failure talking to (or decoding a response from) one pod.
#[derive(Error, Debug)]
pub enum PodClientError {
    #[error("transport error talking to pod: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("request to pod timed out")]
    Timeout,

    #[error("pod responded with non-success status {0}")]
    BadStatus(reqwest::StatusCode),

    #[error("invalid pod address: {0}")]
    InvalidAddress(String),
}

/// Failure reported by the worker registry / admission API.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("pod {0} is not registered")]
    PodNotFound(String),

    #[error("instance {0} is not registered")]
    InstanceNotFound(String),
}

/// Fatal at startup: bad environment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    InvalidValue {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
