//! Hub error types

use analog_transport::TransportError;
use thiserror::Error;

/// Errors surfaced while setting up or tearing down the hub
///
/// Once the hub is running, device failures are absorbed and never reach
/// the polling consumer.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

impl From<toml::de::Error> for HubError {
    fn from(e: toml::de::Error) -> Self {
        HubError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for HubError {
    fn from(e: toml::ser::Error) -> Self {
        HubError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
