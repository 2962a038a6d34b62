//! Error types for the node maintenance guard

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failure to read a configuration or certificate file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed TOML configuration
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Webhook server could not be started or crashed
    #[error("Webhook server error: {0}")]
    ServerError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
