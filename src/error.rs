//! Error types for the discovery-to-dispatch pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discovery subsystem errors
///
/// Only `Init` is fatal; the discovery loop logs everything else and keeps going.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery initialization failed: {0}")]
    Init(String),

    #[error("Failed to form address request: {0}")]
    Request(String),

    #[error("Failed to reach peer: {0}")]
    Transport(String),

    #[error("Failed to read peer address: {0}")]
    Read(String),
}

/// Streaming session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to start {program}: {reason}")]
    Start { program: String, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No audio or video device selected")]
    NoSource,

    #[error("Invalid log verbosity: {0} (expected debug, error, warn or silent)")]
    InvalidVerbosity(String),

    #[error("Invalid capture format: {0} (expected dshow, avfoundation or v4l2)")]
    InvalidCaptureFormat(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
