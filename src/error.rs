//! Error types for every stage of a measurement session.
//!
//! Each component reports its own failure class. The session loop decides which
//! of them end the run and which only discard the current measurement.

use std::io;
use thiserror::Error;

/// Failure to locate exactly one instrument port.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),
    #[error("no serial port matching '{filter}' was found")]
    NoneFound { filter: String },
    #[error("{count} serial ports match '{filter}', expected exactly one")]
    Ambiguous { filter: String, count: usize },
}

/// Failure while exchanging a command with the instrument.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("timed out waiting for a reply to '{command}'")]
    Timeout { command: String },
    #[error("I/O error on '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("instrument closed the connection during '{command}'")]
    Disconnected { command: String },
    #[error("instrument rejected '{command}': {reason}")]
    Rejected { command: String, reason: String },
}

/// A raw reading cannot be turned into equivalent-circuit parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("bandwidth is zero, Q and Lm are undefined")]
    ZeroBandwidth,
    #[error("bandwidth {0} Hz is not a positive finite value")]
    InvalidBandwidth(f64),
    #[error("center frequency {0} Hz is not a positive finite value")]
    InvalidCenterFrequency(f64),
    #[error("attenuation {0} dB is not finite")]
    InvalidAttenuation(f64),
}

/// Failure of a single measurement attempt. None of these end the session.
#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("reply '{response}' to '{command}' is not a number")]
    Parse { command: String, response: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("sequence number {last} is the last one available")]
    SequenceExhausted { last: u32 },
}

/// Failure that ends the session before or outside the measurement loop.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tracking generator is not enabled")]
    TrackingGeneratorDisabled,
    #[error("instrument setup failed: {0}")]
    Setup(#[source] MeasurementError),
    #[error("operator input failed: {0}")]
    Operator(#[source] io::Error),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Setup(MeasurementError::Transport(err))
    }
}

/// Failure to persist a session.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no destination file name given")]
    NoDestination,
    #[error("could not write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure to load or validate settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}
