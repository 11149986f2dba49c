//! # Crystal Parameter Measurement Library
//!
//! This library drives a spectrum analyzer with a tracking generator to
//! characterize quartz crystals. It sets up the analyzer's markers, reads center
//! frequency, -3dB bandwidth and insertion loss for each crystal the operator
//! puts in the fixture, derives the motional equivalent circuit, and saves the
//! results to a spreadsheet.

pub mod config;
pub mod error;
pub mod instrument;
pub mod params;
pub mod session;
pub mod simulator;
pub mod sink;
pub mod transport;

pub use config::Settings;
pub use error::{
    ConfigError, DiscoveryError, DomainError, MeasurementError, SessionError, SinkError,
    TransportError,
};
pub use instrument::Instrument;
pub use params::{DerivedRow, EquivalentCircuit, RawSample};
pub use session::{ConsoleOperator, Decision, Operator, Session};
pub use simulator::SimulatedAnalyzer;
pub use sink::{ResultSink, XlsxSink};
pub use transport::SerialInstrument;
