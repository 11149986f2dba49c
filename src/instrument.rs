//! SCPI conversation with the spectrum analyzer.
//!
//! Everything here talks to the analyzer through the [`Instrument`] trait, so the
//! same code drives a serial connection or the in-process simulator.

use crate::error::{MeasurementError, TransportError};
use crate::params::RawSample;

/// Request/response access to an instrument. Implementations own the connection
/// and enforce their own timeout; callers never retry.
pub trait Instrument {
    /// Sends a query and returns the reply line.
    fn query(&mut self, command: &str) -> Result<String, TransportError>;
    /// Sends a command that has no reply.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;
}

impl<T: Instrument + ?Sized> Instrument for &mut T {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }
}

/// SCPI commands used by the measurement.
pub mod scpi {
    pub const IDENTIFY: &str = "*IDN?";
    pub const TRACKING_GENERATOR_STATE: &str = ":OUTPut:STATe?";

    pub const MARKER1_ON: &str = ":CALCulate:MARKer1:STATe ON";
    pub const MARKER1_PEAK_TRACK: &str = ":CALCulate:MARKer1:CPEak:STATe ON";
    pub const MARKER1_FUNCTION_NDB: &str = ":CALCulate:MARKer1:FUNCtion NDB";
    pub const BANDWIDTH_NDB_MINUS_3: &str = ":CALCulate:BANDwidth:NDB -3";
    pub const COUNTER_ON: &str = ":CALCulate:MARKer:FCOunt:STATe ON";
    pub const COUNTER_RESOLUTION_AUTO_OFF: &str = ":CALCulate:MARKer:FCOunt:RESolution:AUTO OFF";
    pub const COUNTER_RESOLUTION_1HZ: &str = ":CALCulate:MARKer:FCOunt:RESolution 1";

    pub const COUNTER_FREQUENCY: &str = ":CALCulate:MARKer:FCOunt:X?";
    pub const BANDWIDTH_RESULT: &str = ":CALCulate:BANDwidth:RESult?";
    pub const MARKER1_AMPLITUDE: &str = ":CALCulate:MARKer1:Y?";

    /// Setup sequence, in the order it is sent.
    pub const SETUP: [&str; 7] = [
        MARKER1_ON,
        MARKER1_PEAK_TRACK,
        MARKER1_FUNCTION_NDB,
        BANDWIDTH_NDB_MINUS_3,
        COUNTER_ON,
        COUNTER_RESOLUTION_AUTO_OFF,
        COUNTER_RESOLUTION_1HZ,
    ];
}

/// Returns the instrument's identification string.
pub fn identify(instrument: &mut impl Instrument) -> Result<String, TransportError> {
    let idn = instrument.query(scpi::IDENTIFY)?;
    Ok(idn.trim().to_string())
}

/// Checks that the tracking generator output is switched on.
pub fn verify_tracking_generator_enabled(
    instrument: &mut impl Instrument,
) -> Result<bool, MeasurementError> {
    let reply = instrument.query(scpi::TRACKING_GENERATOR_STATE)?;
    match reply.trim().to_ascii_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => {
            let state = parse_number(scpi::TRACKING_GENERATOR_STATE, &reply)?;
            Ok(state != 0.0)
        }
    }
}

/// Sets up marker 1 for peak tracking with a -3dB bandwidth readout and the
/// frequency counter at 1 Hz resolution.
pub fn configure(instrument: &mut impl Instrument) -> Result<(), TransportError> {
    for command in scpi::SETUP {
        log::debug!("setup: {}", command);
        instrument.write(command)?;
    }
    Ok(())
}

/// Reads center frequency, bandwidth and attenuation from the markers.
///
/// The three queries are independent; a failure in any of them discards the
/// whole sample.
pub fn read_sample(instrument: &mut impl Instrument) -> Result<RawSample, MeasurementError> {
    let center_frequency_hz = query_number(instrument, scpi::COUNTER_FREQUENCY)?;
    let bandwidth_hz = query_number(instrument, scpi::BANDWIDTH_RESULT)?;
    let attenuation_db = query_number(instrument, scpi::MARKER1_AMPLITUDE)?;
    Ok(RawSample {
        center_frequency_hz,
        bandwidth_hz,
        attenuation_db,
    })
}

fn query_number(instrument: &mut impl Instrument, command: &str) -> Result<f64, MeasurementError> {
    let reply = instrument.query(command)?;
    log::trace!("{} -> {:?}", command, reply);
    parse_number(command, &reply)
}

/// Parses a numeric SCPI reply (NR1/NR2/NR3), ignoring surrounding whitespace.
fn parse_number(command: &str, reply: &str) -> Result<f64, MeasurementError> {
    let text = reply.trim();
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(MeasurementError::Parse {
            command: command.to_string(),
            response: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Replays canned replies and records every command it sees.
    #[derive(Default)]
    struct Scripted {
        replies: HashMap<&'static str, &'static str>,
        sent: Vec<String>,
    }

    impl Instrument for Scripted {
        fn query(&mut self, command: &str) -> Result<String, TransportError> {
            self.sent.push(command.to_string());
            match self.replies.get(command) {
                Some(reply) => Ok(reply.to_string()),
                None => Err(TransportError::Timeout {
                    command: command.to_string(),
                }),
            }
        }

        fn write(&mut self, command: &str) -> Result<(), TransportError> {
            self.sent.push(command.to_string());
            Ok(())
        }
    }

    fn scripted(replies: &[(&'static str, &'static str)]) -> Scripted {
        Scripted {
            replies: replies.iter().copied().collect(),
            sent: Vec::new(),
        }
    }

    #[test]
    fn configure_sends_setup_in_order() {
        let mut inst = scripted(&[]);
        configure(&mut inst).unwrap();
        assert_eq!(inst.sent, scpi::SETUP.to_vec());
    }

    #[test]
    fn tracking_generator_state_forms() {
        for (reply, expected) in [("1\n", true), ("0\r\n", false), ("ON", true), ("off", false)] {
            let mut inst = Scripted::default();
            inst.replies.insert(scpi::TRACKING_GENERATOR_STATE, reply);
            assert_eq!(verify_tracking_generator_enabled(&mut inst).unwrap(), expected);
        }
    }

    #[test]
    fn tracking_generator_garbage_is_parse_error() {
        let mut inst = scripted(&[(scpi::TRACKING_GENERATOR_STATE, "maybe")]);
        assert!(matches!(
            verify_tracking_generator_enabled(&mut inst),
            Err(MeasurementError::Parse { .. })
        ));
    }

    #[test]
    fn read_sample_parses_nr3_replies() {
        let mut inst = scripted(&[
            (scpi::COUNTER_FREQUENCY, "1.0000000E+07\n"),
            (scpi::BANDWIDTH_RESULT, "2000\n"),
            (scpi::MARKER1_AMPLITUDE, "-3.00e+00\r\n"),
        ]);
        let sample = read_sample(&mut inst).unwrap();
        assert_eq!(sample.center_frequency_hz, 10_000_000.0);
        assert_eq!(sample.bandwidth_hz, 2000.0);
        assert_eq!(sample.attenuation_db, -3.0);
        assert_eq!(
            inst.sent,
            vec![scpi::COUNTER_FREQUENCY, scpi::BANDWIDTH_RESULT, scpi::MARKER1_AMPLITUDE]
        );
    }

    #[test]
    fn read_sample_rejects_non_numeric_reply() {
        let mut inst = scripted(&[
            (scpi::COUNTER_FREQUENCY, "1.0E7"),
            (scpi::BANDWIDTH_RESULT, "--"),
            (scpi::MARKER1_AMPLITUDE, "3.0"),
        ]);
        match read_sample(&mut inst) {
            Err(MeasurementError::Parse { command, response }) => {
                assert_eq!(command, scpi::BANDWIDTH_RESULT);
                assert_eq!(response, "--");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        // The amplitude is never asked for once the bandwidth is bad.
        assert_eq!(inst.sent.len(), 2);
    }

    #[test]
    fn read_sample_rejects_nan() {
        let mut inst = scripted(&[
            (scpi::COUNTER_FREQUENCY, "NaN"),
            (scpi::BANDWIDTH_RESULT, "2000"),
            (scpi::MARKER1_AMPLITUDE, "3.0"),
        ]);
        assert!(matches!(read_sample(&mut inst), Err(MeasurementError::Parse { .. })));
    }

    #[test]
    fn read_sample_surfaces_timeout() {
        let mut inst = scripted(&[(scpi::COUNTER_FREQUENCY, "1.0E7")]);
        assert!(matches!(
            read_sample(&mut inst),
            Err(MeasurementError::Transport(TransportError::Timeout { .. }))
        ));
    }

    #[test]
    fn identify_trims_reply() {
        let mut inst = scripted(&[(scpi::IDENTIFY, "Rigol Technologies,DSA815,DSA8A0000001,00.01.19\n")]);
        assert_eq!(
            identify(&mut inst).unwrap(),
            "Rigol Technologies,DSA815,DSA8A0000001,00.01.19"
        );
    }
}
