//! Equivalent-circuit parameters of a crystal resonator.
//!
//! A crystal near series resonance behaves like a series RLC branch. Driven from
//! the analyzer's tracking generator and terminated in its input, the branch sits
//! between two matched ports, so the insertion loss at the peak gives the motional
//! resistance and the -3dB bandwidth gives the loaded Q.

use crate::error::DomainError;
use std::f64::consts::PI;

/// Characteristic termination seen by the crystal in the test fixture, in ohms.
pub const DEFAULT_REFERENCE_IMPEDANCE_OHM: f64 = 25.0;

/// One reading taken from the analyzer's markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub center_frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub attenuation_db: f64,
}

/// Parameters derived from a `RawSample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalentCircuit {
    pub q_factor: f64,
    pub motional_resistance_ohm: f64,
    pub effective_resistance_ohm: f64,
    pub motional_inductance_h: f64,
    pub motional_capacitance_f: f64,
}

impl EquivalentCircuit {
    /// Derives the motional branch from a sample.
    ///
    /// Fails for a zero, negative or non-finite bandwidth and for a center
    /// frequency that is not positive. A negative attenuation is accepted; it
    /// yields a motional resistance below zero and is only logged.
    pub fn derive(sample: &RawSample, reference_impedance_ohm: f64) -> Result<Self, DomainError> {
        let RawSample {
            center_frequency_hz: fc,
            bandwidth_hz: bw,
            attenuation_db: att,
        } = *sample;

        if bw == 0.0 {
            return Err(DomainError::ZeroBandwidth);
        }
        if !bw.is_finite() || bw < 0.0 {
            return Err(DomainError::InvalidBandwidth(bw));
        }
        if !fc.is_finite() || fc <= 0.0 {
            return Err(DomainError::InvalidCenterFrequency(fc));
        }
        if !att.is_finite() {
            return Err(DomainError::InvalidAttenuation(att));
        }
        if att < 0.0 {
            log::warn!(
                "attenuation {:.3} dB is negative, motional resistance will be below zero",
                att
            );
        }

        let rm = reference_impedance_ohm * (10f64.powf(att / 20.0) - 1.0);
        let reff = reference_impedance_ohm + rm;

        Ok(Self {
            q_factor: fc / bw,
            motional_resistance_ohm: rm,
            effective_resistance_ohm: reff,
            motional_inductance_h: reff / (2.0 * PI * bw),
            // Full denominator: bw / (2*pi*Reff*fc^2).
            motional_capacitance_f: bw / (2.0 * PI * reff * fc * fc),
        })
    }
}

/// A numbered measurement as it is stored in the session and the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedRow {
    pub sequence_no: u32,
    pub center_frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub attenuation_db: f64,
    pub q_factor: f64,
    pub motional_resistance_ohm: f64,
    pub motional_inductance_h: f64,
    pub motional_capacitance_f: f64,
}

impl DerivedRow {
    /// Derives a row for `sample` and stamps it with `sequence_no`.
    pub fn derive(
        sequence_no: u32,
        sample: &RawSample,
        reference_impedance_ohm: f64,
    ) -> Result<Self, DomainError> {
        let circuit = EquivalentCircuit::derive(sample, reference_impedance_ohm)?;
        Ok(Self {
            sequence_no,
            center_frequency_hz: sample.center_frequency_hz,
            bandwidth_hz: sample.bandwidth_hz,
            attenuation_db: sample.attenuation_db,
            q_factor: circuit.q_factor,
            motional_resistance_ohm: circuit.motional_resistance_ohm,
            motional_inductance_h: circuit.motional_inductance_h,
            motional_capacitance_f: circuit.motional_capacitance_f,
        })
    }
}

impl std::fmt::Display for DerivedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "No.: {}  Fc: {:.1} Hz  BW: {:.1} Hz  Att: {:.3} dB  Q: {:.1}  Rm: {:.3} Ohm  Lm: {:.6e} H  Cm: {:.6e} F",
            self.sequence_no,
            self.center_frequency_hz,
            self.bandwidth_hz,
            self.attenuation_db,
            self.q_factor,
            self.motional_resistance_ohm,
            self.motional_inductance_h,
            self.motional_capacitance_f,
        )
    }
}
