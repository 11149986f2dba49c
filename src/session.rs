//! The interactive measurement session.
//!
//! The session owns the instrument for its whole lifetime and walks through
//! `Configuring -> AwaitingMeasurement -> (Measuring -> AwaitingMeasurement)* ->
//! Terminated`. The operator prompt is the only place it waits.

use crate::error::{MeasurementError, SessionError};
use crate::instrument::{self, Instrument};
use crate::params::DerivedRow;
use crossterm::style::Stylize;
use std::fmt;
use std::io::{self, BufRead, Write};

/// What the operator wants to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Measure,
    Stop,
}

/// The person at the bench.
pub trait Operator {
    /// Blocks until the operator decides whether to measure another crystal.
    fn next_decision(&mut self) -> io::Result<Decision>;
    /// Asks for the file to save the results to. An empty string means none.
    fn destination(&mut self) -> io::Result<String>;
    /// Shows a line of information.
    fn inform(&mut self, message: &str);
    /// Shows a measured row.
    fn report(&mut self, row: &DerivedRow);
    /// Shows a problem the operator can act on.
    fn warn(&mut self, message: &str);
}

/// Operator on a terminal, or anything else that reads lines and writes text.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    // Prints `prompt` and reads one line. `None` on end of input.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    // Output the operator never sees is logged instead of failing the session.
    fn show(&mut self, text: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.output, "{}", text) {
            log::warn!("could not show operator output ({}): {}", e, text);
        }
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn next_decision(&mut self) -> io::Result<Decision> {
        match self.ask("Measure XTAL? [Y/n]: ")? {
            Some(answer) if answer.eq_ignore_ascii_case("n") => Ok(Decision::Stop),
            Some(_) => Ok(Decision::Measure),
            None => Ok(Decision::Stop),
        }
    }

    fn destination(&mut self) -> io::Result<String> {
        Ok(self.ask("Save as: ")?.unwrap_or_default())
    }

    fn inform(&mut self, message: &str) {
        self.show(format_args!("{}", message));
    }

    fn report(&mut self, row: &DerivedRow) {
        self.show(format_args!("{}\n", row.to_string().green()));
    }

    fn warn(&mut self, message: &str) {
        self.show(format_args!("{}", format!("!!! {} !!!", message).yellow().bold()));
    }
}

/// Measurements taken so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    rows: Vec<DerivedRow>,
    next_sequence_no: u32,
}

impl Session {
    /// Creates an empty session whose first row will be numbered
    /// `start_offset + 1`.
    pub fn new(start_offset: u32) -> Self {
        Self {
            rows: Vec::new(),
            next_sequence_no: start_offset.saturating_add(1),
        }
    }

    pub fn rows(&self) -> &[DerivedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_sequence_no(&self) -> u32 {
        self.next_sequence_no
    }

    /// Takes one measurement and appends it.
    ///
    /// The sequence number is only consumed when the row is actually appended,
    /// so failed attempts leave no gaps. Once the next number would not fit in
    /// a `u32` every further measurement is refused.
    pub fn measure(
        &mut self,
        instrument: &mut impl Instrument,
        reference_impedance_ohm: f64,
    ) -> Result<&DerivedRow, MeasurementError> {
        let after = self
            .next_sequence_no
            .checked_add(1)
            .ok_or(MeasurementError::SequenceExhausted {
                last: self.next_sequence_no,
            })?;
        let sample = instrument::read_sample(instrument)?;
        let row = DerivedRow::derive(self.next_sequence_no, &sample, reference_impedance_ohm)?;
        self.rows.push(row);
        self.next_sequence_no = after;
        Ok(&self.rows[self.rows.len() - 1])
    }
}

/// Session loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Configuring,
    AwaitingMeasurement,
    Measuring,
    Terminated,
}

/// Runs a full session: checks and configures the instrument, then measures
/// until the operator stops.
///
/// Returns the finished session for persisting. A disabled tracking generator
/// or a failed setup returns an error before any measurement is taken.
/// Failures of individual measurements are shown to the operator and the loop
/// goes back to waiting.
pub fn run(
    instrument: &mut impl Instrument,
    operator: &mut impl Operator,
    start_offset: u32,
    reference_impedance_ohm: f64,
) -> Result<Session, SessionError> {
    let mut state = State::Configuring;
    let mut session = Session::new(start_offset);
    log::debug!("session state {:?}", state);

    let idn = instrument::identify(instrument)?;
    operator.inform(&format!("Device ID: {}\n", idn));

    if !instrument::verify_tracking_generator_enabled(instrument).map_err(SessionError::Setup)? {
        log::error!("tracking generator output is off");
        return Err(SessionError::TrackingGeneratorDisabled);
    }
    instrument::configure(instrument)?;

    loop {
        transition(&mut state, State::AwaitingMeasurement);
        match operator.next_decision().map_err(SessionError::Operator)? {
            Decision::Stop => break,
            Decision::Measure => {}
        }

        transition(&mut state, State::Measuring);
        match session.measure(instrument, reference_impedance_ohm) {
            Ok(row) => {
                log::info!("measured crystal {}", row.sequence_no);
                operator.report(row);
            }
            Err(e) => {
                log::warn!("measurement discarded: {}", e);
                operator.warn(&format!("Measurement discarded: {}", e));
            }
        }
    }

    transition(&mut state, State::Terminated);
    log::info!("session finished with {} measurement(s)", session.len());
    Ok(session)
}

fn transition(state: &mut State, next: State) {
    log::trace!("session state {:?} -> {:?}", state, next);
    *state = next;
}
