//! # Simulated spectrum analyzer
//!
//! An in-process stand-in for the analyzer. It keeps the marker and frequency
//! counter state the setup commands change and answers measurement queries from
//! a list of crystal resonances, returning replies formatted like the real
//! instrument's.

use crate::error::TransportError;
use crate::instrument::Instrument;

// Errors for SCPI commands the simulator cannot process.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The header is not one the simulator knows.
    UnknownCommand(String),
    /// A setting command is missing its parameter or the parameter is invalid.
    InvalidParameter(String),
    /// A query was sent as a write, or a write as a query.
    WrongForm(String),
    /// The query needs a marker function that has not been set up.
    SettingsConflict(&'static str),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::UnknownCommand(h) => write!(f, "-113,\"Undefined header\" ({})", h),
            CommandError::InvalidParameter(p) => write!(f, "-224,\"Illegal parameter value\" ({})", p),
            CommandError::WrongForm(h) => write!(f, "-100,\"Command error\" ({})", h),
            CommandError::SettingsConflict(why) => write!(f, "-221,\"Settings conflict\" ({})", why),
        }
    }
}

// Commands understood by the simulator, after header normalisation.
#[derive(Debug, PartialEq)]
enum Command {
    Identify,
    TrackingGeneratorState,
    Marker1State(bool),
    Marker1PeakTrack(bool),
    Marker1Function(MarkerFunction),
    BandwidthNdb(f64),
    CounterState(bool),
    CounterResolutionAuto(bool),
    CounterResolution(f64),
    CounterFrequency,
    BandwidthResult,
    Marker1Amplitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MarkerFunction {
    #[default]
    Off,
    Ndb,
}

/// A crystal loaded into the simulated test fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resonance {
    pub center_frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub attenuation_db: f64,
}

// Marker 1 and frequency counter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub marker1_enabled: bool,
    pub peak_track: bool,
    pub function: MarkerFunction,
    pub ndb_db: f64,
    pub counter_enabled: bool,
    pub counter_resolution_auto: bool,
    pub counter_resolution_hz: f64,
}

impl Default for MarkerState {
    fn default() -> Self {
        Self {
            marker1_enabled: false,
            peak_track: false,
            function: MarkerFunction::Off,
            ndb_db: -3.0,
            counter_enabled: false,
            counter_resolution_auto: true,
            counter_resolution_hz: 1000.0,
        }
    }
}

/// The simulated analyzer.
#[derive(Debug, Clone)]
pub struct SimulatedAnalyzer {
    pub identity: String,
    pub tracking_generator_on: bool,
    pub markers: MarkerState,
    crystals: Vec<Resonance>,
    // Index of the crystal currently in the fixture.
    current: usize,
    // Counter reads seen so far; each one after the first swaps the crystal.
    counter_reads: usize,
}

impl SimulatedAnalyzer {
    /// Creates an analyzer with the tracking generator on and `crystals` queued
    /// for measurement. Each counter read after the first one advances to the
    /// next crystal, wrapping around at the end.
    pub fn new(crystals: Vec<Resonance>) -> Self {
        Self {
            identity: String::from("Rigol Technologies,DSA815,DSA8SIM000001,00.01.19.00.02"),
            tracking_generator_on: true,
            markers: MarkerState::default(),
            crystals,
            current: 0,
            counter_reads: 0,
        }
    }

    /// A few common HC-49 crystals, used by the CLI's simulate mode.
    pub fn with_demo_crystals() -> Self {
        Self::new(vec![
            Resonance { center_frequency_hz: 4_433_619.0, bandwidth_hz: 88.7, attenuation_db: 1.9 },
            Resonance { center_frequency_hz: 10_000_000.0, bandwidth_hz: 2000.0, attenuation_db: 3.0 },
            Resonance { center_frequency_hz: 14_318_180.0, bandwidth_hz: 410.2, attenuation_db: 2.4 },
            Resonance { center_frequency_hz: 27_000_000.0, bandwidth_hz: 1150.0, attenuation_db: 4.1 },
        ])
    }

    /// Parses a command string into a `Command`.
    fn parse_command(&self, command_str: &str) -> Result<Command, CommandError> {
        let mut parts = command_str.trim().splitn(2, char::is_whitespace);
        let header = parts.next().unwrap_or("");
        let param = parts.next().map(str::trim);
        let key = normalize_header(header);

        let flag = |p: Option<&str>| match p.map(|s| s.to_ascii_uppercase()) {
            Some(ref s) if s == "1" || s == "ON" => Ok(true),
            Some(ref s) if s == "0" || s == "OFF" => Ok(false),
            _ => Err(CommandError::InvalidParameter(command_str.to_string())),
        };
        let number = |p: Option<&str>| {
            p.and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| CommandError::InvalidParameter(command_str.to_string()))
        };

        match key.as_str() {
            "*IDN?" => Ok(Command::Identify),
            ":OUTP:STAT?" => Ok(Command::TrackingGeneratorState),
            ":CALC:MARK1:STAT" => flag(param).map(Command::Marker1State),
            ":CALC:MARK1:CPE:STAT" | ":CALC:MARK1:CPE" => flag(param).map(Command::Marker1PeakTrack),
            ":CALC:MARK1:FUNC" => match param.map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("NDB") => Ok(Command::Marker1Function(MarkerFunction::Ndb)),
                Some("OFF") => Ok(Command::Marker1Function(MarkerFunction::Off)),
                _ => Err(CommandError::InvalidParameter(command_str.to_string())),
            },
            ":CALC:BAND:NDB" => number(param).map(Command::BandwidthNdb),
            ":CALC:MARK:FCO:STAT" => flag(param).map(Command::CounterState),
            ":CALC:MARK:FCO:RES:AUTO" => flag(param).map(Command::CounterResolutionAuto),
            ":CALC:MARK:FCO:RES" => number(param).map(Command::CounterResolution),
            ":CALC:MARK:FCO:X?" => Ok(Command::CounterFrequency),
            ":CALC:BAND:RES?" => Ok(Command::BandwidthResult),
            ":CALC:MARK1:Y?" => Ok(Command::Marker1Amplitude),
            _ => Err(CommandError::UnknownCommand(header.to_string())),
        }
    }

    /// Processes one command string. Queries return `Some(reply)`, settings
    /// return `None`.
    pub fn process_command(&mut self, command_str: &str) -> Result<Option<String>, CommandError> {
        let command = self.parse_command(command_str)?;
        self.execute_command(command)
    }

    /// Executes a parsed command.
    fn execute_command(&mut self, command: Command) -> Result<Option<String>, CommandError> {
        let m = &mut self.markers;
        match command {
            Command::Identify => Ok(Some(self.identity.clone())),
            Command::TrackingGeneratorState => {
                Ok(Some(String::from(if self.tracking_generator_on { "1" } else { "0" })))
            }
            Command::Marker1State(on) => {
                m.marker1_enabled = on;
                if !on {
                    m.function = MarkerFunction::Off;
                }
                Ok(None)
            }
            Command::Marker1PeakTrack(on) => {
                m.peak_track = on;
                Ok(None)
            }
            Command::Marker1Function(function) => {
                if !m.marker1_enabled && function != MarkerFunction::Off {
                    return Err(CommandError::SettingsConflict("marker 1 is off"));
                }
                m.function = function;
                Ok(None)
            }
            Command::BandwidthNdb(db) => {
                if !(-100.0..=100.0).contains(&db) {
                    return Err(CommandError::InvalidParameter(format!("{}", db)));
                }
                m.ndb_db = db;
                Ok(None)
            }
            Command::CounterState(on) => {
                m.counter_enabled = on;
                Ok(None)
            }
            Command::CounterResolutionAuto(on) => {
                m.counter_resolution_auto = on;
                Ok(None)
            }
            Command::CounterResolution(hz) => {
                if hz <= 0.0 {
                    return Err(CommandError::InvalidParameter(format!("{}", hz)));
                }
                m.counter_resolution_hz = hz;
                m.counter_resolution_auto = false;
                Ok(None)
            }
            Command::CounterFrequency => {
                if !m.counter_enabled {
                    return Err(CommandError::SettingsConflict("frequency counter is off"));
                }
                let resolution = m.counter_resolution_hz;
                if self.counter_reads > 0 && !self.crystals.is_empty() {
                    self.current = (self.current + 1) % self.crystals.len();
                }
                self.counter_reads += 1;
                let fc = self.crystal()?.center_frequency_hz;
                let counted = (fc / resolution).round() * resolution;
                Ok(Some(format_nr3(counted)))
            }
            Command::BandwidthResult => {
                if m.function != MarkerFunction::Ndb {
                    return Err(CommandError::SettingsConflict("N dB bandwidth is off"));
                }
                Ok(Some(format_nr3(self.crystal()?.bandwidth_hz)))
            }
            Command::Marker1Amplitude => {
                if !m.marker1_enabled {
                    return Err(CommandError::SettingsConflict("marker 1 is off"));
                }
                // Trace is normalised against the through path, so marker 1
                // reads the insertion loss directly.
                Ok(Some(format_nr3(self.crystal()?.attenuation_db)))
            }
        }
    }

    fn crystal(&self) -> Result<Resonance, CommandError> {
        self.crystals
            .get(self.current)
            .copied()
            .ok_or(CommandError::SettingsConflict("no crystal in the fixture"))
    }
}

impl Instrument for SimulatedAnalyzer {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        match self.process_command(command) {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(rejected(command, CommandError::WrongForm(command.to_string()))),
            Err(e) => Err(rejected(command, e)),
        }
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        match self.process_command(command) {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(rejected(command, CommandError::WrongForm(command.to_string()))),
            Err(e) => Err(rejected(command, e)),
        }
    }
}

fn rejected(command: &str, e: CommandError) -> TransportError {
    TransportError::Rejected {
        command: command.to_string(),
        reason: e.to_string(),
    }
}

/// Reduces a SCPI header to its short form, upper case, so `calc:marker1:state`
/// and `:CALCulate:MARKer1:STATe` compare equal. The numeric suffix is kept.
fn normalize_header(header: &str) -> String {
    let mut out = String::new();
    let header = header.trim_start_matches(':');
    if header.starts_with('*') {
        return header.to_ascii_uppercase();
    }
    for node in header.split(':') {
        let upper = node.to_ascii_uppercase();
        let (node, query) = match upper.strip_suffix('?') {
            Some(n) => (n.to_string(), true),
            None => (upper, false),
        };
        let digits_at = node.find(|c: char| c.is_ascii_digit()).unwrap_or(node.len());
        let (name, suffix) = node.split_at(digits_at);
        out.push(':');
        out.push_str(&short_form(name));
        out.push_str(suffix);
        if query {
            out.push('?');
        }
    }
    out
}

// SCPI short form: first four letters, or three when the fourth is a vowel.
fn short_form(name: &str) -> String {
    if name.len() <= 4 || !name.is_ascii() {
        return name.to_string();
    }
    let bytes = name.as_bytes();
    if matches!(bytes[3], b'A' | b'E' | b'I' | b'O' | b'U') {
        name[..3].to_string()
    } else {
        name[..4].to_string()
    }
}

fn format_nr3(value: f64) -> String {
    format!("{:E}", value)
}
