//! Run settings, read from an optional TOML file and overridden on the command
//! line.

use crate::error::ConfigError;
use crate::params::DEFAULT_REFERENCE_IMPEDANCE_OHM;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Workbook to write. Asked for at the end of the session when unset.
    pub output_file: Option<PathBuf>,
    /// Number given to the first crystal measured.
    pub start_number: u32,
    pub reference_impedance_ohm: f64,
    /// Text identifying the analyzer's serial port.
    pub port_filter: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub sheet_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_file: None,
            start_number: 1,
            reference_impedance_ohm: DEFAULT_REFERENCE_IMPEDANCE_OHM,
            port_filter: String::from("DSA"),
            baud_rate: 9600,
            timeout_ms: 10_000,
            sheet_title: String::from("Measurements"),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Offset added to every sequence number; the first row is `offset + 1`.
    pub fn start_offset(&self) -> u32 {
        self.start_number.saturating_sub(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Applies a starting number given as text. Anything that is not a
    /// positive integer leaves the current value and logs a warning.
    pub fn apply_start_number(&mut self, text: &str) {
        match text.trim().parse::<u32>() {
            Ok(n) if n >= 1 => self.start_number = n,
            _ => log::warn!(
                "invalid starting number '{}', using {}",
                text,
                self.start_number
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.reference_impedance_ohm.is_finite() || self.reference_impedance_ohm <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "reference_impedance_ohm",
                reason: format!("{} is not a positive number", self.reference_impedance_ohm),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_ms",
                reason: String::from("must be greater than zero"),
            });
        }
        if self.port_filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "port_filter",
                reason: String::from("must not be empty"),
            });
        }
        if self.start_number == 0 {
            return Err(ConfigError::Invalid {
                key: "start_number",
                reason: String::from("numbering starts at 1"),
            });
        }
        // Excel's own limits on worksheet names.
        let title = &self.sheet_title;
        if title.is_empty()
            || title.chars().count() > 31
            || title.contains(&['[', ']', ':', '*', '?', '/', '\\'][..])
        {
            return Err(ConfigError::Invalid {
                key: "sheet_title",
                reason: format!("'{}' is not a valid worksheet name", title),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.start_offset(), 0);
        assert_eq!(s.reference_impedance_ohm, 25.0);
        assert_eq!(s.timeout(), Duration::from_secs(10));
        assert_eq!(s.port_filter, "DSA");
        assert!(s.output_file.is_none());
        s.validate().unwrap();
    }

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn parse_full_file() {
        let s = Settings::from_toml(
            r#"
            output_file = "batch7.xlsx"
            start_number = 101
            reference_impedance_ohm = 12.5
            port_filter = "DSA815"
            baud_rate = 115200
            timeout_ms = 2500
            sheet_title = "Batch 7"
            "#,
        )
        .unwrap();
        assert_eq!(s.output_file, Some(PathBuf::from("batch7.xlsx")));
        assert_eq!(s.start_offset(), 100);
        assert_eq!(s.reference_impedance_ohm, 12.5);
        assert_eq!(s.baud_rate, 115200);
        assert_eq!(s.timeout(), Duration::from_millis(2500));
        assert_eq!(s.sheet_title, "Batch 7");
    }

    #[test]
    fn reject_unknown_key() {
        assert!(matches!(Settings::from_toml("colour = 1"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn reject_bad_values() {
        for text in [
            "reference_impedance_ohm = 0.0",
            "reference_impedance_ohm = -50.0",
            "timeout_ms = 0",
            "port_filter = \" \"",
            "start_number = 0",
            "sheet_title = \"a/b\"",
        ] {
            assert!(
                matches!(Settings::from_toml(text), Err(ConfigError::Invalid { .. })),
                "{} should be rejected",
                text
            );
        }
    }

    #[test]
    fn start_number_text() {
        let mut s = Settings::default();
        s.apply_start_number("25");
        assert_eq!(s.start_offset(), 24);
        s.apply_start_number("twenty");
        assert_eq!(s.start_number, 25);
        s.apply_start_number("0");
        assert_eq!(s.start_number, 25);
        s.apply_start_number("-3");
        assert_eq!(s.start_number, 25);
    }
}
