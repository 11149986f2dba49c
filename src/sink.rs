//! Saving a session as a spreadsheet.

use crate::error::SinkError;
use crate::params::DerivedRow;
use crate::session::Session;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

/// Column labels, in output order.
pub const COLUMNS: [&str; 8] = [
    "No.",
    "Center Frequency",
    "-3dB Bandwidth",
    "Attenuation",
    "Q",
    "Rm",
    "Lm",
    "Cm",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Integer(u32),
    Number(f64),
}

/// A table ready to be written by a `ResultSink`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub title: String,
    pub header: Vec<String>,
    // Header in bold italic.
    pub emphasize_header: bool,
    pub rows: Vec<Vec<Cell>>,
}

/// Somewhere a finished sheet can be stored.
pub trait ResultSink {
    fn write_sheet(&mut self, sheet: &Sheet, destination: &Path) -> Result<(), SinkError>;
}

/// Maps a row to its spreadsheet record, in `COLUMNS` order.
pub fn record(row: &DerivedRow) -> Vec<Cell> {
    vec![
        Cell::Integer(row.sequence_no),
        Cell::Number(row.center_frequency_hz),
        Cell::Number(row.bandwidth_hz),
        Cell::Number(row.attenuation_db),
        Cell::Number(row.q_factor),
        Cell::Number(row.motional_resistance_ohm),
        Cell::Number(row.motional_inductance_h),
        Cell::Number(row.motional_capacitance_f),
    ]
}

/// Builds the sheet for a session.
pub fn sheet(session: &Session, title: &str) -> Sheet {
    Sheet {
        title: title.to_string(),
        header: COLUMNS.iter().map(|c| c.to_string()).collect(),
        emphasize_header: true,
        rows: session.rows().iter().map(record).collect(),
    }
}

/// Writes every row of `session` to `destination`. An empty session still
/// produces a sheet with the header row. The session is left untouched, so a
/// failed save can be retried elsewhere.
pub fn persist(
    session: &Session,
    title: &str,
    destination: &Path,
    sink: &mut impl ResultSink,
) -> Result<(), SinkError> {
    if destination.as_os_str().is_empty() {
        return Err(SinkError::NoDestination);
    }
    let sheet = sheet(session, title);
    log::debug!("saving {} row(s) to {}", sheet.rows.len(), destination.display());
    sink.write_sheet(&sheet, destination)
}

/// Writes `.xlsx` workbooks.
#[derive(Debug, Default)]
pub struct XlsxSink;

impl ResultSink for XlsxSink {
    fn write_sheet(&mut self, sheet: &Sheet, destination: &Path) -> Result<(), SinkError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.title)?;

        let mut header_format = Format::new();
        if sheet.emphasize_header {
            header_format = header_format.set_bold().set_italic();
        }
        for (col, label) in sheet.header.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, label, &header_format)?;
        }

        for (i, cells) in sheet.rows.iter().enumerate() {
            let row = i as u32 + 1;
            for (col, cell) in cells.iter().enumerate() {
                match *cell {
                    Cell::Integer(v) => worksheet.write_number(row, col as u16, v)?,
                    Cell::Number(v) => worksheet.write_number(row, col as u16, v)?,
                };
            }
        }

        workbook.save(destination)?;
        Ok(())
    }
}
