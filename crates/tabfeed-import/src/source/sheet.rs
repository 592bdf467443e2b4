//! Spreadsheet engine
//!
//! Wraps the `calamine` workbook reader behind the [`RowSource`] contract.
//! The on-disk format is picked by file extension alone — `.xlsx` for the
//! zipped OOXML format, `.xls` for the legacy binary format — never by
//! content sniffing, and an unrecognized extension fails before any I/O.
//! Only the first sheet of a workbook is read.

use std::path::Path;

use calamine::{open_workbook, Data, Range, Reader, Xls, Xlsx};
use chrono::SecondsFormat;
use tabfeed_common::types::{Record, Scalar};
use tabfeed_common::{Result, TabfeedError};
use tracing::debug;

use super::RowSource;

const OOXML: &str = ".xlsx";
const LEGACY: &str = ".xls";

/// Parser for workbook files, reading the first sheet only.
#[derive(Debug)]
pub struct SheetParser {
    range: Option<Range<Data>>,
    headers: Vec<String>,
    /// 0-based index of the header row within the sheet's used range.
    header_row: usize,
    rows: usize,
    /// Data rows already streamed since the last rewind.
    cursor: usize,
}

impl SheetParser {
    /// File extensions this parser registers for.
    pub const EXTENSIONS: &'static [&'static str] = &[OOXML, LEGACY];

    /// Open a workbook and derive its header set and row count.
    ///
    /// `file_name` is the original upload name; its extension selects the
    /// workbook implementation.
    pub fn open(path: &Path, header_offset: u32, file_name: &str) -> Result<Self> {
        let range = if file_name.ends_with(OOXML) {
            first_sheet_modern(path)?
        } else if file_name.ends_with(LEGACY) {
            first_sheet_legacy(path)?
        } else {
            return Err(TabfeedError::UnsupportedFileType(file_name.to_string()));
        };

        let header_row = header_offset.max(1) as usize - 1;
        if header_row >= range.height() {
            return Err(TabfeedError::MissingHeaderRow {
                offset: header_offset,
                lines: range.height(),
            });
        }

        let headers = read_headers(&range, header_row);
        let rows = count_rows(&range, header_row);
        debug!(file = file_name, headers = headers.len(), rows, "opened workbook");

        Ok(Self {
            range: Some(range),
            headers,
            header_row,
            rows,
            cursor: 0,
        })
    }

    /// Derived header names, in sheet order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn data_row(&self, index: usize) -> Option<&[Data]> {
        self.range
            .as_ref()
            .and_then(|range| range.rows().nth(self.header_row + 1 + index))
    }

    /// Index of the last populated cell plus one, capped check against the
    /// declared header count.
    fn check_width(&self, cells: &[Data], row: u64) -> Result<()> {
        let width = cells
            .iter()
            .rposition(|cell| !matches!(cell, Data::Empty))
            .map(|position| position + 1)
            .unwrap_or(0);

        if width > self.headers.len() {
            return Err(TabfeedError::ColumnsExceededHeaders {
                row,
                columns: width,
                headers: self.headers.len(),
            });
        }
        Ok(())
    }
}

impl RowSource for SheetParser {
    fn validate(&mut self) -> Result<()> {
        for index in 0..self.rows {
            let row = index as u64 + 1;
            match self.data_row(index) {
                Some(cells) => self.check_width(cells, row)?,
                None => {
                    return Err(TabfeedError::ColumnsHeadersMismatch {
                        row,
                        columns: 0,
                        headers: self.headers.len(),
                    })
                },
            }
        }
        self.rewind()
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.cursor >= self.rows {
            return Ok(None);
        }

        let index = self.cursor;
        self.cursor += 1;
        let row = index as u64 + 1;

        let Some(cells) = self.data_row(index) else {
            return Ok(None);
        };
        self.check_width(cells, row)?;

        let mut record = Record::with_capacity(self.headers.len());
        for (position, header) in self.headers.iter().enumerate() {
            let Some(cell) = cells.get(position) else {
                break;
            };
            if let Some(value) = convert_cell(cell) {
                record.insert(header.clone(), value);
            }
        }

        Ok(Some(record))
    }

    fn release(&mut self) {
        self.range = None;
        self.rows = 0;
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(TabfeedError::FileNotFound(path.display().to_string()))
    }
}

fn first_sheet_modern(path: &Path) -> Result<Range<Data>> {
    ensure_exists(path)?;
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|error: calamine::XlsxError| TabfeedError::Workbook(error.to_string()))?;
    sheet_at_zero(workbook.worksheet_range_at(0))
}

fn first_sheet_legacy(path: &Path) -> Result<Range<Data>> {
    ensure_exists(path)?;
    let mut workbook: Xls<_> = open_workbook(path)
        .map_err(|error: calamine::XlsError| TabfeedError::Workbook(error.to_string()))?;
    sheet_at_zero(workbook.worksheet_range_at(0))
}

fn sheet_at_zero<E: std::fmt::Display>(
    sheet: Option<std::result::Result<Range<Data>, E>>,
) -> Result<Range<Data>> {
    sheet
        .ok_or_else(|| TabfeedError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|error| TabfeedError::Workbook(error.to_string()))
}

/// Header count is the scan of the header row up to the first empty cell.
fn read_headers(range: &Range<Data>, header_row: usize) -> Vec<String> {
    let mut headers = Vec::new();

    if let Some(cells) = range.rows().nth(header_row) {
        for cell in cells {
            let title = match cell {
                Data::Empty => String::new(),
                other => other.to_string().trim().to_string(),
            };
            if title.is_empty() {
                break;
            }
            headers.push(title);
        }
    }

    headers
}

/// Data rows below the header row, up to the first fully-empty row.
fn count_rows(range: &Range<Data>, header_row: usize) -> usize {
    let mut count = 0;

    for cells in range.rows().skip(header_row + 1) {
        if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
            break;
        }
        count += 1;
    }

    count
}

/// Convert one cell, skipping empties so that null values are never indexed
/// as empty strings. Text funnels through the shared inference; numerics
/// collapse to integers when integral; date-formatted cells become ISO-8601
/// instants.
fn convert_cell(cell: &Data) -> Option<Scalar> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) => Scalar::infer(text),
        Data::Int(number) => Some(Scalar::Int(*number)),
        Data::Float(number) => Some(Scalar::from_numeric(*number)),
        Data::Bool(flag) => Some(Scalar::Bool(*flag)),
        Data::DateTime(stamp) => match stamp.as_datetime() {
            Some(instant) => Some(Scalar::Timestamp(
                instant.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true),
            )),
            None => Some(Scalar::from_numeric(stamp.as_f64())),
        },
        Data::DateTimeIso(text) => Some(Scalar::Timestamp(text.clone())),
        Data::DurationIso(text) => Scalar::infer(text),
    }
}
