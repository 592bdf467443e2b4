//! Delimited-text engine
//!
//! Byte-level, quote-aware tokenizer over a windowed memory map. Files of any
//! size parse without being read into addressable memory at once: the map is
//! split into bounded pages and an index past a page boundary consults the
//! next page.
//!
//! Row-terminator convention (standardized, see DESIGN.md): CR, LF and CRLF
//! are interchangeable logical terminators. Row counting only counts lines
//! with at least one non-terminator byte, so blank lines and the trailing
//! newline never count as rows. Inside quotes, separators are field content;
//! quoted fields must not contain row terminators.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tabfeed_common::types::{Record, Scalar};
use tabfeed_common::{Result, TabfeedError};
use tracing::debug;

use super::RowSource;

const TOKEN_CR: u8 = b'\r';
const TOKEN_LF: u8 = b'\n';
const TOKEN_QUOTE: u8 = b'"';
const TOKEN_SEPARATOR: u8 = b',';

/// Byte span covered by one mapped page.
pub const DEFAULT_PAGE_SIZE: u64 = 512 << 20;

/// A read-only file view split into bounded memory-mapped pages.
#[derive(Debug)]
struct PagedMap {
    pages: Vec<Mmap>,
    page_size: u64,
    len: u64,
}

impl PagedMap {
    fn open(file: &File, page_size: u64) -> Result<Self> {
        let len = file.metadata()?.len();
        let mut pages = Vec::with_capacity((len / page_size) as usize + 1);
        let mut offset = 0;

        while offset < len {
            let span = (len - offset).min(page_size);
            // read-only map; the file is never written through this view.
            let page = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(span as usize)
                    .map(file)?
            };
            pages.push(page);
            offset += span;
        }

        Ok(Self {
            pages,
            page_size,
            len,
        })
    }

    #[inline]
    fn get(&self, index: u64) -> u8 {
        let page = (index / self.page_size) as usize;
        let offset = (index % self.page_size) as usize;
        self.pages[page][offset]
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn release(&mut self) {
        self.pages.clear();
        self.len = 0;
    }
}

/// Parser for comma-separated files over a windowed memory map.
#[derive(Debug)]
pub struct DelimitedParser {
    map: PagedMap,
    headers: Vec<String>,
    /// Byte offset of the first data row.
    data_start: u64,
    /// Read position while streaming.
    cursor: u64,
    /// 1-based number of the data row most recently tokenized.
    row: u64,
    rows: usize,
    released: bool,
}

impl DelimitedParser {
    /// File extensions this parser registers for.
    pub const EXTENSIONS: &'static [&'static str] = &[".csv"];

    /// Open a delimited file and derive its header set and row count.
    pub fn open(path: &Path, header_offset: u32) -> Result<Self> {
        Self::open_with_page_size(path, header_offset, DEFAULT_PAGE_SIZE)
    }

    /// As [`open`](Self::open) with an explicit page span, used by tests to
    /// force page rollover on small files.
    pub fn open_with_page_size(path: &Path, header_offset: u32, page_size: u64) -> Result<Self> {
        let file = File::open(path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => {
                TabfeedError::FileNotFound(path.display().to_string())
            },
            _ => TabfeedError::Io(error),
        })?;

        let map = PagedMap::open(&file, page_size)?;
        let header_offset = header_offset.max(1);
        let layout = scan_layout(&map, header_offset)?;

        let headers = parse_headers(&map, layout.header_start, layout.header_end);
        debug!(
            headers = headers.len(),
            rows = layout.rows,
            pages = map.pages.len(),
            "opened delimited file"
        );

        Ok(Self {
            map,
            headers,
            data_start: layout.data_start,
            cursor: layout.data_start,
            row: 0,
            rows: layout.rows,
            released: false,
        })
    }

    /// Derived header names, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Tokenize the row under the cursor.
    ///
    /// The dry run counts and checks columns without inferring scalar types;
    /// conversion cost is only paid when a record is materialized.
    fn read_row(&mut self, dry_run: bool) -> Result<Option<Record>> {
        if self.released || self.row as usize >= self.rows {
            return Ok(None);
        }

        self.row += 1;
        let header_count = self.headers.len();
        let mut record = Record::with_capacity(if dry_run { 0 } else { header_count });
        let mut field: Vec<u8> = Vec::new();
        let mut fields_closed = 0usize;
        let mut quoted = false;
        let mut done = false;
        let len = self.map.len();

        while self.cursor < len && !done {
            let byte = self.map.get(self.cursor);
            self.cursor += 1;

            match byte {
                TOKEN_QUOTE => quoted = !quoted,
                TOKEN_SEPARATOR if !quoted => {
                    self.close_field(dry_run, &mut field, &mut fields_closed, &mut record)?;
                },
                TOKEN_CR | TOKEN_LF if !quoted => {
                    // a terminator only ends the row once every field but the
                    // last has been closed; otherwise it is blank padding.
                    if fields_closed == header_count.saturating_sub(1) {
                        self.close_field(dry_run, &mut field, &mut fields_closed, &mut record)?;
                        done = true;
                    }
                },
                _ => field.push(byte),
            }
        }

        if done {
            // collapse the rest of the terminator run (the LF of a CRLF pair,
            // blank lines) so the cursor rests on the next row's first byte.
            while self.cursor < len
                && matches!(self.map.get(self.cursor), TOKEN_CR | TOKEN_LF)
            {
                self.cursor += 1;
            }
        } else {
            // end of file closes the final field.
            self.close_field(dry_run, &mut field, &mut fields_closed, &mut record)?;
        }

        if fields_closed != header_count {
            return Err(TabfeedError::ColumnsHeadersMismatch {
                row: self.row,
                columns: fields_closed,
                headers: header_count,
            });
        }

        Ok(Some(record))
    }

    fn close_field(
        &self,
        dry_run: bool,
        field: &mut Vec<u8>,
        fields_closed: &mut usize,
        record: &mut Record,
    ) -> Result<()> {
        if *fields_closed + 1 > self.headers.len() {
            return Err(TabfeedError::ColumnsExceededHeaders {
                row: self.row,
                columns: *fields_closed + 1,
                headers: self.headers.len(),
            });
        }

        if !dry_run {
            if let Some(value) = Scalar::infer_bytes(field) {
                record.insert(self.headers[*fields_closed].clone(), value);
            }
        }

        *fields_closed += 1;
        field.clear();
        Ok(())
    }
}

impl RowSource for DelimitedParser {
    fn validate(&mut self) -> Result<()> {
        self.rewind()?;
        for _ in 0..self.rows {
            self.read_row(true)?;
        }
        self.rewind()
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = self.data_start;
        self.row = 0;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        self.read_row(false)
    }

    fn release(&mut self) {
        self.map.release();
        self.released = true;
    }
}

struct Layout {
    header_start: u64,
    header_end: u64,
    data_start: u64,
    rows: usize,
}

/// One pass over the map: locate the header row, the first data byte and the
/// number of data rows. Lines are terminator-delimited spans containing at
/// least one non-terminator byte.
fn scan_layout(map: &PagedMap, header_offset: u32) -> Result<Layout> {
    let len = map.len();
    let target = header_offset as usize;
    let mut lines = 0usize;
    let mut rows = 0usize;
    let mut has_content = false;
    let mut line_start = 0u64;
    let mut header_span: Option<(u64, u64)> = None;
    let mut data_start: Option<u64> = None;

    let mut close_line = |start: u64, end: u64| {
        lines += 1;
        if lines == target {
            header_span = Some((start, end));
        } else if lines > target {
            rows += 1;
            if data_start.is_none() {
                data_start = Some(start);
            }
        }
    };

    for i in 0..len {
        let byte = map.get(i);
        if byte == TOKEN_CR || byte == TOKEN_LF {
            if has_content {
                close_line(line_start, i);
                has_content = false;
            }
        } else if !has_content {
            line_start = i;
            has_content = true;
        }
    }
    if has_content {
        close_line(line_start, len);
    }

    let (header_start, header_end) = header_span.ok_or(TabfeedError::MissingHeaderRow {
        offset: header_offset,
        lines,
    })?;

    Ok(Layout {
        header_start,
        header_end,
        data_start: data_start.unwrap_or(len),
        rows,
    })
}

/// Split the header row on the field separator, strip surrounding quotes and
/// trim whitespace.
fn parse_headers(map: &PagedMap, start: u64, end: u64) -> Vec<String> {
    let mut bytes = Vec::with_capacity((end - start) as usize);
    for i in start..end {
        bytes.push(map.get(i));
    }

    String::from_utf8_lossy(&bytes)
        .split(TOKEN_SEPARATOR as char)
        .map(|header| header.replace(TOKEN_QUOTE as char, "").trim().to_string())
        .collect()
}
