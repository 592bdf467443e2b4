//! Common types for the tabfeed pipeline
//!
//! The record model with its type-inference rules, plus the value objects
//! that cross the boundary between the front end and the pipeline.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// Scalars and Type Inference
// ============================================================================

/// A typed cell value as it is indexed.
///
/// Inference order (applied to trimmed raw text): integer, floating point,
/// boolean, otherwise string. Timestamps are only produced by the spreadsheet
/// adapter for date-formatted numeric cells and carry the ISO-8601 rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(String),
    Text(String),
}

impl Scalar {
    /// Infer the type of a raw cell value.
    ///
    /// Returns `None` for values that trim to the empty string; absent fields
    /// are never inserted into a record. The same function backs every parser
    /// so both file formats index identically.
    pub fn infer(raw: &str) -> Option<Scalar> {
        let value = raw.trim();

        if value.is_empty() {
            return None;
        }

        if value.bytes().all(|b| b.is_ascii_digit()) {
            // fall through on overflow, e.g. card numbers longer than i64.
            if let Ok(number) = value.parse::<i64>() {
                return Some(Scalar::Int(number));
            }
        }

        if is_float(value) {
            if let Ok(number) = value.parse::<f64>() {
                return Some(Scalar::Float(number));
            }
        }

        match value {
            "true" => Some(Scalar::Bool(true)),
            "false" => Some(Scalar::Bool(false)),
            _ => Some(Scalar::Text(value.to_string())),
        }
    }

    /// Infer the type of a raw cell given as bytes; invalid UTF-8 is replaced.
    pub fn infer_bytes(raw: &[u8]) -> Option<Scalar> {
        Scalar::infer(&String::from_utf8_lossy(raw))
    }

    /// Convert a spreadsheet numeric cell: integral values become integers,
    /// anything else stays floating point.
    pub fn from_numeric(value: f64) -> Scalar {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Scalar::Int(value as i64)
        } else {
            Scalar::Float(value)
        }
    }
}

/// Matches `^[0-9]+\.[0-9]+$` without pulling in a regex engine.
fn is_float(value: &str) -> bool {
    let mut parts = value.splitn(2, '.');
    let (integral, fractional) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));

    !integral.is_empty()
        && !fractional.is_empty()
        && integral.bytes().all(|b| b.is_ascii_digit())
        && fractional.bytes().all(|b| b.is_ascii_digit())
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(value) => write!(f, "{}", value),
            Scalar::Float(value) => write!(f, "{}", value),
            Scalar::Bool(value) => write!(f, "{}", value),
            Scalar::Timestamp(value) => write!(f, "{}", value),
            Scalar::Text(value) => write!(f, "{}", value),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One imported row: an ordered mapping from header name to scalar.
///
/// Insertion order is preserved for deterministic bulk payloads. Populated
/// fields never exceed the declared header count, and empty cells are omitted
/// rather than stored as empty strings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record that can hold `headers` fields without growing
    pub fn with_capacity(headers: usize) -> Self {
        Self {
            fields: Vec::with_capacity(headers),
        }
    }

    /// Append a field; headers are unique per import, so no lookup is done.
    pub fn insert(&mut self, header: impl Into<String>, value: Scalar) {
        self.fields.push((header.into(), value));
    }

    /// Look up a field by header name
    pub fn get(&self, header: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value)
    }

    /// Number of populated fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &(String, Scalar)> {
        self.fields.iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

// ============================================================================
// Import Value Objects
// ============================================================================

/// Default mapping name used when the caller leaves the mapping blank
pub const DEFAULT_MAPPING: &str = "default";

/// Everything the pipeline needs to run one import.
///
/// Created once per invocation by the front end (upload handler or command
/// line) and owned exclusively by the pipeline for the import's duration.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// File on disk to be parsed; never read into memory as a whole
    pub path: std::path::PathBuf,

    /// The original name of the uploaded file; selects the parser by extension
    pub file_name: String,

    /// Target index to import into
    pub index: String,

    /// Type-mapping name written into every bulk action header
    pub mapping: String,

    /// 1-based offset of the row carrying the column headers
    pub header_offset: u32,

    /// Delete the target index before importing
    pub clear_existing: bool,

    /// Routes progress events back to the right caller
    pub correlation_id: Uuid,
}

impl ImportRequest {
    /// Create a request with defaults: mapping `"default"`, header row 1,
    /// no pre-import clearing, fresh correlation id.
    pub fn new(
        path: impl Into<std::path::PathBuf>,
        file_name: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            index: index.into(),
            mapping: DEFAULT_MAPPING.to_string(),
            header_offset: 1,
            clear_existing: false,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Set the mapping name; blank falls back to `"default"`.
    pub fn with_mapping(mut self, mapping: impl Into<String>) -> Self {
        let mapping = mapping.into();
        self.mapping = if mapping.trim().is_empty() {
            DEFAULT_MAPPING.to_string()
        } else {
            mapping
        };
        self
    }

    /// Set the 1-based header row offset
    pub fn with_header_offset(mut self, offset: u32) -> Self {
        self.header_offset = offset.max(1);
        self
    }

    /// Request deletion of the target index before the first batch
    pub fn with_clear_existing(mut self, clear: bool) -> Self {
        self.clear_existing = clear;
        self
    }
}

/// Progress of a running import, emitted after each batch response.
///
/// Ephemeral: pushed to the caller's progress channel and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Correlation id of the import this event belongs to
    pub correlation_id: Uuid,

    /// Completed percentage in `0.0..=100.0`
    pub percent: f32,

    /// Rows acknowledged by the indexing engine so far
    pub rows_submitted: usize,

    /// Total rows the import will submit
    pub rows_total: usize,
}

impl ProgressEvent {
    /// Build an event for `submitted` of `total` rows done.
    pub fn new(correlation_id: Uuid, submitted: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (submitted as f32 / total as f32) * 100.0
        };

        Self {
            correlation_id,
            percent,
            rows_submitted: submitted,
            rows_total: total,
        }
    }
}

/// Terminal result of a completed import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Correlation id of the finished import
    pub correlation_id: Uuid,

    /// Index the rows were written to
    pub index: String,

    /// Total rows written across all batches
    pub rows_written: usize,

    /// Number of bulk requests issued
    pub batches: usize,
}
