//! Streaming tabular imports into Elasticsearch
//!
//! Takes a CSV or Excel file, validates its structure in a dry run, then
//! streams typed records to the bulk API in fixed-size batches under a
//! credit-based pull protocol. Memory stays bounded by the outstanding credit
//! and the mapped page window, never by the size of the file.
//!
//! # Pipeline
//!
//! ```text
//! file ──▶ ParserRegistry ──▶ RowSource ──▶ Subscription ──▶ BulkWriter ──▶ _bulk
//!              (by ext)        (validate)      (credit)       (batches)
//! ```
//!
//! [`run_import`] wires the stages together; the modules are usable on their
//! own when a caller wants only parsing or only submission.

pub mod elastic;
pub mod source;
pub mod writer;

pub use elastic::{ClusterMonitor, ClusterStatus, ElasticClient};
pub use source::{ParserRegistry, RowSource};
pub use writer::BulkWriter;

use tabfeed_common::types::{ImportRequest, ImportSummary, ProgressEvent};
use tabfeed_common::Result;
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// Run one import end to end: select a parser, validate the file, stream its
/// rows to the indexing engine in batches.
///
/// Validation runs before any write traffic, so a structurally broken file
/// fails without touching the target index. The source's file handles are
/// released on every exit path, success or not.
#[instrument(skip(registry, client, progress), fields(file = %request.file_name, index = %request.index))]
pub async fn run_import(
    registry: &ParserRegistry,
    client: &ElasticClient,
    request: &ImportRequest,
    progress: Option<&mpsc::Sender<ProgressEvent>>,
) -> Result<ImportSummary> {
    let mut source = registry.open_for(request)?;

    if let Err(error) = source.validate() {
        source.release();
        return Err(error);
    }
    info!(rows = source.row_count(), "file validated");

    let mut writer = BulkWriter::new(client);
    if let Some(channel) = progress {
        writer = writer.with_progress(channel);
    }

    let outcome = writer.import(request, source.as_mut()).await;
    source.release();
    outcome
}
