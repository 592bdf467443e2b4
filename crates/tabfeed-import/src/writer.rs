//! Batch submission engine
//!
//! Drives the pull protocol against a row source, folds records into
//! fixed-size bulk payloads and submits them to the indexing engine one at a
//! time. Single-flight discipline: a batch's HTTP round trip completes before
//! the next request opens, so bulk operations reach the index in file order.
//! Credit for the following batch is granted up front, so the producer keeps
//! tokenizing while the current payload is on the wire's near side.

use std::collections::VecDeque;

use tabfeed_common::types::{ImportRequest, ImportSummary, ProgressEvent, Record};
use tabfeed_common::{Result, TabfeedError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::elastic::ElasticClient;
use crate::source::{RowSink, RowSource, Subscription};

/// Records per bulk request. An engine constant, not user-configurable:
/// it also sizes the initial credit grant, and the single-flight prefetch
/// window depends on the two being the same number.
pub const MAX_BATCH: usize = 255;

/// Initial credit: two full batches minus one record, so the first batch can
/// be finalized and sent while the second batch's records keep arriving.
const INITIAL_CREDIT: usize = MAX_BATCH * 2 - 1;

/// Buffers records delivered under credit until the writer drains a batch.
#[derive(Default)]
struct BatchBuffer {
    queue: VecDeque<Record>,
    terminal: Option<Result<()>>,
}

impl RowSink for BatchBuffer {
    fn on_next(&mut self, record: Record) {
        self.queue.push_back(record);
    }

    fn on_complete(&mut self) {
        self.terminal = Some(Ok(()));
    }

    fn on_error(&mut self, error: TabfeedError) {
        self.terminal = Some(Err(error));
    }
}

/// Submits a validated row source to the indexing engine.
pub struct BulkWriter<'a> {
    client: &'a ElasticClient,
    progress: Option<&'a mpsc::Sender<ProgressEvent>>,
}

impl<'a> BulkWriter<'a> {
    pub fn new(client: &'a ElasticClient) -> Self {
        Self {
            client,
            progress: None,
        }
    }

    /// Emit a [`ProgressEvent`] on `channel` after every batch response.
    pub fn with_progress(mut self, channel: &'a mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(channel);
        self
    }

    /// Run one import to completion.
    ///
    /// Failures abort the remaining import; batches already acknowledged by
    /// the engine stay written (at-least-once, no cross-batch transaction).
    pub async fn import(
        &self,
        request: &ImportRequest,
        source: &mut dyn RowSource,
    ) -> Result<ImportSummary> {
        if request.clear_existing {
            self.client.delete_index(&request.index).await?;
        }

        let total = source.row_count();
        let mut subscription = Subscription::subscribe(source)?;
        let mut buffer = BatchBuffer::default();
        let mut submitted = 0usize;
        let mut batches = 0usize;

        subscription.request(INITIAL_CREDIT, &mut buffer);

        while submitted < total {
            if let Some(Err(error)) = buffer.terminal.take() {
                return Err(error);
            }

            let batch: Vec<Record> = {
                let take = MAX_BATCH.min(buffer.queue.len());
                buffer.queue.drain(..take).collect()
            };
            if batch.is_empty() {
                // the source delivered fewer rows than it counted.
                break;
            }

            let payload = bulk_payload(&request.index, &request.mapping, &batch)?;
            self.client.bulk(&request.index, payload).await?;

            submitted += batch.len();
            batches += 1;
            debug!(
                index = %request.index,
                batch = batches,
                submitted,
                total,
                "bulk batch acknowledged"
            );

            if let Some(channel) = self.progress {
                let event = ProgressEvent::new(request.correlation_id, submitted, total);
                // a gone consumer never fails the import.
                let _ = channel.send(event).await;
            }

            if submitted < total {
                subscription.request(MAX_BATCH, &mut buffer);
            }
        }

        subscription.cancel();
        info!(
            index = %request.index,
            rows = submitted,
            batches,
            "import complete"
        );

        Ok(ImportSummary {
            correlation_id: request.correlation_id,
            index: request.index.clone(),
            rows_written: submitted,
            batches,
        })
    }
}

/// Serialize one batch as the bulk API's alternating action/document lines.
///
/// Byte-exact contract: every line newline-terminated, no blank lines, the
/// final newline present.
fn bulk_payload(index: &str, mapping: &str, records: &[Record]) -> Result<String> {
    let action = serde_json::json!({ "index": { "_index": index, "_type": mapping } });
    let action_line = serde_json::to_string(&action)?;

    let mut payload = String::new();
    for record in records {
        payload.push_str(&action_line);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(record)?);
        payload.push('\n');
    }

    Ok(payload)
}
