//! Lazy row sources and the pull protocol
//!
//! Every parser implements [`RowSource`]: a stateful reader bound to exactly
//! one file, with a validate-then-stream lifecycle. The [`Subscription`] on
//! top enforces the credit contract between a source and its consumer: the
//! consumer grants credit with `request(n, sink)`, the source delivers at most
//! `n` records before the call returns, and exactly one terminal signal
//! (complete or error) ends the stream. This caps in-memory records at the
//! outstanding credit regardless of file size.

use tabfeed_common::types::Record;
use tabfeed_common::{Result, TabfeedError};

pub mod delimited;
pub mod registry;
pub mod sheet;

pub use delimited::DelimitedParser;
pub use registry::ParserRegistry;
pub use sheet::SheetParser;

/// A lazy, pull-based source of records bound to one source file.
///
/// Lifecycle: construct (open) → [`validate`](RowSource::validate) →
/// subscribe via [`Subscription::subscribe`] → [`release`](RowSource::release).
/// Instances are never reused across imports.
pub trait RowSource: Send + std::fmt::Debug {
    /// Dry run: one full forward scan that derives headers, counts rows and
    /// replays every data row through the tokenizer without materializing
    /// records. Fails fast on the first structural error so no write traffic
    /// is ever produced for a file that would fail partway through.
    fn validate(&mut self) -> Result<()>;

    /// Number of data rows in the file; available after open.
    fn row_count(&self) -> usize;

    /// Reposition at the first data row.
    fn rewind(&mut self) -> Result<()>;

    /// Pull the next record in file order; `None` after the last row.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Release the underlying file handle / memory maps. Runs on every exit
    /// path; reading after release yields end-of-stream. `Drop` is the
    /// backstop for paths that never reach an explicit release.
    fn release(&mut self);
}

/// Consumer side of the pull protocol.
pub trait RowSink {
    /// One record delivered under outstanding credit.
    fn on_next(&mut self, record: Record);

    /// The stream finished; no further calls follow.
    fn on_complete(&mut self);

    /// The stream failed mid-parse; no further calls follow.
    fn on_error(&mut self, error: TabfeedError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionState {
    Active,
    Complete,
    Failed,
    Cancelled,
}

/// A credit-accounted subscription over a row source.
///
/// Delivery happens inside [`request`](Subscription::request): pulls are
/// bounded-duration synchronous reads, so the consumer interleaves them with
/// its own suspension points (the writer awaits each batch response between
/// grants). Terminal signals are emitted exactly once.
pub struct Subscription<'a> {
    source: &'a mut dyn RowSource,
    state: SubscriptionState,
    delivered: usize,
}

impl<'a> Subscription<'a> {
    /// Rewind the source to its first data row and start the stream.
    pub fn subscribe(source: &'a mut dyn RowSource) -> Result<Self> {
        source.rewind()?;
        Ok(Self {
            source,
            state: SubscriptionState::Active,
            delivered: 0,
        })
    }

    /// Grant credit for up to `credit` more records.
    ///
    /// At most `credit` `on_next` calls reach the sink before this returns.
    /// After a terminal signal the call is a no-op.
    pub fn request<S: RowSink>(&mut self, credit: usize, sink: &mut S) {
        for _ in 0..credit {
            if self.state != SubscriptionState::Active {
                return;
            }

            match self.source.next_record() {
                Ok(Some(record)) => {
                    self.delivered += 1;
                    sink.on_next(record);
                },
                Ok(None) => {
                    self.state = SubscriptionState::Complete;
                    sink.on_complete();
                },
                Err(error) => {
                    self.state = SubscriptionState::Failed;
                    sink.on_error(error);
                },
            }
        }
    }

    /// Advisory: stop producing. Correctness never depends on this being
    /// timely; a cancelled subscription simply delivers nothing further.
    pub fn cancel(&mut self) {
        if self.state == SubscriptionState::Active {
            self.state = SubscriptionState::Cancelled;
        }
    }

    /// Records delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// True once a terminal signal was emitted or the stream was cancelled.
    pub fn is_terminated(&self) -> bool {
        self.state != SubscriptionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfeed_common::types::Scalar;

    /// In-memory source for protocol tests.
    #[derive(Debug)]
    struct StubSource {
        rows: Vec<Record>,
        cursor: usize,
        fail_at: Option<usize>,
    }

    impl StubSource {
        fn with_rows(count: usize) -> Self {
            let rows = (0..count)
                .map(|i| {
                    let mut record = Record::new();
                    record.insert("n", Scalar::Int(i as i64));
                    record
                })
                .collect();
            Self {
                rows,
                cursor: 0,
                fail_at: None,
            }
        }
    }

    impl RowSource for StubSource {
        fn validate(&mut self) -> Result<()> {
            Ok(())
        }

        fn row_count(&self) -> usize {
            self.rows.len()
        }

        fn rewind(&mut self) -> Result<()> {
            self.cursor = 0;
            Ok(())
        }

        fn next_record(&mut self) -> Result<Option<Record>> {
            if Some(self.cursor) == self.fail_at {
                return Err(TabfeedError::ColumnsHeadersMismatch {
                    row: self.cursor as u64 + 1,
                    columns: 0,
                    headers: 1,
                });
            }
            let record = self.rows.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(record)
        }

        fn release(&mut self) {}
    }

    #[derive(Default)]
    struct CountingSink {
        delivered: usize,
        completions: usize,
        errors: usize,
    }

    impl RowSink for CountingSink {
        fn on_next(&mut self, _record: Record) {
            self.delivered += 1;
        }

        fn on_complete(&mut self) {
            self.completions += 1;
        }

        fn on_error(&mut self, _error: TabfeedError) {
            self.errors += 1;
        }
    }

    #[test]
    fn delivers_at_most_the_granted_credit() {
        let mut source = StubSource::with_rows(5);
        let mut sink = CountingSink::default();
        let mut subscription = Subscription::subscribe(&mut source).expect("subscribe");

        subscription.request(2, &mut sink);
        assert_eq!(sink.delivered, 2);
        assert_eq!(sink.completions, 0);

        subscription.request(2, &mut sink);
        assert_eq!(sink.delivered, 4);
        assert!(!subscription.is_terminated());
    }

    #[test]
    fn completes_exactly_once() {
        let mut source = StubSource::with_rows(3);
        let mut sink = CountingSink::default();
        let mut subscription = Subscription::subscribe(&mut source).expect("subscribe");

        subscription.request(10, &mut sink);
        assert_eq!(sink.delivered, 3);
        assert_eq!(sink.completions, 1);

        // further credit is a no-op after the terminal signal.
        subscription.request(10, &mut sink);
        assert_eq!(sink.delivered, 3);
        assert_eq!(sink.completions, 1);
        assert!(subscription.is_terminated());
    }

    #[test]
    fn errors_exactly_once_and_stops() {
        let mut source = StubSource::with_rows(5);
        source.fail_at = Some(2);
        let mut sink = CountingSink::default();
        let mut subscription = Subscription::subscribe(&mut source).expect("subscribe");

        subscription.request(10, &mut sink);
        assert_eq!(sink.delivered, 2);
        assert_eq!(sink.errors, 1);
        assert_eq!(sink.completions, 0);

        subscription.request(1, &mut sink);
        assert_eq!(sink.errors, 1);
    }

    #[test]
    fn cancel_stops_delivery() {
        let mut source = StubSource::with_rows(5);
        let mut sink = CountingSink::default();
        let mut subscription = Subscription::subscribe(&mut source).expect("subscribe");

        subscription.request(1, &mut sink);
        subscription.cancel();
        subscription.request(10, &mut sink);

        assert_eq!(sink.delivered, 1);
        assert_eq!(sink.completions, 0);
        assert_eq!(subscription.delivered(), 1);
    }
}
