//! Batched writes for one document type.
//!
//! A [`Bulk`] queues operations in memory and sends them as a single
//! [`WireClient::execute_batch`] call. Outcomes come back tagged with the
//! sequence index assigned at queue time and are matched to the originating
//! [`Document`] by that index, never by value.

pub mod result;

pub use result::{BulkResult, WriteError};

use crate::core::{DbError, Result};
use crate::document::{DatabaseId, Document, DocumentType};
use crate::serialize::{self, Fields};
use crate::wire::{OpOutcome, OpStatus, WireClient, WireOp, WireOptions};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Failure policy of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Stop at the first failed operation instead of attempting all of them.
    pub ordered: bool,
    /// Turn a result with write errors into `DbError::BulkWrite`.
    pub raise_on_errors: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            ordered: false,
            raise_on_errors: true,
        }
    }
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn raise_on_errors(mut self, raise_on_errors: bool) -> Self {
        self.raise_on_errors = raise_on_errors;
        self
    }
}

/// One queued unit of work.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BulkOperation {
    Insert { index: usize, document: Document },
}

impl BulkOperation {
    pub fn index(&self) -> usize {
        match self {
            Self::Insert { index, .. } => *index,
        }
    }

    pub fn document(&self) -> &Document {
        match self {
            Self::Insert { document, .. } => document,
        }
    }

    fn into_document(self) -> Document {
        match self {
            Self::Insert { document, .. } => document,
        }
    }

    fn to_wire(&self) -> WireOp {
        match self {
            Self::Insert { index, document } => WireOp::Insert {
                index: *index,
                record: serialize::to_wire(document, Fields::All),
            },
        }
    }
}

/// Write coordinator bound to a single document type.
///
/// Not meant to be shared between tasks; independent coordinators on the
/// same collection do not share state.
pub struct Bulk {
    doc_type: Arc<DocumentType>,
    options: BulkOptions,
    client: Arc<dyn WireClient>,
    wire_options: WireOptions,
    database: DatabaseId,
    queue: Vec<BulkOperation>,
}

impl Bulk {
    pub(crate) fn new(
        doc_type: Arc<DocumentType>,
        options: BulkOptions,
        client: Arc<dyn WireClient>,
        wire_options: WireOptions,
        database: DatabaseId,
    ) -> Self {
        Self {
            doc_type,
            options,
            client,
            wire_options,
            database,
            queue: Vec::new(),
        }
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        &self.doc_type
    }

    pub fn options(&self) -> BulkOptions {
        self.options
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> &[BulkOperation] {
        &self.queue
    }

    /// Queues an insert.
    ///
    /// Fails immediately, before any I/O, when `document` is not of the bound
    /// type. The document gets its identity here, whatever the batch outcome.
    pub fn insert(&mut self, mut document: Document) -> Result<()> {
        if !document.doc_type().same_type(&self.doc_type) {
            return Err(DbError::DocumentTypeMismatch {
                expected: self.doc_type.to_string(),
                found: document.doc_type().to_string(),
            });
        }

        document.ensure_id();
        let index = self.queue.len();
        self.queue.push(BulkOperation::Insert { index, document });
        Ok(())
    }

    /// Drops the pending queue without sending anything and hands the
    /// documents back.
    pub fn discard(&mut self) -> Vec<Document> {
        std::mem::take(&mut self.queue)
            .into_iter()
            .map(BulkOperation::into_document)
            .collect()
    }

    /// Sends the pending queue as one batch and reconciles the outcomes.
    ///
    /// The queue is consumed, so the next insert starts a fresh batch at
    /// index zero. On a transport failure the queue is left exactly as it
    /// was and the error is returned; nothing is guessed about operations the
    /// server may have applied.
    pub async fn execute(&mut self) -> Result<BulkResult> {
        if self.queue.is_empty() {
            return Ok(BulkResult::default());
        }

        let span = info_span!(
            "bulk.execute",
            collection = %self.doc_type.collection(),
            ordered = self.options.ordered,
            operations = self.queue.len()
        );
        self.execute_queue().instrument(span).await
    }

    async fn execute_queue(&mut self) -> Result<BulkResult> {
        let queue = std::mem::take(&mut self.queue);
        let ops = queue.iter().map(BulkOperation::to_wire).collect();

        let outcomes = match self
            .client
            .execute_batch(
                self.doc_type.collection(),
                ops,
                self.options.ordered,
                &self.wire_options,
            )
            .await
        {
            Ok(outcomes) => outcomes,
            Err(err) => {
                event!(Level::ERROR, error = %err, "bulk batch failed in transit");
                self.queue = queue;
                return Err(err);
            }
        };

        let result = reconcile(queue, outcomes, self.options.ordered, self.database);
        event!(
            Level::DEBUG,
            n_inserted = result.n_inserted,
            write_errors = result.write_errors.len(),
            unprocessed = result.unprocessed.len(),
            "bulk batch reconciled"
        );

        if self.options.raise_on_errors && !result.is_ok() {
            return Err(DbError::BulkWrite(Box::new(result)));
        }
        Ok(result)
    }
}

impl Drop for Bulk {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            event!(
                Level::WARN,
                collection = %self.doc_type.collection(),
                pending = self.queue.len(),
                "bulk dropped with unexecuted operations"
            );
        }
    }
}

/// Matches outcomes to queued documents by sequence index.
///
/// Successful documents are marked persisted; failed ones keep their dirty
/// state. Once an ordered batch has reported a failure any further outcome is
/// ignored. Documents without an outcome end up in `unprocessed`.
fn reconcile(
    queue: Vec<BulkOperation>,
    outcomes: Vec<OpOutcome>,
    ordered: bool,
    database: DatabaseId,
) -> BulkResult {
    let mut slots: Vec<Option<Document>> = queue
        .into_iter()
        .map(|op| Some(op.into_document()))
        .collect();
    let mut result = BulkResult::default();

    for outcome in outcomes {
        if ordered && !result.write_errors.is_empty() {
            event!(
                Level::WARN,
                index = outcome.index,
                "ignoring outcome reported after ordered batch stopped"
            );
            continue;
        }
        let Some(mut document) = slots.get_mut(outcome.index).and_then(Option::take) else {
            event!(
                Level::WARN,
                index = outcome.index,
                "ignoring outcome for unknown or already reconciled operation"
            );
            continue;
        };

        match outcome.status {
            OpStatus::Ok => {
                document.mark_persisted(database);
                result.n_inserted += 1;
                result.inserted.push(document);
            }
            OpStatus::Failed(failure) => result.write_errors.push(WriteError {
                index: outcome.index,
                code: failure.code,
                message: failure.message,
                document,
            }),
        }
    }

    result.unprocessed = slots.into_iter().flatten().collect();
    result
}
