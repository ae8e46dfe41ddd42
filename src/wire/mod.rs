//! Contract with the low-level client that talks to the document database.
//!
//! The core never opens connections itself: every round trip goes through a
//! [`WireClient`]. [`MemoryWireClient`] is a complete in-process
//! implementation with unique indexes and ordered/unordered batches.

pub mod memory;

use crate::connection::{DatabaseConfig, ReadPreference};
use crate::core::{DbError, Record, Result};
use crate::document::DocumentId;
use crate::update::UpdateSpec;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryWireClient;

/// Server error code for a unique index violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Per-call options forwarded to the wire client without interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireOptions {
    pub read_preference: ReadPreference,
    pub write_timeout: Option<Duration>,
}

impl From<&DatabaseConfig> for WireOptions {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            read_preference: config.read_preference,
            write_timeout: config.write_timeout_duration(),
        }
    }
}

/// One write in a batch, tagged with the coordinator's sequence index.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum WireOp {
    Insert { index: usize, record: Record },
}

impl WireOp {
    pub fn index(&self) -> usize {
        match self {
            Self::Insert { index, .. } => *index,
        }
    }
}

/// Server-reported rejection of a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub code: i32,
    pub message: String,
}

impl From<WriteFailure> for DbError {
    fn from(failure: WriteFailure) -> Self {
        DbError::Write {
            code: failure.code,
            message: failure.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    Failed(WriteFailure),
}

/// Outcome of one attempted operation, keyed by its sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub index: usize,
    pub status: OpStatus,
}

impl OpOutcome {
    pub fn ok(index: usize) -> Self {
        Self {
            index,
            status: OpStatus::Ok,
        }
    }

    pub fn failed(index: usize, code: i32, message: impl Into<String>) -> Self {
        Self {
            index,
            status: OpStatus::Failed(WriteFailure {
                code,
                message: message.into(),
            }),
        }
    }
}

#[async_trait]
pub trait WireClient: Send + Sync {
    /// Executes `ops` as one batch.
    ///
    /// Returns one outcome per *attempted* operation in execution order. An
    /// ordered batch stops after its first failure; later operations get no
    /// outcome. `Err` means the batch as a whole failed in transit.
    async fn execute_batch(
        &self,
        collection: &str,
        ops: Vec<WireOp>,
        ordered: bool,
        options: &WireOptions,
    ) -> Result<Vec<OpOutcome>>;

    async fn find_one(
        &self,
        collection: &str,
        id: &DocumentId,
        options: &WireOptions,
    ) -> Result<Option<Record>>;

    /// Inserts one record. A rejected write is reported as `DbError::Write`.
    async fn insert_one(&self, collection: &str, record: Record, options: &WireOptions)
    -> Result<()>;

    /// Replaces the stored record with `record` exactly, inserting it when absent.
    async fn replace_one(
        &self,
        collection: &str,
        id: &DocumentId,
        record: Record,
        options: &WireOptions,
    ) -> Result<()>;

    /// Applies `update` atomically and returns the record as stored afterwards.
    async fn update_one(
        &self,
        collection: &str,
        id: &DocumentId,
        update: &UpdateSpec,
        options: &WireOptions,
    ) -> Result<Record>;

    /// Deletes by identity; returns whether a record was removed.
    async fn remove(&self, collection: &str, id: &DocumentId, options: &WireOptions)
    -> Result<bool>;

    async fn count(&self, collection: &str, options: &WireOptions) -> Result<usize>;

    async fn ensure_unique_index(
        &self,
        collection: &str,
        field: &str,
        options: &WireOptions,
    ) -> Result<()>;
}
