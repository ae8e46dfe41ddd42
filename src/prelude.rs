//! Everything application code usually needs in one import.
//!
//! Wire-level plumbing (`WireOp`, `OpOutcome`, ...) stays out; implementors of
//! a custom [`WireClient`](crate::wire::WireClient) import it from `docmap::wire`.

pub use crate::bulk::{Bulk, BulkOptions, BulkResult, WriteError};
pub use crate::connection::{DatabaseConfig, ReadPreference};
pub use crate::core::{DbError, FieldKind, Record, Result, Value};
pub use crate::document::{Document, DocumentId, DocumentType, FieldDef};
pub use crate::facade::Database;
pub use crate::update::UpdateSpec;
pub use crate::wire::{MemoryWireClient, WireClient};
