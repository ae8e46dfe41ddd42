// ============================================================================
// docmap: object-document mapping over a pluggable wire client
// ============================================================================

//! Maps typed documents to wire records, tracks field-level changes so saves
//! only touch what moved, and batches inserts with ordered/unordered and
//! raise/collect error semantics.
//!
//! # Examples
//!
//! ```
//! use docmap::{Database, DatabaseConfig, Document, DocumentType, FieldDef, FieldKind, MemoryWireClient};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> docmap::Result<()> {
//! let article = DocumentType::builder("Article")
//!     .field(FieldDef::new("title", FieldKind::Text))
//!     .field(FieldDef::new("views", FieldKind::Integer).default(0))
//!     .build();
//!
//! let db = Database::new(Arc::new(MemoryWireClient::new()), DatabaseConfig::new("blog"))?;
//!
//! let mut doc = Document::new(article.clone());
//! doc.set("title", "Hello")?;
//! db.insert(&mut doc).await?;
//! assert!(!doc.is_changed());
//!
//! let mut bulk = db.bulk(&article);
//! for title in ["a", "b", "c"] {
//!     let mut doc = Document::new(article.clone());
//!     doc.set("title", title)?;
//!     bulk.insert(doc)?;
//! }
//! let result = bulk.execute().await?;
//! assert_eq!(result.n_inserted, 3);
//! assert_eq!(db.count(&article).await?, 4);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod connection;
pub mod core;
pub mod document;
pub mod facade;
pub mod prelude;
pub mod serialize;
pub mod update;
pub mod wire;

pub use crate::bulk::{Bulk, BulkOperation, BulkOptions, BulkResult, WriteError};
pub use crate::connection::{DatabaseConfig, ReadPreference};
pub use crate::core::{DbError, FieldKind, Record, Result, Value};
pub use crate::document::{DatabaseId, Document, DocumentId, DocumentType, FieldDef, ID_FIELD};
pub use crate::facade::Database;
pub use crate::serialize::{Fields, from_wire, to_wire};
pub use crate::update::{UnsetFields, UpdateSpec};
pub use crate::wire::{MemoryWireClient, OpOutcome, OpStatus, WireClient, WireOp, WireOptions, WriteFailure};
