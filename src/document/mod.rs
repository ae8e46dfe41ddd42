pub mod schema;
pub mod tracker;

pub use schema::{DatabaseId, DocumentId, DocumentType, DocumentTypeBuilder, FieldDef, ID_FIELD};
pub use tracker::Document;
