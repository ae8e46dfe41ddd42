pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::FieldKind;
pub use value::{Record, Value};
