use crate::bulk::BulkResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Document type mismatch: expected '{expected}', got '{found}'")]
    DocumentTypeMismatch { expected: String, found: String },

    #[error("Field '{field}' is not declared on document '{document}'")]
    UnknownField { document: String, field: String },

    #[error("Document has no identity")]
    MissingIdentity,

    #[error("Document identity already assigned: {0}")]
    IdentityAlreadyAssigned(String),

    #[error("Document '{id}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    #[error("Write error {code}: {message}")]
    Write { code: i32, message: String },

    #[error(
        "Bulk write error: {} write error(s), {} inserted",
        .0.write_errors.len(),
        .0.n_inserted
    )]
    BulkWrite(Box<BulkResult>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Errors caused by calling the API incorrectly rather than by the database.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DocumentTypeMismatch { .. }
                | Self::UnknownField { .. }
                | Self::MissingIdentity
                | Self::IdentityAlreadyAssigned(_)
        )
    }

    /// The full result carried by a bulk write error.
    pub fn bulk_result(&self) -> Option<&BulkResult> {
        match self {
            Self::BulkWrite(result) => Some(&**result),
            _ => None,
        }
    }

    pub fn into_bulk_result(self) -> Option<BulkResult> {
        match self {
            Self::BulkWrite(result) => Some(*result),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
