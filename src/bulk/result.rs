use crate::document::Document;

/// A server-rejected operation paired with the document it came from.
#[derive(Debug, Clone)]
pub struct WriteError {
    /// Sequence index of the operation within its batch.
    pub index: usize,
    pub code: i32,
    pub message: String,
    pub document: Document,
}

/// Outcome of executing one batch.
///
/// Documents travel back to the caller: persisted ones in `inserted`,
/// rejected ones inside `write_errors`, and ones an ordered batch never
/// reached in `unprocessed`. The last group is neither a success nor an error.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub n_inserted: usize,
    pub inserted: Vec<Document>,
    pub write_errors: Vec<WriteError>,
    pub unprocessed: Vec<Document>,
}

impl BulkResult {
    /// `true` when no write errors occurred.
    pub fn is_ok(&self) -> bool {
        self.write_errors.is_empty()
    }

    /// Number of operations the batch carried.
    pub fn total(&self) -> usize {
        self.inserted.len() + self.write_errors.len() + self.unprocessed.len()
    }

    pub fn first_error(&self) -> Option<&WriteError> {
        self.write_errors.first()
    }
}

impl From<&BulkResult> for bool {
    fn from(result: &BulkResult) -> Self {
        result.is_ok()
    }
}
