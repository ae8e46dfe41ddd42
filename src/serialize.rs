//! Conversion between [`Document`] instances and wire records.
//!
//! `to_wire` emits only values the document actually holds, so unset fields
//! never reach the wire as `null`. `from_wire` decodes declared fields through
//! their [`FieldKind`](crate::core::FieldKind); undeclared wire fields are kept
//! as-is on open types and dropped on closed ones.

use crate::core::{DbError, Record, Result, Value};
use crate::document::{Document, DocumentId, DocumentType, ID_FIELD};
use std::sync::Arc;
use tracing::{Level, event};

/// Which of a document's fields to put into a wire record.
#[derive(Debug, Clone, Copy)]
pub enum Fields<'a> {
    /// Every held value plus the identity field.
    All,
    /// Only values assigned since the last persistence.
    Changed,
    /// An explicit subset. Names without a value are skipped.
    Only(&'a [&'a str]),
}

pub fn to_wire(document: &Document, fields: Fields<'_>) -> Record {
    let values = document.values();
    match fields {
        Fields::All => {
            let mut record = values.clone();
            if let Some(id) = document.id() {
                record.insert(ID_FIELD.to_string(), id.clone().into());
            }
            record
        }
        Fields::Changed => document
            .changed_fields()
            .iter()
            .filter_map(|name| values.get(name).map(|value| (name.clone(), value.clone())))
            .collect(),
        Fields::Only(names) => names
            .iter()
            .filter_map(|name| {
                values
                    .get(*name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect(),
    }
}

/// Builds a clean document from a wire record.
pub fn from_wire(doc_type: Arc<DocumentType>, mut record: Record) -> Result<Document> {
    let id = take_id(&mut record)?;
    let values = decode_values(&doc_type, record)?;
    Ok(Document::from_parts(doc_type, id, values))
}

/// Replaces a document's values in place from a freshly loaded record.
/// Identity is preserved and the change set is cleared.
pub(crate) fn refresh_from_wire(document: &mut Document, mut record: Record) -> Result<()> {
    if let Some(id) = take_id(&mut record)? {
        document.assign_id(id)?;
    }
    let values = decode_values(document.doc_type(), record)?;
    document.replace_values(values);
    Ok(())
}

/// Decodes one wire field for `doc_type`. `Ok(None)` means the field is
/// undeclared on a closed type and is dropped.
pub(crate) fn decode_field(doc_type: &DocumentType, name: &str, value: Value) -> Result<Option<Value>> {
    match doc_type.field(name) {
        Some(field) => field.kind.coerce(value).map(Some).map_err(|err| {
            DbError::TypeMismatch(format!("{}.{}: {}", doc_type.name(), name, err))
        }),
        None if doc_type.is_open() => Ok(Some(value)),
        None => {
            event!(
                Level::DEBUG,
                document = %doc_type.name(),
                field = %name,
                "dropping undeclared wire field"
            );
            Ok(None)
        }
    }
}

fn decode_values(doc_type: &DocumentType, record: Record) -> Result<Record> {
    let mut values = Record::new();
    for (name, value) in record {
        if let Some(value) = decode_field(doc_type, &name, value)? {
            values.insert(name, value);
        }
    }
    Ok(values)
}

fn take_id(record: &mut Record) -> Result<Option<DocumentId>> {
    match record.remove(ID_FIELD) {
        None => Ok(None),
        Some(Value::Text(id)) => Ok(Some(DocumentId::new(id))),
        Some(other) => Err(DbError::TypeMismatch(format!(
            "{} must be TEXT, got {}",
            ID_FIELD,
            other.type_name()
        ))),
    }
}

/// Renders a record as JSON.
pub fn record_to_json(record: &Record) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Parses a JSON object into a record.
pub fn record_from_json(json: &str) -> Result<Record> {
    Ok(serde_json::from_str(json)?)
}
