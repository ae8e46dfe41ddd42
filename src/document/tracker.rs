use super::schema::{DatabaseId, DocumentId, DocumentType, ID_FIELD};
use crate::core::{DbError, Record, Result, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A typed, identity-bearing entity that records which attributes were set or
/// removed since it was last persisted or loaded.
///
/// Mutation goes through [`Document::set`] and [`Document::unset`]; both keep
/// the change set in step so partial updates only touch what moved. A removed
/// attribute is absent from [`Document::values`], never stored as `Null`.
#[derive(Debug, Clone)]
pub struct Document {
    doc_type: Arc<DocumentType>,
    id: Option<DocumentId>,
    values: Record,
    changed: BTreeSet<String>,
    unset: BTreeSet<String>,
    database: Option<DatabaseId>,
}

impl Document {
    /// Creates an unpersisted document with declared defaults materialized.
    pub fn new(doc_type: Arc<DocumentType>) -> Self {
        let values = doc_type
            .declared_fields()
            .iter()
            .filter_map(|field| {
                field
                    .default
                    .clone()
                    .map(|value| (field.name.clone(), value))
            })
            .collect();

        Self {
            doc_type,
            id: None,
            values,
            changed: BTreeSet::new(),
            unset: BTreeSet::new(),
            database: None,
        }
    }

    /// Assembles a clean, unbound document from already decoded parts.
    pub(crate) fn from_parts(
        doc_type: Arc<DocumentType>,
        id: Option<DocumentId>,
        values: Record,
    ) -> Self {
        Self {
            doc_type,
            id,
            values,
            changed: BTreeSet::new(),
            unset: BTreeSet::new(),
            database: None,
        }
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        &self.doc_type
    }

    pub fn type_name(&self) -> &str {
        self.doc_type.name()
    }

    pub fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }

    /// Assigns the identity. Identity is immutable once set; re-assigning the
    /// same id is accepted.
    pub fn assign_id(&mut self, id: DocumentId) -> Result<()> {
        match &self.id {
            Some(current) if *current != id => {
                Err(DbError::IdentityAlreadyAssigned(current.to_string()))
            }
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Returns the identity, generating one client-side when missing.
    pub fn ensure_id(&mut self) -> &DocumentId {
        self.id.get_or_insert_with(DocumentId::generate)
    }

    pub(crate) fn require_id(&self) -> Result<&DocumentId> {
        self.id.as_ref().ok_or(DbError::MissingIdentity)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn values(&self) -> &Record {
        &self.values
    }

    /// Assigns an attribute and records it as changed.
    ///
    /// Declared fields are coerced through their kind; undeclared names are
    /// rejected unless the document type is open.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if name == ID_FIELD {
            return Err(self.unknown_field(name));
        }
        let value = match self.doc_type.field(&name) {
            Some(field) => field.kind.coerce(value.into()).map_err(|err| {
                DbError::TypeMismatch(format!("{}.{}: {}", self.doc_type.name(), name, err))
            })?,
            None if self.doc_type.is_open() => value.into(),
            None => return Err(self.unknown_field(name)),
        };

        self.unset.remove(&name);
        self.changed.insert(name.clone());
        self.values.insert(name, value);
        Ok(())
    }

    /// Removes an attribute. The removal is recorded separately from value
    /// changes so a partial update can unset it server-side.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.changed.remove(name);
        self.unset.insert(name.to_string());
        self.values.remove(name)
    }

    /// Names assigned since the last persistence or load.
    pub fn changed_fields(&self) -> &BTreeSet<String> {
        &self.changed
    }

    /// Names removed since the last persistence or load.
    pub fn unset_fields(&self) -> &BTreeSet<String> {
        &self.unset
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty() || !self.unset.is_empty()
    }

    pub fn clear_changed(&mut self) {
        self.changed.clear();
        self.unset.clear();
    }

    /// Database facade this document was last persisted or loaded through.
    pub fn database(&self) -> Option<DatabaseId> {
        self.database
    }

    pub fn is_persisted(&self) -> bool {
        self.database.is_some() && self.id.is_some()
    }

    pub(crate) fn mark_persisted(&mut self, database: DatabaseId) {
        self.clear_changed();
        self.database = Some(database);
    }

    pub(crate) fn detach(&mut self) {
        self.database = None;
    }

    /// Replaces every value with a freshly loaded set; identity is kept.
    pub(crate) fn replace_values(&mut self, values: Record) {
        self.values = values;
        self.clear_changed();
    }

    /// Stores a server-confirmed value without marking it dirty.
    pub(crate) fn apply_persisted(&mut self, name: &str, value: Value) {
        self.changed.remove(name);
        self.unset.remove(name);
        self.values.insert(name.to_string(), value);
    }

    /// Drops a field the server confirmed as absent.
    pub(crate) fn forget_persisted(&mut self, name: &str) {
        self.changed.remove(name);
        self.unset.remove(name);
        self.values.remove(name);
    }

    fn unknown_field(&self, field: String) -> DbError {
        DbError::UnknownField {
            document: self.doc_type.name().to_string(),
            field,
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.doc_type.same_type(&other.doc_type)
            && self.id == other.id
            && self.values == other.values
    }
}
