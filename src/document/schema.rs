use crate::core::{FieldKind, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Wire field that carries a document's identity.
pub const ID_FIELD: &str = "_id";

/// Declared attribute of a document type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<Value>,
    pub unique: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            unique: false,
        }
    }

    /// Value materialized on freshly constructed documents.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field as carrying a unique index. The definition is handed to
    /// the wire client untouched.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Declared shape of a document: its name, collection and field set.
///
/// Types are shared behind `Arc` and compared structurally.
#[derive(Debug, Clone)]
pub struct DocumentType {
    name: String,
    collection: String,
    fields: Vec<FieldDef>,
    open: bool,
}

impl DocumentType {
    pub fn builder(name: impl Into<String>) -> DocumentTypeBuilder {
        DocumentTypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ordered set of declared fields.
    pub fn declared_fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Open types keep undeclared fields instead of rejecting or dropping them.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| field.unique)
    }

    /// Two types are the same when they agree on name, collection, declared
    /// fields and openness; sharing a name alone is not enough.
    pub fn same_type(&self, other: &DocumentType) -> bool {
        self.name == other.name
            && self.collection == other.collection
            && self.open == other.open
            && self.fields == other.fields
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.collection)
    }
}

impl PartialEq for DocumentType {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

pub struct DocumentTypeBuilder {
    name: String,
    collection: Option<String>,
    fields: Vec<FieldDef>,
    open: bool,
}

impl DocumentTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: Vec::new(),
            open: false,
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Declares a field. Redeclaring a name replaces the earlier definition in place.
    pub fn field(mut self, field: FieldDef) -> Self {
        match self.fields.iter_mut().find(|existing| existing.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn build(self) -> Arc<DocumentType> {
        let collection = self
            .collection
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()));
        Arc::new(DocumentType {
            name: self.name,
            collection,
            fields: self.fields,
            open: self.open,
        })
    }
}

/// Document identity, generated client-side before insertion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::Text(id.0)
    }
}

/// Handle naming the database facade a document was last persisted or loaded
/// through. Holding one does not keep the facade alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatabaseId(Uuid);

impl DatabaseId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
