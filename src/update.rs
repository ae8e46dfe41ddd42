use crate::core::{DbError, FieldKind, Record, Result, Value};
use crate::document::{DocumentType, ID_FIELD};
use std::collections::{BTreeMap, BTreeSet};

/// Field names to remove in an update.
///
/// Built either from a sequence of names or from a mapping whose keys are the
/// names; mapped values are ignored, so both call conventions are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsetFields(BTreeSet<String>);

impl UnsetFields {
    pub fn names(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl From<Vec<&str>> for UnsetFields {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for UnsetFields {
    fn from(names: Vec<String>) -> Self {
        Self(names.into_iter().collect())
    }
}

impl From<&[&str]> for UnsetFields {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for UnsetFields {
    fn from(names: [&str; N]) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<BTreeSet<String>> for UnsetFields {
    fn from(names: BTreeSet<String>) -> Self {
        Self(names)
    }
}

impl<V> From<BTreeMap<String, V>> for UnsetFields {
    fn from(mapping: BTreeMap<String, V>) -> Self {
        Self(mapping.into_keys().collect())
    }
}

/// One atomic partial update: assign, remove, increment, append to and
/// remove-by-value from fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    set: Record,
    unset: BTreeSet<String>,
    inc: Record,
    push: Record,
    pull: Record,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    /// Merges a whole record into the `set` clause.
    pub fn set_all(mut self, record: Record) -> Self {
        self.set.extend(record);
        self
    }

    pub fn unset(mut self, fields: impl Into<UnsetFields>) -> Self {
        self.unset.extend(fields.into().0);
        self
    }

    pub fn inc(mut self, name: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.inc.insert(name.into(), amount.into());
        self
    }

    pub fn push(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.insert(name.into(), value.into());
        self
    }

    pub fn pull(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pull.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
            && self.push.is_empty()
            && self.pull.is_empty()
    }

    pub fn unset_fields(&self) -> &BTreeSet<String> {
        &self.unset
    }

    /// Fields whose value the update assigns or modifies (excluding removals).
    pub fn touched_fields(&self) -> BTreeSet<&str> {
        self.set
            .keys()
            .chain(self.inc.keys())
            .chain(self.push.keys())
            .chain(self.pull.keys())
            .map(String::as_str)
            .collect()
    }

    /// Operator-keyed form (`$set`, `$unset`, ...) of the update, `None` when
    /// nothing is queued.
    pub fn to_query(&self) -> Option<Record> {
        let mut query = Record::new();
        if !self.set.is_empty() {
            query.insert("$set".to_string(), Value::Object(self.set.clone()));
        }
        if !self.unset.is_empty() {
            let unset = self
                .unset
                .iter()
                .map(|name| (name.clone(), Value::Boolean(true)))
                .collect();
            query.insert("$unset".to_string(), Value::Object(unset));
        }
        if !self.inc.is_empty() {
            query.insert("$inc".to_string(), Value::Object(self.inc.clone()));
        }
        if !self.push.is_empty() {
            query.insert("$push".to_string(), Value::Object(self.push.clone()));
        }
        if !self.pull.is_empty() {
            query.insert("$pull".to_string(), Value::Object(self.pull.clone()));
        }
        (!query.is_empty()).then_some(query)
    }

    /// Checks every clause against `doc_type` and returns the update with its
    /// values in their fields' canonical kind.
    ///
    /// Undeclared names and the identity field are rejected unless the type
    /// is open. `$inc` needs a numeric field and amount; `$push` and `$pull`
    /// need a list field and a value of its element kind.
    pub fn checked_for(self, doc_type: &DocumentType) -> Result<Self> {
        let Self {
            set,
            unset,
            inc,
            push,
            pull,
        } = self;
        for name in &unset {
            declared_kind(doc_type, name)?;
        }

        Ok(Self {
            set: coerce_clause(doc_type, set, FieldKind::coerce)?,
            unset,
            inc: coerce_clause(doc_type, inc, coerce_amount)?,
            push: coerce_clause(doc_type, push, coerce_element)?,
            pull: coerce_clause(doc_type, pull, coerce_element)?,
        })
    }

    /// Applies every clause to `record`. The record is left untouched when any
    /// clause fails.
    pub fn apply_to(&self, record: &mut Record) -> Result<()> {
        let mut updated = record.clone();

        for (name, value) in &self.set {
            updated.insert(name.clone(), value.clone());
        }
        for name in &self.unset {
            updated.remove(name);
        }
        for (name, amount) in &self.inc {
            let current = updated.get(name).cloned().unwrap_or(Value::Integer(0));
            let sum = current.checked_add(amount).ok_or_else(|| {
                DbError::TypeMismatch(format!(
                    "cannot apply $inc to '{}' of type {} with {}",
                    name,
                    current.type_name(),
                    amount.type_name()
                ))
            })?;
            updated.insert(name.clone(), sum);
        }
        for (name, value) in &self.push {
            match updated.entry(name.clone()).or_insert_with(|| Value::Array(Vec::new())) {
                Value::Array(items) => items.push(value.clone()),
                other => {
                    return Err(DbError::TypeMismatch(format!(
                        "cannot apply $push to non-array field '{}' of type {}",
                        name,
                        other.type_name()
                    )));
                }
            }
        }
        for (name, value) in &self.pull {
            match updated.get_mut(name) {
                None => {}
                Some(Value::Array(items)) => items.retain(|item| item != value),
                Some(other) => {
                    return Err(DbError::TypeMismatch(format!(
                        "cannot apply $pull to non-array field '{}' of type {}",
                        name,
                        other.type_name()
                    )));
                }
            }
        }

        *record = updated;
        Ok(())
    }
}

/// Kind of a field an update may touch; `None` for undeclared names on open types.
fn declared_kind<'a>(doc_type: &'a DocumentType, name: &str) -> Result<Option<&'a FieldKind>> {
    let unknown = || DbError::UnknownField {
        document: doc_type.name().to_string(),
        field: name.to_string(),
    };
    if name == ID_FIELD {
        return Err(unknown());
    }
    match doc_type.field(name) {
        Some(field) => Ok(Some(&field.kind)),
        None if doc_type.is_open() => Ok(None),
        None => Err(unknown()),
    }
}

fn coerce_clause<F>(doc_type: &DocumentType, clause: Record, coerce: F) -> Result<Record>
where
    F: Fn(&FieldKind, Value) -> Result<Value>,
{
    let mut checked = Record::new();
    for (name, value) in clause {
        let value = match declared_kind(doc_type, &name)? {
            Some(kind) => coerce(kind, value).map_err(|err| {
                DbError::TypeMismatch(format!("{}.{}: {}", doc_type.name(), name, err))
            })?,
            None => value,
        };
        checked.insert(name, value);
    }
    Ok(checked)
}

fn coerce_amount(kind: &FieldKind, amount: Value) -> Result<Value> {
    if !amount.is_numeric() {
        return Err(DbError::TypeMismatch(format!(
            "$inc amount must be numeric, got {}",
            amount.type_name()
        )));
    }
    match kind {
        FieldKind::Any => Ok(amount),
        FieldKind::Integer | FieldKind::Float => kind.coerce(amount),
        other => Err(DbError::TypeMismatch(format!(
            "$inc needs a numeric field, found {}",
            other
        ))),
    }
}

fn coerce_element(kind: &FieldKind, value: Value) -> Result<Value> {
    match kind {
        FieldKind::List(inner) => inner.coerce(value),
        FieldKind::Any => Ok(value),
        other => Err(DbError::TypeMismatch(format!(
            "expected a LIST field, found {}",
            other
        ))),
    }
}
