use super::{DbError, Result, Value};
use std::fmt;

/// Wire codec of a declared document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Boolean,
    List(Box<FieldKind>),
    Object,
    Any,
}

impl FieldKind {
    pub fn list(inner: FieldKind) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Any, _) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true, // Integer -> Float widening
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            (Self::List(inner), Value::Array(items)) => {
                items.iter().all(|item| inner.is_compatible(item))
            }
            _ => false,
        }
    }

    /// Validates `value` against this kind and returns its canonical form.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (Self::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (Self::Integer, Value::Float(f)) if Value::Float(f).as_i64().is_some() => {
                Ok(Value::Integer(f as i64))
            }
            (Self::List(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| inner.coerce(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (kind, value) if kind.is_compatible(&value) => Ok(value),
            (kind, value) => Err(DbError::TypeMismatch(format!(
                "expected {}, got {}",
                kind,
                value.type_name()
            ))),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::List(inner) => write!(f, "LIST<{}>", inner),
            Self::Object => write!(f, "OBJECT"),
            Self::Any => write!(f, "ANY"),
        }
    }
}
