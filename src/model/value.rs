//! Feature values.

use crate::base::{ElementId, Uri};
use std::sync::Arc;

/// The value of a feature slot, or an old/new value carried by a notification.
///
/// Many-valued features always hold a [`Value::List`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(Arc<str>),
    Object(ElementId),
    Uri(Uri),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ElementId> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uri(&self) -> Option<&Uri> {
        match self {
            Value::Uri(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// List items; a scalar is viewed as an empty list.
    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            _ => &[],
        }
    }

    /// Objects referenced by this value, whether scalar or list.
    pub fn objects(&self) -> impl Iterator<Item = &ElementId> {
        let (single, many) = match self {
            Value::Object(id) => (Some(id), &[][..]),
            Value::List(items) => (None, items.as_slice()),
            _ => (None, &[][..]),
        };
        single
            .into_iter()
            .chain(many.iter().filter_map(Value::as_object))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v.into())
    }
}

impl From<ElementId> for Value {
    fn from(v: ElementId) -> Self {
        Value::Object(v)
    }
}

impl From<&ElementId> for Value {
    fn from(v: &ElementId) -> Self {
        Value::Object(v.clone())
    }
}

impl From<Uri> for Value {
    fn from(v: Uri) -> Self {
        Value::Uri(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_iterates_scalars_and_lists() {
        let a = ElementId::new("a");
        let b = ElementId::new("b");
        let list = Value::List(vec![Value::from(&a), Value::from(3i64), Value::from(&b)]);
        let ids: Vec<_> = list.objects().cloned().collect();
        assert_eq!(ids, vec![a.clone(), b]);
        assert_eq!(Value::from(&a).objects().count(), 1);
        assert_eq!(Value::from("x").objects().count(), 0);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<bool>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
    }
}
