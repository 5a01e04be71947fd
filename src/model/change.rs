//! Reversible elementary changes.
//!
//! Every mutation of the graph is expressed as one or more [`Change`]s.
//! Applying a change and then its [`Change::inverse`] leaves the graph as it
//! was, which is what undo, redo and abandon all rely on.

use super::object::ModelObject;
use super::schema::FeatureId;
use super::value::Value;
use crate::base::{ElementId, ResourceId, Uri};

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Insert an object into the arena (or replace its proxy).
    Create { object: ModelObject },
    /// Remove an object from the arena, leaving a proxy if asked to.
    Discard { object: ModelObject, proxy: bool },
    /// Replace a single-valued slot.
    Set {
        object: ElementId,
        feature: FeatureId,
        old: Value,
        new: Value,
        unset: bool,
    },
    Insert {
        object: ElementId,
        feature: FeatureId,
        index: usize,
        value: Value,
    },
    InsertMany {
        object: ElementId,
        feature: FeatureId,
        index: usize,
        values: Vec<Value>,
    },
    Remove {
        object: ElementId,
        feature: FeatureId,
        index: usize,
        value: Value,
    },
    /// Remove items at ascending `indices`.
    RemoveMany {
        object: ElementId,
        feature: FeatureId,
        indices: Vec<usize>,
        values: Vec<Value>,
    },
    /// Put items back at the ascending `indices` they were removed from.
    Restore {
        object: ElementId,
        feature: FeatureId,
        indices: Vec<usize>,
        values: Vec<Value>,
    },
    Move {
        object: ElementId,
        feature: FeatureId,
        from: usize,
        to: usize,
    },
    InsertRoot {
        resource: ResourceId,
        index: usize,
        object: ElementId,
    },
    RemoveRoot {
        resource: ResourceId,
        index: usize,
        object: ElementId,
    },
    /// Move an element between its container's unit (`None`) and its own unit.
    Partition {
        resource: ResourceId,
        element: ElementId,
        from: Option<Uri>,
        to: Option<Uri>,
    },
}

impl Change {
    pub fn inverse(&self) -> Change {
        match self {
            Change::Create { object } => Change::Discard {
                object: object.clone(),
                proxy: false,
            },
            Change::Discard { object, .. } => Change::Create {
                object: object.clone(),
            },
            Change::Set {
                object,
                feature,
                old,
                new,
                ..
            } => Change::Set {
                object: object.clone(),
                feature: *feature,
                old: new.clone(),
                new: old.clone(),
                unset: false,
            },
            Change::Insert {
                object,
                feature,
                index,
                value,
            } => Change::Remove {
                object: object.clone(),
                feature: *feature,
                index: *index,
                value: value.clone(),
            },
            Change::Remove {
                object,
                feature,
                index,
                value,
            } => Change::Insert {
                object: object.clone(),
                feature: *feature,
                index: *index,
                value: value.clone(),
            },
            Change::InsertMany {
                object,
                feature,
                index,
                values,
            } => Change::RemoveMany {
                object: object.clone(),
                feature: *feature,
                indices: (*index..*index + values.len()).collect(),
                values: values.clone(),
            },
            Change::RemoveMany {
                object,
                feature,
                indices,
                values,
            } => match contiguous_start(indices) {
                Some(index) => Change::InsertMany {
                    object: object.clone(),
                    feature: *feature,
                    index,
                    values: values.clone(),
                },
                None => Change::Restore {
                    object: object.clone(),
                    feature: *feature,
                    indices: indices.clone(),
                    values: values.clone(),
                },
            },
            Change::Restore {
                object,
                feature,
                indices,
                values,
            } => Change::RemoveMany {
                object: object.clone(),
                feature: *feature,
                indices: indices.clone(),
                values: values.clone(),
            },
            Change::Move {
                object,
                feature,
                from,
                to,
            } => Change::Move {
                object: object.clone(),
                feature: *feature,
                from: *to,
                to: *from,
            },
            Change::InsertRoot {
                resource,
                index,
                object,
            } => Change::RemoveRoot {
                resource: *resource,
                index: *index,
                object: object.clone(),
            },
            Change::RemoveRoot {
                resource,
                index,
                object,
            } => Change::InsertRoot {
                resource: *resource,
                index: *index,
                object: object.clone(),
            },
            Change::Partition {
                resource,
                element,
                from,
                to,
            } => Change::Partition {
                resource: *resource,
                element: element.clone(),
                from: to.clone(),
                to: from.clone(),
            },
        }
    }

    /// The object this change is about, if any.
    pub fn subject(&self) -> Option<&ElementId> {
        match self {
            Change::Create { object } | Change::Discard { object, .. } => Some(object.id()),
            Change::Set { object, .. }
            | Change::Insert { object, .. }
            | Change::InsertMany { object, .. }
            | Change::Remove { object, .. }
            | Change::RemoveMany { object, .. }
            | Change::Restore { object, .. }
            | Change::Move { object, .. }
            | Change::InsertRoot { object, .. }
            | Change::RemoveRoot { object, .. } => Some(object),
            Change::Partition { element, .. } => Some(element),
        }
    }
}

fn contiguous_start(indices: &[usize]) -> Option<usize> {
    let first = *indices.first()?;
    indices
        .iter()
        .enumerate()
        .all(|(i, idx)| *idx == first + i)
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remove_many(indices: Vec<usize>) -> Change {
        Change::RemoveMany {
            object: ElementId::new("o"),
            feature: FeatureId(0),
            values: indices.iter().map(|i| Value::Integer(*i as i64)).collect(),
            indices,
        }
    }

    #[test]
    fn test_contiguous_remove_many_inverts_to_insert_many() {
        match remove_many(vec![2, 3, 4]).inverse() {
            Change::InsertMany { index, values, .. } => {
                assert_eq!(index, 2);
                assert_eq!(values.len(), 3);
            }
            other => panic!("unexpected inverse {other:?}"),
        }
    }

    #[test]
    fn test_scattered_remove_many_inverts_to_restore() {
        let change = remove_many(vec![0, 3]);
        let inverse = change.inverse();
        assert!(matches!(inverse, Change::Restore { .. }));
        assert_eq!(inverse.inverse(), change);
    }

    #[test]
    fn test_partition_inverse_swaps_units() {
        let change = Change::Partition {
            resource: ResourceId(0),
            element: ElementId::new("e"),
            from: None,
            to: Some(Uri::new("mem:/u")),
        };
        match change.inverse() {
            Change::Partition { from, to, .. } => {
                assert_eq!(from, Some(Uri::new("mem:/u")));
                assert_eq!(to, None);
            }
            other => panic!("unexpected inverse {other:?}"),
        }
    }
}
