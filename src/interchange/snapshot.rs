//! Persistent form of one physical storage unit.
//!
//! ```text
//! UnitSnapshot
//! └── roots: [ObjectRecord]
//!       └── slots: [SlotRecord { feature, value }]
//!             └── ValueRecord::Child(ChildRecord)
//!                   ├── Inline(ObjectRecord)        stored in this unit
//!                   └── Unit { id, class, uri }     stored in its own unit
//! ```
//!
//! Records name classes and features by their schema names so a unit stays
//! readable after the schema gains new members.

#[cfg(feature = "interchange")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "interchange", derive(Serialize, Deserialize))]
pub struct UnitSnapshot {
    pub uri: String,
    pub roots: Vec<ObjectRecord>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "interchange", derive(Serialize, Deserialize))]
pub struct ObjectRecord {
    pub id: String,
    pub class: String,
    #[cfg_attr(feature = "interchange", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub slots: Vec<SlotRecord>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "interchange", derive(Serialize, Deserialize))]
pub struct SlotRecord {
    pub feature: String,
    pub value: ValueRecord,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "interchange",
    derive(Serialize, Deserialize),
    serde(tag = "kind", content = "value", rename_all = "snake_case")
)]
pub enum ValueRecord {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Uri(String),
    /// Non-containment reference by element id.
    Ref(String),
    List(Vec<ValueRecord>),
    /// Contained object.
    Child(ChildRecord),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "interchange",
    derive(Serialize, Deserialize),
    serde(tag = "storage", rename_all = "snake_case")
)]
pub enum ChildRecord {
    Inline(ObjectRecord),
    /// A separate element; its content lives in the unit at `uri`.
    Unit { id: String, class: String, uri: String },
}

impl UnitSnapshot {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            roots: Vec::new(),
        }
    }

    /// Units referenced by stubs anywhere in this snapshot.
    pub fn referenced_units(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_units(&mut out);
        }
        out
    }
}

impl ObjectRecord {
    fn collect_units<'a>(&'a self, out: &mut Vec<&'a str>) {
        for slot in &self.slots {
            slot.value.collect_units(out);
        }
    }
}

impl ValueRecord {
    fn collect_units<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ValueRecord::List(items) => items.iter().for_each(|v| v.collect_units(out)),
            ValueRecord::Child(ChildRecord::Inline(obj)) => obj.collect_units(out),
            ValueRecord::Child(ChildRecord::Unit { uri, .. }) => out.push(uri),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_units_walks_nested_children() {
        let leaf = ChildRecord::Unit {
            id: "b".into(),
            class: "Node".into(),
            uri: "mem:/m_b.json".into(),
        };
        let inline = ObjectRecord {
            id: "a".into(),
            class: "Node".into(),
            slots: vec![SlotRecord {
                feature: "children".into(),
                value: ValueRecord::List(vec![ValueRecord::Child(leaf)]),
            }],
        };
        let unit = UnitSnapshot {
            uri: "mem:/m.json".into(),
            roots: vec![ObjectRecord {
                id: "root".into(),
                class: "Node".into(),
                slots: vec![SlotRecord {
                    feature: "children".into(),
                    value: ValueRecord::List(vec![ValueRecord::Child(ChildRecord::Inline(inline))]),
                }],
            }],
        };
        assert_eq!(unit.referenced_units(), vec!["mem:/m_b.json"]);
    }
}
