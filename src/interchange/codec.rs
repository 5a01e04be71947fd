//! Conversion between the live graph and unit snapshots.
//!
//! A logical resource is written as one main unit holding its roots plus one
//! unit per separate element. Wherever a separate element is contained, its
//! container's unit holds a [`ChildRecord::Unit`] stub instead of the object.

use super::InterchangeError;
use super::snapshot::{ChildRecord, ObjectRecord, SlotRecord, UnitSnapshot, ValueRecord};
use crate::base::{ElementId, ResourceId, ResourceOptions, Uri};
use crate::model::{ClassId, Containment, FeatureDef, FeatureId, ModelObject, ModelState, Schema, Value};
use tracing::{debug, trace};

// ============================================================================
// ENCODING
// ============================================================================

/// One unit ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedUnit {
    /// Logical unit URI, before path-variable conversion.
    pub uri: Uri,
    pub snapshot: UnitSnapshot,
}

/// Encode a resource into its main unit followed by its loaded separate units.
///
/// Separate elements whose unit was never read keep their stub; their unit
/// is not rewritten.
pub fn encode_resource(state: &ModelState, resource: ResourceId) -> Result<Vec<EncodedUnit>, InterchangeError> {
    let res = state
        .resource(resource)
        .ok_or_else(|| InterchangeError::invalid_record(format!("unknown {resource}")))?;
    let mut pending: Vec<(ElementId, Uri)> = Vec::new();
    let mut main = UnitSnapshot::new(res.uri().as_str());
    for root in res.contents() {
        main.roots.push(encode_object(state, resource, root, &mut pending)?);
    }
    let mut units = vec![EncodedUnit {
        uri: res.uri().clone(),
        snapshot: main,
    }];

    while let Some((element, uri)) = pending.pop() {
        if res.partition().is_unloaded(&element) {
            trace!(%element, "skipping unloaded unit");
            continue;
        }
        let mut snapshot = UnitSnapshot::new(uri.as_str());
        snapshot
            .roots
            .push(encode_object(state, resource, &element, &mut pending)?);
        units.push(EncodedUnit { uri, snapshot });
    }
    debug!(%resource, units = units.len(), "encoded resource");
    Ok(units)
}

fn encode_object(
    state: &ModelState,
    resource: ResourceId,
    id: &ElementId,
    pending: &mut Vec<(ElementId, Uri)>,
) -> Result<ObjectRecord, InterchangeError> {
    let schema = state.schema();
    let obj = state
        .object(id)
        .ok_or_else(|| InterchangeError::invalid_record(format!("unknown object '{id}'")))?;
    let mut slots = Vec::new();
    for feature in schema.features_of(obj.class()) {
        let value = obj.get(*feature);
        if value.is_null() || matches!(value, Value::List(items) if items.is_empty()) {
            continue;
        }
        let Some(def) = schema.feature(*feature) else {
            continue;
        };
        slots.push(SlotRecord {
            feature: def.name.to_string(),
            value: encode_value(state, resource, def, value, pending)?,
        });
    }
    Ok(ObjectRecord {
        id: id.as_str().to_string(),
        class: schema.class_name(obj.class()).to_string(),
        slots,
    })
}

fn encode_value(
    state: &ModelState,
    resource: ResourceId,
    def: &FeatureDef,
    value: &Value,
    pending: &mut Vec<(ElementId, Uri)>,
) -> Result<ValueRecord, InterchangeError> {
    Ok(match value {
        Value::Null => ValueRecord::Null,
        Value::Bool(b) => ValueRecord::Bool(*b),
        Value::Integer(i) => ValueRecord::Integer(*i),
        Value::Real(r) => ValueRecord::Real(*r),
        Value::String(s) => ValueRecord::String(s.to_string()),
        Value::Uri(u) => ValueRecord::Uri(u.as_str().to_string()),
        Value::List(items) => ValueRecord::List(
            items
                .iter()
                .map(|v| encode_value(state, resource, def, v, pending))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(target) if def.is_containment() => {
            let partition = state
                .resource(resource)
                .map(|r| r.partition())
                .ok_or_else(|| InterchangeError::invalid_record(format!("unknown {resource}")))?;
            match partition.unit_of_separate(target) {
                Some(uri) => {
                    let class = state
                        .object(target)
                        .map(|o| state.schema().class_name(o.class()).to_string())
                        .unwrap_or_default();
                    pending.push((target.clone(), uri.clone()));
                    ValueRecord::Child(ChildRecord::Unit {
                        id: target.as_str().to_string(),
                        class,
                        uri: uri.as_str().to_string(),
                    })
                }
                None => ValueRecord::Child(ChildRecord::Inline(encode_object(
                    state, resource, target, pending,
                )?)),
            }
        }
        Value::Object(target) => ValueRecord::Ref(target.as_str().to_string()),
    })
}

// ============================================================================
// DECODING
// ============================================================================

/// A separate element found while decoding; its content is in `uri`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stub {
    pub element: ElementId,
    pub uri: Uri,
}

/// Objects read from one unit, not yet installed in a graph.
#[derive(Debug, Default)]
pub struct DecodedUnit {
    pub objects: Vec<ModelObject>,
    pub roots: Vec<ElementId>,
    pub stubs: Vec<Stub>,
}

impl DecodedUnit {
    /// Remove the object with `id` from the decoded set.
    pub fn take_object(&mut self, id: &ElementId) -> Option<ModelObject> {
        let index = self.objects.iter().position(|o| o.id() == id)?;
        Some(self.objects.swap_remove(index))
    }
}

/// Decode a unit against `schema`.
///
/// With [`ResourceOptions::COMPATIBILITY_MODE`] unknown features are
/// skipped; otherwise they fail the decode.
pub fn decode_unit(
    schema: &Schema,
    unit: &UnitSnapshot,
    options: ResourceOptions,
) -> Result<DecodedUnit, InterchangeError> {
    let mut decoder = Decoder {
        schema,
        lenient: options.contains(ResourceOptions::COMPATIBILITY_MODE),
        out: DecodedUnit::default(),
    };
    for root in &unit.roots {
        let id = decoder.object(root, None)?;
        decoder.out.roots.push(id);
    }
    Ok(decoder.out)
}

struct Decoder<'a> {
    schema: &'a Schema,
    lenient: bool,
    out: DecodedUnit,
}

impl Decoder<'_> {
    fn class(&self, name: &str) -> Result<ClassId, InterchangeError> {
        self.schema
            .class_by_name(name)
            .ok_or_else(|| InterchangeError::UnknownClass(name.to_string()))
    }

    fn object(
        &mut self,
        record: &ObjectRecord,
        container: Option<Containment>,
    ) -> Result<ElementId, InterchangeError> {
        let class = self.class(&record.class)?;
        let id = ElementId::new(record.id.as_str());
        let mut object = ModelObject::new(id.clone(), class);
        object.set_container(container);

        for slot in &record.slots {
            let Some(feature) = self.schema.feature_by_name(class, &slot.feature) else {
                if self.lenient {
                    trace!(feature = %slot.feature, class = %record.class, "skipping unknown feature");
                    continue;
                }
                return Err(InterchangeError::UnknownFeature {
                    class: record.class.clone(),
                    feature: slot.feature.clone(),
                });
            };
            let many = self.schema.is_many(feature);
            let value = self.value(&id, feature, &slot.value)?;
            if many != matches!(value, Value::List(_)) && !value.is_null() {
                return Err(InterchangeError::invalid_value(format!(
                    "feature '{}' of '{}' has the wrong multiplicity",
                    slot.feature, record.id
                )));
            }
            object.set_slot(feature, value);
        }
        self.out.objects.push(object);
        Ok(id)
    }

    fn value(&mut self, owner: &ElementId, feature: FeatureId, record: &ValueRecord) -> Result<Value, InterchangeError> {
        Ok(match record {
            ValueRecord::Null => Value::Null,
            ValueRecord::Bool(b) => Value::Bool(*b),
            ValueRecord::Integer(i) => Value::Integer(*i),
            ValueRecord::Real(r) => Value::Real(*r),
            ValueRecord::String(s) => Value::from(s.as_str()),
            ValueRecord::Uri(u) => Value::Uri(Uri::new(u)),
            ValueRecord::Ref(id) => Value::Object(ElementId::new(id.as_str())),
            ValueRecord::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.value(owner, feature, v))
                    .collect::<Result<_, _>>()?,
            ),
            ValueRecord::Child(child) => {
                if !self.schema.is_containment(feature) {
                    return Err(InterchangeError::invalid_value(format!(
                        "contained object in non-containment feature '{}'",
                        self.schema.feature_name(feature)
                    )));
                }
                let container = Containment {
                    owner: owner.clone(),
                    feature,
                };
                match child {
                    ChildRecord::Inline(obj) => Value::Object(self.object(obj, Some(container))?),
                    ChildRecord::Unit { id, class, uri } => {
                        let element = ElementId::new(id.as_str());
                        let mut stand_in = ModelObject::new(element.clone(), self.class(class)?);
                        stand_in.set_container(Some(container));
                        self.out.objects.push(stand_in);
                        self.out.stubs.push(Stub {
                            element: element.clone(),
                            uri: Uri::new(uri),
                        });
                        Value::Object(element)
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaBuilder;

    fn schema() -> std::sync::Arc<Schema> {
        let mut b = SchemaBuilder::default();
        let node = b.class("Node", &[]);
        b.attribute(node, "name", false);
        b.containment(node, "children", true);
        b.build()
    }

    fn unit_with(slots: Vec<SlotRecord>) -> UnitSnapshot {
        UnitSnapshot {
            uri: "mem:/m.json".into(),
            roots: vec![ObjectRecord {
                id: "root".into(),
                class: "Node".into(),
                slots,
            }],
        }
    }

    #[test]
    fn test_decode_builds_containment_and_stubs() {
        let schema = schema();
        let unit = unit_with(vec![SlotRecord {
            feature: "children".into(),
            value: ValueRecord::List(vec![
                ValueRecord::Child(ChildRecord::Inline(ObjectRecord {
                    id: "a".into(),
                    class: "Node".into(),
                    slots: vec![],
                })),
                ValueRecord::Child(ChildRecord::Unit {
                    id: "b".into(),
                    class: "Node".into(),
                    uri: "mem:/m_b.json".into(),
                }),
            ]),
        }]);
        let mut decoded = decode_unit(&schema, &unit, ResourceOptions::empty()).unwrap();
        assert_eq!(decoded.roots, vec![ElementId::new("root")]);
        assert_eq!(
            decoded.stubs,
            vec![Stub {
                element: ElementId::new("b"),
                uri: Uri::new("mem:/m_b.json")
            }]
        );
        let a = decoded.take_object(&ElementId::new("a")).unwrap();
        assert_eq!(a.container().map(|c| c.owner.as_str()), Some("root"));
    }

    #[test]
    fn test_unknown_feature_needs_compatibility_mode() {
        let schema = schema();
        let unit = unit_with(vec![SlotRecord {
            feature: "colour".into(),
            value: ValueRecord::String("red".into()),
        }]);
        assert!(matches!(
            decode_unit(&schema, &unit, ResourceOptions::empty()),
            Err(InterchangeError::UnknownFeature { .. })
        ));
        let decoded = decode_unit(&schema, &unit, ResourceOptions::COMPATIBILITY_MODE).unwrap();
        assert_eq!(decoded.objects.len(), 1);
    }
}
