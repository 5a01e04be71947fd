//! Schema description table.
//!
//! Classes and their structural features are declared once through a
//! [`SchemaBuilder`] and resolved into dense [`ClassId`]/[`FeatureId`]
//! handles. Everything on the hot path (mutation, notification dispatch,
//! filter evaluation) works with these handles; names are only looked up
//! when (de)serializing units.

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::sync::Arc;

// ============================================================================
// HANDLES
// ============================================================================

/// Dense handle of a class declared in a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Dense handle of a structural feature declared in a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u32);

// ============================================================================
// DEFINITIONS
// ============================================================================

/// What a feature holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    /// Plain data values.
    Attribute,
    /// Object references. Containment references own their targets.
    Reference { containment: bool },
}

#[derive(Clone, Debug)]
pub struct FeatureDef {
    pub id: FeatureId,
    pub name: SmolStr,
    pub owner: ClassId,
    pub kind: FeatureKind,
    pub many: bool,
}

impl FeatureDef {
    pub fn is_containment(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { containment: true })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { .. })
    }
}

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: SmolStr,
    pub supertypes: Vec<ClassId>,
    pub is_abstract: bool,
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Resolved class/feature table shared by a domain and its listeners.
#[derive(Debug, Default)]
pub struct Schema {
    classes: Vec<ClassDef>,
    features: Vec<FeatureDef>,
    class_index: FxHashMap<SmolStr, ClassId>,
    /// Ancestors of each class, including itself.
    ancestors: Vec<FxHashSet<ClassId>>,
    /// All features of each class, inherited first, in declaration order.
    all_features: Vec<Vec<FeatureId>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.0 as usize)
    }

    pub fn feature(&self, id: FeatureId) -> Option<&FeatureDef> {
        self.features.get(id.0 as usize)
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(name).copied()
    }

    /// Look up a feature by name on a class, including inherited features.
    pub fn feature_by_name(&self, class: ClassId, name: &str) -> Option<FeatureId> {
        self.features_of(class)
            .iter()
            .copied()
            .find(|f| self.features[f.0 as usize].name == name)
    }

    /// Every feature applicable to `class`.
    pub fn features_of(&self, class: ClassId) -> &[FeatureId] {
        self.all_features
            .get(class.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reflexive subtype test.
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.ancestors
            .get(class.0 as usize)
            .is_some_and(|set| set.contains(&ancestor))
    }

    pub fn has_feature(&self, class: ClassId, feature: FeatureId) -> bool {
        self.feature(feature)
            .is_some_and(|def| self.is_subclass(class, def.owner))
    }

    pub fn is_containment(&self, feature: FeatureId) -> bool {
        self.feature(feature).is_some_and(FeatureDef::is_containment)
    }

    pub fn is_many(&self, feature: FeatureId) -> bool {
        self.feature(feature).is_some_and(|f| f.many)
    }

    pub fn class_name(&self, class: ClassId) -> &str {
        self.class(class).map(|c| c.name.as_str()).unwrap_or("?")
    }

    pub fn feature_name(&self, feature: FeatureId) -> &str {
        self.feature(feature).map(|f| f.name.as_str()).unwrap_or("?")
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Declares classes and features, then freezes them into a [`Schema`].
///
/// Supertypes must be declared before their subclasses.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    classes: Vec<ClassDef>,
    features: Vec<FeatureDef>,
}

impl SchemaBuilder {
    pub fn class(&mut self, name: &str, supertypes: &[ClassId]) -> ClassId {
        self.push_class(name, supertypes, false)
    }

    pub fn abstract_class(&mut self, name: &str, supertypes: &[ClassId]) -> ClassId {
        self.push_class(name, supertypes, true)
    }

    pub fn attribute(&mut self, class: ClassId, name: &str, many: bool) -> FeatureId {
        self.push_feature(class, name, FeatureKind::Attribute, many)
    }

    pub fn reference(&mut self, class: ClassId, name: &str, many: bool) -> FeatureId {
        self.push_feature(class, name, FeatureKind::Reference { containment: false }, many)
    }

    pub fn containment(&mut self, class: ClassId, name: &str, many: bool) -> FeatureId {
        self.push_feature(class, name, FeatureKind::Reference { containment: true }, many)
    }

    pub fn build(self) -> Arc<Schema> {
        let mut ancestors: Vec<FxHashSet<ClassId>> = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let mut set = FxHashSet::default();
            set.insert(class.id);
            for sup in &class.supertypes {
                if let Some(inherited) = ancestors.get(sup.0 as usize) {
                    set.extend(inherited.iter().copied());
                }
            }
            ancestors.push(set);
        }

        let mut all_features: Vec<Vec<FeatureId>> = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let mut list: Vec<FeatureId> = Vec::new();
            for sup in &class.supertypes {
                if let Some(inherited) = all_features.get(sup.0 as usize) {
                    for f in inherited {
                        if !list.contains(f) {
                            list.push(*f);
                        }
                    }
                }
            }
            list.extend(
                self.features
                    .iter()
                    .filter(|f| f.owner == class.id)
                    .map(|f| f.id),
            );
            all_features.push(list);
        }

        let class_index = self
            .classes
            .iter()
            .map(|c| (c.name.clone(), c.id))
            .collect();

        Arc::new(Schema {
            classes: self.classes,
            features: self.features,
            class_index,
            ancestors,
            all_features,
        })
    }

    fn push_class(&mut self, name: &str, supertypes: &[ClassId], is_abstract: bool) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassDef {
            id,
            name: SmolStr::new(name),
            supertypes: supertypes.to_vec(),
            is_abstract,
        });
        id
    }

    fn push_feature(&mut self, owner: ClassId, name: &str, kind: FeatureKind, many: bool) -> FeatureId {
        let id = FeatureId(self.features.len() as u32);
        self.features.push(FeatureDef {
            id,
            name: SmolStr::new(name),
            owner,
            kind,
            many,
        });
        id
    }
}
