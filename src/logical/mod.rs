//! Logical resources: one resource persisted across several physical units.
//!
//! ```text
//! LogicalResource (main unit: the resource URI)
//! ├── root
//! │   ├── a            (stored in the main unit)
//! │   └── b ─────────► mem:/model_b.json   (separate)
//! │       └── c        (stored with b)
//! └── detached: { k ─► mem:/model_k.json }  (remembered for re-insertion)
//! ```
//!
//! Partitioning changes go through the editing domain like every other
//! write, so they are recorded for undo and need a write action. Loading a
//! unit only fills in an existing stand-in and needs no action.

mod policy;
mod unit;

pub use policy::{PolicyError, PolicyRegistry, SeparationPolicy};
pub use unit::UnitView;

use crate::base::{ElementId, ResourceId, Uri};
use crate::domain::{DomainError, EditingDomain};
use crate::model::{ClassId, ModelState};
use policy::PolicyChain;
use std::collections::BTreeMap;
use tracing::debug;

/// A resource of an editing domain, seen as a set of physical units.
#[derive(Clone, Debug)]
pub struct LogicalResource {
    domain: EditingDomain,
    resource: ResourceId,
}

/// What separating or absorbing needs to know about an element.
struct Placement {
    class: ClassId,
    /// Unit the element is stored in right now.
    unit: Uri,
    separate: bool,
    unloaded: bool,
    is_root: bool,
    remembered: Option<Uri>,
}

impl LogicalResource {
    pub(crate) fn new(domain: EditingDomain, resource: ResourceId) -> Self {
        Self { domain, resource }
    }

    pub fn domain(&self) -> &EditingDomain {
        &self.domain
    }

    pub fn id(&self) -> ResourceId {
        self.resource
    }

    /// URI of the main unit.
    pub fn uri(&self) -> Option<Uri> {
        self.domain.resource_uri(self.resource)
    }

    pub fn is_root(&self, element: &ElementId) -> bool {
        self.domain.read(|state| {
            state
                .resource(self.resource)
                .is_some_and(|r| r.contents().contains(element))
        })
    }

    pub fn is_separate(&self, element: &ElementId) -> bool {
        self.domain.read(|state| {
            state
                .resource(self.resource)
                .is_some_and(|r| r.partition().is_separate(element))
        })
    }

    /// Whether the element's content is in memory.
    pub fn is_loaded(&self, element: &ElementId) -> bool {
        self.domain.read(|state| {
            state.resource_of(element) == Some(self.resource)
                && state
                    .resource(self.resource)
                    .is_some_and(|r| !r.partition().is_unloaded(element))
        })
    }

    /// Physical unit `element` is stored in.
    pub fn unit_of(&self, element: &ElementId) -> Option<Uri> {
        self.domain.read(|state| state.unit_of(self.resource, element))
    }

    /// Every unit of this resource, main unit first.
    pub fn units(&self) -> Vec<Uri> {
        self.domain.read(|state| {
            let Some(res) = state.resource(self.resource) else {
                return Vec::new();
            };
            std::iter::once(res.uri().clone())
                .chain(res.partition().separate_elements().map(|(_, u)| u.clone()))
                .collect()
        })
    }

    /// Read-only views of the separate units, keyed by their root element.
    pub fn mapped_resources(&self) -> BTreeMap<ElementId, UnitView> {
        self.domain.read(|state| {
            let Some(res) = state.resource(self.resource) else {
                return BTreeMap::new();
            };
            res.partition()
                .separate_elements()
                .map(|(element, uri)| {
                    let loaded = !res.partition().is_unloaded(element);
                    let view = UnitView::new(self.resource, element.clone(), uri.clone(), loaded);
                    (element.clone(), view)
                })
                .collect()
        })
    }

    fn placement(&self, state: &ModelState, element: &ElementId) -> Result<Placement, String> {
        let obj = state.object(element).ok_or("unknown element")?;
        if state.resource_of(element) != Some(self.resource) {
            return Err("not contained in this resource".to_string());
        }
        let res = state
            .resource(self.resource)
            .ok_or("resource no longer exists")?;
        let unit = state
            .unit_of(self.resource, element)
            .ok_or("element has no unit")?;
        Ok(Placement {
            class: obj.class(),
            unit,
            separate: res.partition().is_separate(element),
            unloaded: res.partition().is_unloaded(element),
            is_root: res.contents().contains(element),
            remembered: res.partition().detached_unit(element).cloned(),
        })
    }

    fn chain<'a>(&'a self, class: ClassId, element: &'a ElementId) -> PolicyChain<'a> {
        PolicyChain {
            policies: self.domain.policies().applicable(self.domain.schema(), class),
            resource: self,
            element,
        }
    }

    /// A unit may hold only one element's content: not the main unit, not
    /// another resource, and not a unit another element owns or will get
    /// back on re-insertion.
    fn check_unit_free(&self, element: &ElementId, p: &Placement, unit: &Uri) -> Result<(), DomainError> {
        if unit == &p.unit {
            return Err(DomainError::cannot_separate(element, format!("already stored in '{unit}'")));
        }
        let taken = self.domain.read(|state| {
            let Some(res) = state.resource(self.resource) else {
                return Some("resource no longer exists".to_string());
            };
            if res.uri() == unit {
                return Some(format!("'{unit}' is the main unit"));
            }
            if let Some(owner) = res.partition().unit_owner(unit).filter(|owner| *owner != element) {
                return Some(format!("'{unit}' is the unit of {owner}"));
            }
            state
                .resources()
                .iter()
                .filter(|other| other.id() != self.resource)
                .find(|other| other.uri() == unit || other.partition().unit_owner(unit).is_some())
                .map(|other| format!("'{unit}' belongs to resource '{}'", other.uri()))
        });
        match taken {
            Some(reason) => Err(DomainError::cannot_separate(element, reason)),
            None => Ok(()),
        }
    }

    /// Whether `element` could be given its own unit right now.
    pub fn can_separate(&self, element: &ElementId) -> bool {
        let placement = self.domain.read(|state| self.placement(state, element));
        match placement {
            Ok(p) if !p.separate && !p.is_root => self.chain(p.class, element).can_separate(),
            _ => false,
        }
    }

    /// Move `element` and its non-separate descendants into their own unit.
    ///
    /// Without an explicit unit, a policy suggestion is used, then the unit
    /// the element had when it was last detached, then a sibling of the
    /// main unit named after the element. Returns the chosen unit.
    pub fn separate(&self, element: &ElementId, unit: Option<Uri>) -> Result<Uri, DomainError> {
        let p = self
            .domain
            .read(|state| self.placement(state, element))
            .map_err(|reason| DomainError::cannot_separate(element, reason))?;
        if p.separate {
            return Err(DomainError::cannot_separate(element, "already separate"));
        }
        if p.is_root {
            return Err(DomainError::cannot_separate(element, "a resource root is stored in the main unit"));
        }
        if let Some(unit) = &unit {
            self.check_unit_free(element, &p, unit)?;
        }

        let chain = self.chain(p.class, element);
        if !chain.can_separate() {
            return Err(DomainError::cannot_separate(element, "refused by a separation policy"));
        }
        let suggested = chain
            .pre_separate(unit.as_ref())
            .map_err(|reason| DomainError::cannot_separate(element, reason))?;
        let main = self
            .uri()
            .ok_or(DomainError::UnknownResource(self.resource))?;
        let unit = suggested
            .or(p.remembered.clone())
            .unwrap_or_else(|| main.with_stem_suffix(element.as_str()));
        self.check_unit_free(element, &p, &unit)?;

        let target = unit.clone();
        self.domain
            .mutate(|state, rec| state.set_partition(rec, self.resource, element, Some(target)))?;
        chain.post_separate(&unit);
        debug!(%element, %unit, "separated");
        Ok(unit)
    }

    /// Store a separate element back in its container's unit.
    pub fn absorb(&self, element: &ElementId) -> Result<(), DomainError> {
        let p = self
            .domain
            .read(|state| self.placement(state, element))
            .map_err(|reason| DomainError::cannot_absorb(element, reason))?;
        if !p.separate {
            return Err(DomainError::cannot_absorb(element, "not separate"));
        }
        if p.unloaded {
            return Err(DomainError::cannot_absorb(element, "unit is not loaded"));
        }

        let chain = self.chain(p.class, element);
        chain
            .pre_absorb()
            .map_err(|reason| DomainError::cannot_absorb(element, reason))?;
        self.domain
            .mutate(|state, rec| state.set_partition(rec, self.resource, element, None))?;
        chain.post_absorb();
        debug!(%element, from = %p.unit, "absorbed");
        Ok(())
    }

    /// Read the unit of an unloaded separate element. Does nothing when
    /// the element is already loaded.
    pub fn load(&self, element: &ElementId) -> Result<(), DomainError> {
        if !self.domain.contains(element) {
            return Err(DomainError::UnknownObject(element.clone()));
        }
        self.domain.load_unit(self.resource, element)?;
        Ok(())
    }
}
