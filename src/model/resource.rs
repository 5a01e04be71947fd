//! Resources and the resource set that owns them.
//!
//! ```text
//! ResourceSet
//! ├── resources: IndexMap<ResourceId, Resource>   (creation order)
//! └── by_uri:    FxHashMap<Uri, ResourceId>
//!
//! Resource
//! ├── contents: Vec<ElementId>                     (roots)
//! └── partition: Partition                         (logical storage units)
//! ```

use crate::base::{ElementId, ResourceId, ResourceOptions, Uri};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

// ============================================================================
// PARTITION
// ============================================================================

/// Element-to-unit bookkeeping of a logical resource.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    /// Elements stored in their own unit. Membership is exactly "is separate".
    pub(crate) separate: IndexMap<ElementId, Uri>,
    /// Units of separate elements that were detached, keyed by identity.
    pub(crate) detached: FxHashMap<ElementId, Uri>,
    /// Separate elements whose unit content has not been read yet.
    pub(crate) unloaded: IndexMap<ElementId, Uri>,
}

impl Partition {
    pub fn unit_of_separate(&self, element: &ElementId) -> Option<&Uri> {
        self.separate.get(element)
    }

    pub fn is_separate(&self, element: &ElementId) -> bool {
        self.separate.contains_key(element)
    }

    pub fn is_unloaded(&self, element: &ElementId) -> bool {
        self.unloaded.contains_key(element)
    }

    pub fn detached_unit(&self, element: &ElementId) -> Option<&Uri> {
        self.detached.get(element)
    }

    pub fn separate_elements(&self) -> impl Iterator<Item = (&ElementId, &Uri)> {
        self.separate.iter()
    }

    /// Element whose unit, current or remembered, is `uri`.
    pub fn unit_owner(&self, uri: &Uri) -> Option<&ElementId> {
        self.separate
            .iter()
            .chain(self.detached.iter())
            .find(|(_, unit)| *unit == uri)
            .map(|(element, _)| element)
    }

    pub(crate) fn clear(&mut self) {
        self.separate.clear();
        self.detached.clear();
        self.unloaded.clear();
    }
}

// ============================================================================
// RESOURCE
// ============================================================================

/// An addressable container of root objects.
#[derive(Clone, Debug)]
pub struct Resource {
    id: ResourceId,
    uri: Uri,
    pub(crate) contents: Vec<ElementId>,
    pub(crate) loaded: bool,
    pub(crate) modified: bool,
    pub(crate) load_options: ResourceOptions,
    pub(crate) partition: Partition,
}

impl Resource {
    fn new(id: ResourceId, uri: Uri) -> Self {
        Self {
            id,
            uri,
            contents: Vec::new(),
            loaded: false,
            modified: false,
            load_options: ResourceOptions::empty(),
            partition: Partition::default(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn contents(&self) -> &[ElementId] {
        &self.contents
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn load_options(&self) -> ResourceOptions {
        self.load_options
    }
}

// ============================================================================
// RESOURCE SET
// ============================================================================

/// Registry of resources keyed by URI.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    resources: IndexMap<ResourceId, Resource>,
    by_uri: FxHashMap<Uri, ResourceId>,
    next_id: u32,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, empty resource. `None` if the URI is taken.
    pub fn create(&mut self, uri: Uri) -> Option<ResourceId> {
        if self.by_uri.contains_key(&uri) {
            return None;
        }
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.by_uri.insert(uri.clone(), id);
        self.resources.insert(id, Resource::new(id, uri));
        Some(id)
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(&id)
    }

    pub fn find(&self, uri: &Uri) -> Option<ResourceId> {
        self.by_uri.get(uri).copied()
    }

    /// Re-key a resource under a new URI. `false` if the URI is taken.
    pub(crate) fn rename(&mut self, id: ResourceId, uri: Uri) -> bool {
        if self.by_uri.get(&uri).is_some_and(|other| *other != id) {
            return false;
        }
        let Some(resource) = self.resources.get_mut(&id) else {
            return false;
        };
        self.by_uri.remove(&resource.uri);
        self.by_uri.insert(uri.clone(), id);
        resource.uri = uri;
        true
    }

    pub(crate) fn remove(&mut self, id: ResourceId) -> Option<Resource> {
        let resource = self.resources.shift_remove(&id)?;
        self.by_uri.remove(&resource.uri);
        Some(resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
