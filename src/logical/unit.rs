//! Read-only views of physical storage units.

use crate::base::{ElementId, ResourceId, Uri};
use crate::domain::DomainError;
use crate::notify::Filter;

/// One physical unit of a logical resource, as handed out by
/// [`LogicalResource::mapped_resources`](super::LogicalResource::mapped_resources).
///
/// The view can be observed but not driven: writing, loading or saving
/// through it fails. Go through the owning logical resource instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitView {
    resource: ResourceId,
    element: ElementId,
    uri: Uri,
    loaded: bool,
}

impl UnitView {
    pub(crate) fn new(resource: ResourceId, element: ElementId, uri: Uri, loaded: bool) -> Self {
        Self {
            resource,
            element,
            uri,
            loaded,
        }
    }

    /// The logical resource this unit belongs to.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// The separate element stored as this unit's root.
    pub fn element(&self) -> &ElementId {
        &self.element
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Whether the unit's content had been read when the view was taken.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Filter selecting notifications raised on the unit's root element.
    pub fn filter(&self) -> Filter {
        Filter::notifier(&self.element)
    }

    pub fn set_uri(&mut self, _uri: Uri) -> Result<(), DomainError> {
        Err(self.read_only("renamed"))
    }

    pub fn load(&self) -> Result<(), DomainError> {
        Err(self.read_only("loaded"))
    }

    pub fn save(&self) -> Result<(), DomainError> {
        Err(self.read_only("saved"))
    }

    pub fn unload(&self) -> Result<(), DomainError> {
        Err(self.read_only("unloaded"))
    }

    fn read_only(&self, what: &str) -> DomainError {
        DomainError::illegal(format!("unit '{}' is a read-only view and cannot be {what}", self.uri))
    }
}
