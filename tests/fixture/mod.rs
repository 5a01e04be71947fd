//! Shared schema, domain and recording helpers for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use txmodel::base::{ElementId, IntervalId, ResourceId};
use txmodel::domain::{DomainConfig, DomainError, EditingDomain, ResourceOptions};
use txmodel::model::{ClassId, FeatureId, Schema};
use txmodel::notify::{DemuxHandler, ListenerError, Notification};

pub const MODEL_URI: &str = "mem:/model.json";

/// A domain over a one-class schema:
///
/// ```text
/// Node
/// ├── name:     attribute
/// ├── children: containment, many
/// ├── child:    containment, single
/// └── refs:     reference, many
/// ```
pub struct Fixture {
    pub domain: EditingDomain,
    pub node: ClassId,
    pub name: FeatureId,
    pub children: FeatureId,
    pub child: FeatureId,
    pub refs: FeatureId,
}

pub fn schema() -> (Arc<Schema>, ClassId, [FeatureId; 4]) {
    let mut b = Schema::builder();
    let node = b.class("Node", &[]);
    let name = b.attribute(node, "name", false);
    let children = b.containment(node, "children", true);
    let child = b.containment(node, "child", false);
    let refs = b.reference(node, "refs", true);
    (b.build(), node, [name, children, child, refs])
}

pub fn fixture() -> Fixture {
    fixture_with(DomainConfig::default())
}

pub fn fixture_with(config: DomainConfig) -> Fixture {
    let (schema, node, [name, children, child, refs]) = schema();
    Fixture {
        domain: EditingDomain::with_config(schema, config),
        node,
        name,
        children,
        child,
        refs,
    }
}

impl Fixture {
    pub fn resource(&self, uri: &str) -> ResourceId {
        self.domain
            .create_resource(uri, ResourceOptions::AS_URI)
            .expect("resource should be created")
    }

    /// Build `root { a, b { c } }` as the root of `resource` in one write.
    pub fn tree(&self, resource: ResourceId) -> Tree {
        let ids = self
            .domain
            .run_as_write("build tree", |d| {
                let root = d.create_with_id(self.node, "root")?;
                d.add_root(resource, &root)?;
                let a = d.create_with_id(self.node, "a")?;
                let b = d.create_with_id(self.node, "b")?;
                let c = d.create_with_id(self.node, "c")?;
                d.set(&a, self.name, "alpha")?;
                d.set(&b, self.name, "beta")?;
                d.add(&root, self.children, &a)?;
                d.add(&root, self.children, &b)?;
                d.add(&b, self.children, &c)?;
                Ok::<_, DomainError>(Tree { root, a, b, c })
            })
            .expect("tree should be built");
        ids.value
    }

    pub fn children_of(&self, id: &ElementId) -> Vec<ElementId> {
        self.domain
            .get(id, self.children)
            .map(|v| v.objects().cloned().collect())
            .unwrap_or_default()
    }
}

pub struct Tree {
    pub root: ElementId,
    pub a: ElementId,
    pub b: ElementId,
    pub c: ElementId,
}

/// Collects every published batch.
#[derive(Default)]
pub struct Batches(pub Mutex<Vec<Vec<Notification>>>);

impl Batches {
    pub fn all(&self) -> Vec<Notification> {
        self.0.lock().iter().flatten().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }
}

impl txmodel::notify::Listener for Batches {
    fn on_event(
        &self,
        _cx: &txmodel::notify::DispatchContext<'_>,
        batch: &[Notification],
    ) -> Result<(), ListenerError> {
        self.0.lock().push(batch.to_vec());
        Ok(())
    }
}

/// Records demultiplexed callbacks as short strings.
#[derive(Default)]
pub struct Journal(pub Mutex<Vec<String>>);

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn log(&self, entry: String) -> Result<(), ListenerError> {
        self.0.lock().push(entry);
        Ok(())
    }
}

impl DemuxHandler for Journal {
    fn on_root_added(&self, _n: &Notification, _r: ResourceId, root: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("root added {root}"))
    }

    fn on_resource_dirtied(&self, _n: &Notification, _r: ResourceId) -> Result<(), ListenerError> {
        self.log("dirtied".to_string())
    }

    fn on_resource_saved(&self, _n: &Notification, _r: ResourceId) -> Result<(), ListenerError> {
        self.log("saved".to_string())
    }

    fn on_resource_loaded(&self, _n: &Notification, _r: ResourceId) -> Result<(), ListenerError> {
        self.log("loaded".to_string())
    }

    fn on_resource_imported(&self, _n: &Notification, _r: ResourceId) -> Result<(), ListenerError> {
        self.log("imported".to_string())
    }

    fn on_resource_exported(&self, _n: &Notification, _r: ResourceId) -> Result<(), ListenerError> {
        self.log("exported".to_string())
    }

    fn on_element_created(&self, _n: &Notification, owner: &ElementId, element: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("created {element} in {owner}"))
    }

    fn on_element_deleted(&self, _n: &Notification, owner: &ElementId, element: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("deleted {element} from {owner}"))
    }

    fn on_element_separated(&self, _n: &Notification, element: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("separated {element}"))
    }

    fn on_element_absorbed(&self, _n: &Notification, element: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("absorbed {element}"))
    }

    fn on_element_loaded(&self, _n: &Notification, element: &ElementId) -> Result<(), ListenerError> {
        self.log(format!("unit loaded {element}"))
    }

    fn on_undo_interval_closed(&self, _n: &Notification, interval: IntervalId) -> Result<(), ListenerError> {
        self.log(format!("closed {interval}"))
    }

    fn on_undo_intervals_flushed(&self, _n: &Notification, interval: IntervalId) -> Result<(), ListenerError> {
        self.log(format!("flushed {interval}"))
    }
}
