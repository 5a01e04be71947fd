//! Integration tests for the resource lifecycle: saving and loading
//! through stores, lazily loaded units, path variables and imports.

#![allow(clippy::unwrap_used)]

mod fixture;

use fixture::{Fixture, Journal, MODEL_URI, fixture, fixture_with};
use rstest::rstest;
use std::sync::Arc;
use txmodel::base::{ElementId, Uri};
use txmodel::domain::{DomainConfig, DomainError, ResourceOptions};
use txmodel::interchange::{
    FileStore, FormatCapability, InterchangeError, JsonFormat, MemoryStore, ResourceFormat,
    ResourceStore, UnitSnapshot,
};
use txmodel::notify::{Demultiplexer, Filter};

fn name_of(f: &Fixture, id: &ElementId) -> Option<String> {
    f.domain
        .get(id, f.name)
        .and_then(|v| v.as_str().map(str::to_string))
}

fn journal(f: &Fixture, filter: Filter) -> Arc<Demultiplexer<Journal>> {
    let demux = Arc::new(Demultiplexer::new(f.domain.schema().clone(), Journal::default()));
    f.domain.add_listener(Some(filter), demux.clone());
    demux
}

// ── Round trips ─────────────────────────────────────────────────────

#[rstest]
#[case::memory(false)]
#[case::files(true)]
fn saved_resource_loads_into_fresh_domain(#[case] on_disk: bool) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ResourceStore> = if on_disk {
        Arc::new(FileStore::new(dir.path()))
    } else {
        Arc::new(MemoryStore::new())
    };
    let config = DomainConfig::default().with_store(store.clone());

    let writer = fixture_with(config.clone());
    let res = writer.resource(MODEL_URI);
    let tree = writer.tree(res);
    writer
        .domain
        .run_as_write("link", |d| d.add(&tree.a, writer.refs, &tree.c))
        .unwrap();
    assert!(writer.domain.is_modified(res));
    writer.domain.save_resource(res, ResourceOptions::empty()).unwrap();
    assert!(!writer.domain.is_modified(res));
    assert!(store.exists(&Uri::new(MODEL_URI)));
    if on_disk {
        assert!(dir.path().join("mem").join("model.json").is_file());
    }

    let reader = fixture_with(config);
    let loaded = reader
        .domain
        .load_resource(MODEL_URI, ResourceOptions::AS_URI)
        .unwrap();
    assert!(reader.domain.is_loaded(loaded));
    assert!(!reader.domain.is_modified(loaded));
    assert_eq!(reader.domain.resource_roots(loaded), vec![tree.root.clone()]);
    assert_eq!(reader.children_of(&tree.root), vec![tree.a.clone(), tree.b.clone()]);
    assert_eq!(reader.children_of(&tree.b), vec![tree.c.clone()]);
    assert_eq!(name_of(&reader, &tree.a).as_deref(), Some("alpha"));
    let refs: Vec<ElementId> = reader
        .domain
        .get(&tree.a, reader.refs)
        .map(|v| v.objects().cloned().collect())
        .unwrap_or_default();
    assert_eq!(refs, vec![tree.c.clone()]);
}

#[test]
fn separate_units_are_written_and_read_back() {
    let store = Arc::new(MemoryStore::new());
    let config = DomainConfig::default().with_store(store.clone());
    let writer = fixture_with(config.clone());
    let res = writer.resource(MODEL_URI);
    let tree = writer.tree(res);
    let logical = writer.domain.logical(res).unwrap();
    writer
        .domain
        .run_as_write("separate", |_| logical.separate(&tree.b, None))
        .unwrap();
    writer.domain.save_resource(res, ResourceOptions::empty()).unwrap();
    assert_eq!(
        store.uris(),
        vec![Uri::new("mem:/model.json"), Uri::new("mem:/model_b.json")]
    );

    let reader = fixture_with(config);
    let loaded = reader
        .domain
        .load_resource(MODEL_URI, ResourceOptions::AS_URI)
        .unwrap();
    let logical = reader.domain.logical(loaded).unwrap();
    assert!(logical.is_separate(&tree.b));
    assert!(logical.is_loaded(&tree.b));
    assert_eq!(logical.unit_of(&tree.c), Some(Uri::new("mem:/model_b.json")));
    assert_eq!(name_of(&reader, &tree.b).as_deref(), Some("beta"));
}

#[test]
fn lazy_units_load_on_request() {
    let store = Arc::new(MemoryStore::new());
    let config = DomainConfig::default().with_store(store);
    let writer = fixture_with(config.clone());
    let res = writer.resource(MODEL_URI);
    let tree = writer.tree(res);
    let logical = writer.domain.logical(res).unwrap();
    writer
        .domain
        .run_as_write("separate", |_| logical.separate(&tree.b, None))
        .unwrap();
    writer.domain.save_resource(res, ResourceOptions::empty()).unwrap();

    let reader = fixture_with(config);
    let demux = journal(&reader, Filter::partition_changed());
    let loaded = reader
        .domain
        .load_resource(
            MODEL_URI,
            ResourceOptions::AS_URI | ResourceOptions::DONT_AUTO_LOAD_UNITS,
        )
        .unwrap();
    let logical = reader.domain.logical(loaded).unwrap();
    assert!(logical.is_separate(&tree.b));
    assert!(!logical.is_loaded(&tree.b));
    assert!(!reader.domain.contains(&tree.c));

    logical.load(&tree.b).unwrap();
    assert!(logical.is_loaded(&tree.b));
    assert!(reader.domain.contains(&tree.c));
    assert_eq!(name_of(&reader, &tree.b).as_deref(), Some("beta"));
    assert_eq!(demux.handler().entries(), vec!["unit loaded b"]);

    logical.load(&tree.b).unwrap();
    assert_eq!(demux.handler().entries().len(), 1, "loading twice is a no-op");
}

#[test]
fn unload_then_reload_restores_contents() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    f.domain.save_resource(res, ResourceOptions::empty()).unwrap();
    let demux = journal(&f, Filter::resource_loaded_changed());

    f.domain.unload_resource(res).unwrap();
    assert!(!f.domain.is_loaded(res));
    assert!(!f.domain.contains(&tree.root));
    assert!(f.domain.intervals().is_empty(), "unloading flushes the history");

    let again = f.domain.load_resource(MODEL_URI, ResourceOptions::AS_URI).unwrap();
    assert_eq!(again, res);
    assert!(f.domain.contains(&tree.c));
    assert_eq!(demux.handler().entries(), vec!["loaded"]);

    let same = f.domain.load_resource(MODEL_URI, ResourceOptions::AS_URI).unwrap();
    assert_eq!(same, res);
    assert_eq!(demux.handler().entries().len(), 1);
}

#[test]
fn save_as_renames_and_reports_save() {
    let store = Arc::new(MemoryStore::new());
    let f = fixture_with(DomainConfig::default().with_store(store.clone()));
    let res = f.resource(MODEL_URI);
    f.tree(res);
    let demux = journal(&f, Filter::resource_modified_changed());

    f.domain
        .save_resource_as(res, "mem:/renamed.json", ResourceOptions::AS_URI)
        .unwrap();
    assert_eq!(f.domain.resource_uri(res), Some(Uri::new("mem:/renamed.json")));
    assert_eq!(f.domain.find_resource(&Uri::new(MODEL_URI)), None);
    assert!(store.exists(&Uri::new("mem:/renamed.json")));
    assert_eq!(demux.handler().entries(), vec!["saved", "saved"]);
}

#[test]
fn save_as_onto_existing_resource_fails() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    f.resource("mem:/other.json");
    assert!(matches!(
        f.domain
            .save_resource_as(res, "mem:/other.json", ResourceOptions::AS_URI),
        Err(DomainError::ResourceExists(_))
    ));
}

#[test]
fn read_only_units_need_overwrite_option() {
    let store = Arc::new(MemoryStore::new());
    let f = fixture_with(DomainConfig::default().with_store(store.clone()));
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    f.domain.save_resource(res, ResourceOptions::empty()).unwrap();
    store.set_read_only(&Uri::new(MODEL_URI), true);

    f.domain
        .run_as_write("rename", |d| d.set(&tree.a, f.name, "renamed"))
        .unwrap();
    let refused = f.domain.save_resource(res, ResourceOptions::empty());
    assert!(matches!(
        refused,
        Err(DomainError::Save {
            source: InterchangeError::ReadOnly(_),
            ..
        })
    ));
    assert!(f.domain.is_modified(res));

    f.domain
        .save_resource(res, ResourceOptions::OVERWRITE_READONLY)
        .unwrap();
    assert!(!f.domain.is_modified(res));
}

/// JSON that may only be read.
struct ReadOnlyJson;

impl ResourceFormat for ReadOnlyJson {
    fn name(&self) -> &'static str {
        "read-only JSON"
    }

    fn capabilities(&self) -> FormatCapability {
        FormatCapability::READ_ONLY
    }

    fn read(&self, input: &[u8]) -> Result<UnitSnapshot, InterchangeError> {
        JsonFormat.read(input)
    }

    fn write(&self, _unit: &UnitSnapshot) -> Result<Vec<u8>, InterchangeError> {
        Err(InterchangeError::Unsupported("writing".to_string()))
    }
}

#[test]
fn format_without_write_support_refuses_save() {
    let store = Arc::new(MemoryStore::new());
    let writer = fixture_with(DomainConfig::default().with_store(store.clone()));
    let res = writer.resource(MODEL_URI);
    let tree = writer.tree(res);
    writer.domain.save_resource(res, ResourceOptions::empty()).unwrap();

    let config = DomainConfig::default()
        .with_store(store.clone())
        .with_format(Arc::new(ReadOnlyJson));
    let reader = fixture_with(config);
    let loaded = reader
        .domain
        .load_resource(MODEL_URI, ResourceOptions::AS_URI)
        .unwrap();
    assert!(reader.domain.contains(&tree.c));
    assert!(matches!(
        reader.domain.save_resource(loaded, ResourceOptions::empty()),
        Err(DomainError::Save {
            source: InterchangeError::Unsupported(_),
            ..
        })
    ));
}

#[rstest]
#[case::missing(None)]
#[case::garbage(Some(&b"not a model"[..]))]
fn failed_load_aborts_without_trace(#[case] bytes: Option<&[u8]>) {
    let store = Arc::new(MemoryStore::new());
    let uri = Uri::new("mem:/broken.json");
    if let Some(bytes) = bytes {
        store.write(&uri, bytes).unwrap();
    }
    let f = fixture_with(DomainConfig::default().with_store(store));
    let result = f.domain.load_resource(uri.as_str(), ResourceOptions::AS_URI);
    assert!(matches!(result, Err(DomainError::AbortResourceLoad { .. })));
    assert_eq!(f.domain.find_resource(&uri), None);
}

#[test]
fn duplicate_resource_is_refused() {
    let f = fixture();
    f.resource(MODEL_URI);
    assert!(matches!(
        f.domain.create_resource(MODEL_URI, ResourceOptions::AS_URI),
        Err(DomainError::ResourceExists(_))
    ));
}

#[test]
fn plain_paths_become_file_uris() {
    let f = fixture();
    let res = f
        .domain
        .create_resource("/work/model.json", ResourceOptions::empty())
        .unwrap();
    assert_eq!(f.domain.resource_uri(res), Some(Uri::new("file:///work/model.json")));
}

// ── Path variables ──────────────────────────────────────────────────

#[test]
fn path_variables_redirect_storage() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture_with(DomainConfig::default().with_store(Arc::new(FileStore::new(dir.path()))));
    let base = format!("file://{}/models", dir.path().display());
    f.domain.set_path_variable("MODELS", &base);
    assert_eq!(f.domain.get_path_variable("MODELS"), base);

    let logical_uri = Uri::new("pathmap://MODELS/m.json");
    let physical = Uri::new(format!("{base}/m.json"));
    assert_eq!(f.domain.convert_uri(&logical_uri), physical);
    assert_eq!(f.domain.deresolve_uri(&physical), logical_uri);

    let res = f.resource(logical_uri.as_str());
    f.tree(res);
    f.domain.save_resource(res, ResourceOptions::empty()).unwrap();
    assert!(dir.path().join("models").join("m.json").is_file());
    assert_eq!(f.domain.resource_uri(res), Some(logical_uri.clone()));

    assert!(f.domain.remove_path_variable("MODELS"));
    assert_eq!(f.domain.get_path_variable("MODELS"), "");
    assert_eq!(f.domain.convert_uri(&logical_uri), logical_uri);
}

// ── Imports ─────────────────────────────────────────────────────────

#[test]
fn cross_references_import_resources() {
    let f = fixture();
    let a = f.resource("mem:/a.json");
    let b = f.resource("mem:/b.json");
    let c = f.resource("mem:/c.json");
    let (ra, rb, rc) = f
        .domain
        .run_as_write("roots", |d| {
            let ra = d.create_with_id(f.node, "ra")?;
            let rb = d.create_with_id(f.node, "rb")?;
            let rc = d.create_with_id(f.node, "rc")?;
            d.add_root(a, &ra)?;
            d.add_root(b, &rb)?;
            d.add_root(c, &rc)?;
            Ok::<_, DomainError>((ra, rb, rc))
        })
        .unwrap()
        .value;
    let demux = journal(&f, Filter::resource_imports_changed());

    f.domain
        .run_as_write("link", |d| {
            d.add(&ra, f.refs, &rb)?;
            d.add(&rb, f.refs, &rc)
        })
        .unwrap();
    assert_eq!(f.domain.imports(a), vec![b]);
    assert_eq!(f.domain.exports(b), vec![a]);
    assert_eq!(f.domain.all_imports(a), vec![b, c]);
    assert_eq!(f.domain.all_exports(c), vec![a, b]);
    assert_eq!(
        demux.handler().entries(),
        vec!["imported", "exported", "imported", "exported"]
    );

    f.domain
        .run_as_write("unlink", |d| d.remove(&ra, f.refs, &rb))
        .unwrap();
    assert!(f.domain.imports(a).is_empty());
    assert_eq!(f.domain.all_exports(c), vec![b]);
    assert_eq!(demux.handler().entries().len(), 6);
}

// ── Demultiplexing ──────────────────────────────────────────────────

#[test]
fn replacing_single_containment_creates_and_deletes() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let demux = journal(&f, Filter::element_changed());

    f.domain
        .run_as_write("first", |d| {
            let x = d.create_with_id(f.node, "x")?;
            d.set(&tree.root, f.child, &x)
        })
        .unwrap();
    f.domain
        .run_as_write("replace", |d| {
            let y = d.create_with_id(f.node, "y")?;
            d.set(&tree.root, f.child, &y)
        })
        .unwrap();
    assert_eq!(
        demux.handler().entries(),
        vec!["created x in root", "created y in root", "deleted x from root"]
    );
}

#[test]
fn resource_events_reach_the_handler() {
    let f = fixture();
    let demux = journal(&f, Filter::demuxable());
    let res = f.resource(MODEL_URI);
    f.tree(res);
    f.domain.save_resource(res, ResourceOptions::empty()).unwrap();

    let entries = demux.handler().entries();
    assert_eq!(entries.first().map(String::as_str), Some("loaded"));
    assert!(entries.contains(&"root added root".to_string()));
    assert!(entries.contains(&"dirtied".to_string()));
    assert_eq!(entries.last().map(String::as_str), Some("saved"));
}
