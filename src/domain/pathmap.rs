//! Path variables.
//!
//! A variable `NAME` maps the URI prefix `pathmap://NAME/` to a concrete
//! location, so references between units survive moving a model tree.
//! The table belongs to one domain; there is no process-wide instance.

use crate::base::Uri;
use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::debug;

#[derive(Debug, Default)]
pub struct PathMap {
    /// Values always end with `/`.
    variables: RwLock<IndexMap<SmolStr, String>>,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a variable. Empty names or values are ignored.
    pub fn set(&self, name: &str, value: &str) {
        if name.is_empty() || value.is_empty() {
            return;
        }
        let mut value = value.to_string();
        if !value.ends_with('/') {
            value.push('/');
        }
        debug!(name, value = %value, "set path variable");
        self.variables.write().insert(SmolStr::new(name), value);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.variables.write().shift_remove(name).is_some()
    }

    /// The value without its trailing `/`, or an empty string when unset.
    pub fn get(&self, name: &str) -> String {
        self.variables
            .read()
            .get(name)
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<SmolStr> {
        self.variables.read().keys().cloned().collect()
    }

    /// Resolve `pathmap://NAME/rest` through the table.
    ///
    /// URIs of other schemes, and pathmap URIs naming unknown variables,
    /// are returned unchanged.
    pub fn resolve(&self, uri: &Uri) -> Uri {
        let Some((name, rest)) = uri.pathmap_parts() else {
            return uri.clone();
        };
        match self.variables.read().get(name) {
            Some(value) => Uri::new(format!("{value}{rest}")),
            None => uri.clone(),
        }
    }

    /// Rewrite `uri` under the longest matching variable value back into
    /// `pathmap://NAME/...` form.
    pub fn deresolve(&self, uri: &Uri) -> Uri {
        let variables = self.variables.read();
        let best = variables
            .iter()
            .filter(|(_, value)| {
                let prefix = value.trim_end_matches('/');
                uri.as_str() == prefix || uri.starts_with(value)
            })
            .max_by_key(|(_, value)| value.len());
        match best {
            Some((name, value)) => {
                let rest = uri.as_str().get(value.len()..).unwrap_or("");
                Uri::new(format!("{}{rest}", Uri::pathmap(name)))
            }
            None => uri.clone(),
        }
    }
}
