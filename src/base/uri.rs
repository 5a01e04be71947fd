//! URIs naming resources and physical storage units.
//!
//! The editing domain never interprets URIs beyond a few structural
//! operations: scheme detection, prefix tests for path-variable
//! substitution, and deriving sibling unit names. Everything else is the
//! business of the resource store.

use smol_str::SmolStr;
use std::fmt;

/// Scheme used for URIs that go through the path-variable table.
pub const PATHMAP_SCHEME: &str = "pathmap";

/// An absolute or relative resource URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(SmolStr);

impl Uri {
    pub fn new(uri: impl AsRef<str>) -> Self {
        Self(SmolStr::new(uri.as_ref()))
    }

    /// Convert a file-system path into a `file:` URI.
    ///
    /// Backslashes are normalized so Windows paths produce the same shape.
    pub fn from_file_path(path: &str) -> Self {
        let path = path.replace('\\', "/");
        if path.starts_with('/') {
            Self::new(format!("file://{path}"))
        } else {
            Self::new(format!("file:///{path}"))
        }
    }

    /// The URI registered for a path variable: `pathmap://NAME/`.
    pub fn pathmap(variable: &str) -> Self {
        Self::new(format!("{PATHMAP_SCHEME}://{variable}/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme, if the URI has one (`file`, `pathmap`, `mem`, ...).
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        if !first.is_ascii_alphabetic() {
            return None;
        }
        if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
            Some(scheme)
        } else {
            None
        }
    }

    pub fn is_pathmap(&self) -> bool {
        self.scheme() == Some(PATHMAP_SCHEME)
    }

    /// For `pathmap://NAME/rest`, the variable name and the remainder.
    pub fn pathmap_parts(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix("pathmap://")?;
        match rest.split_once('/') {
            Some((name, tail)) => Some((name, tail)),
            None => Some((rest, "")),
        }
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn ends_with_separator(&self) -> bool {
        self.0.ends_with('/')
    }

    /// The last path segment, without any query or fragment.
    pub fn last_segment(&self) -> Option<&str> {
        let path = self.0.split(['?', '#']).next().unwrap_or("");
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Derive a sibling URI by suffixing the last segment's stem.
    ///
    /// `mem:/model.json` with suffix `part` becomes `mem:/model_part.json`.
    pub fn with_stem_suffix(&self, suffix: &str) -> Self {
        let (head, last) = match self.0.rsplit_once('/') {
            Some((head, last)) => (format!("{head}/"), last),
            None => (String::new(), self.0.as_str()),
        };
        match last.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                Self::new(format!("{head}{stem}_{suffix}.{ext}"))
            }
            _ => Self::new(format!("{head}{last}_{suffix}")),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
