//! Architecture Layer Dependency Tests
//!
//! These tests enforce the layering of the crate's top-level modules:
//!
//! ```text
//! domain            (façade: everything below)
//!   ↓
//! logical           (base, model, notify, domain handle)
//!   ↓
//! interchange       (base, model)
//! undo              (base, model)
//! action            (base)
//!   ↓
//! model ⇄ notify    (applying a change produces its notification)
//!   ↓
//! base              (no crate imports)
//! ```

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use std::path::{Path, PathBuf};

const MODULES: &[&str] = &[
    "base",
    "model",
    "notify",
    "action",
    "undo",
    "interchange",
    "logical",
    "domain",
];

fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// `crate::<module>` paths used outside comments and test modules.
fn crate_imports(file: &Path) -> Vec<(usize, String)> {
    let content = std::fs::read_to_string(file).unwrap();
    let mut out = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        let mut rest = line;
        while let Some(idx) = rest.find("crate::") {
            rest = &rest[idx + "crate::".len()..];
            let module: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if MODULES.contains(&module.as_str()) {
                out.push((line_no + 1, module));
            }
        }
    }
    out
}

fn collect_layer_violations(layer: &str, allowed: &[&str]) -> Vec<String> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer);
    rust_files(&dir)
        .iter()
        .flat_map(|file| {
            crate_imports(file)
                .into_iter()
                .filter(|(_, module)| module != layer && !allowed.contains(&module.as_str()))
                .map(move |(line, module)| format!("  {}:{line} uses crate::{module}", file.display()))
        })
        .collect()
}

#[rstest]
#[case::base("base", &[])]
#[case::model("model", &["base", "notify"])]
#[case::notify("notify", &["base", "model"])]
#[case::action("action", &["base"])]
#[case::undo("undo", &["base", "model"])]
#[case::interchange("interchange", &["base", "model"])]
#[case::logical("logical", &["base", "model", "notify", "domain"])]
fn test_layer_dependencies(#[case] layer: &str, #[case] allowed: &[&str]) {
    let violations = collect_layer_violations(layer, allowed);
    assert!(
        violations.is_empty(),
        "\n❌ {layer} may only depend on {allowed:?}.\nViolations:\n{}\n",
        violations.join("\n")
    );
}

#[test]
fn test_every_layer_is_checked() {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut dirs: Vec<String> = std::fs::read_dir(&src)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    dirs.sort();
    let mut expected: Vec<String> = MODULES.iter().map(|m| m.to_string()).collect();
    expected.sort();
    assert_eq!(dirs, expected, "a new top-level module needs a layering rule");
}
