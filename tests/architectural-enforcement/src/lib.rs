//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - `unsafe` is confined to the OS-boundary modules
//! - Only the process helper ends a process
//! - Production code propagates errors instead of unwrapping
//!
//! The helpers here walk the workspace sources; the rules live in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// One line of production code
#[derive(Debug)]
pub struct SourceLine {
    /// Path relative to the workspace root
    pub path: String,
    /// 1-based line number
    pub number: usize,
    /// The line with any `//` comment stripped
    pub code: String,
}

/// Every production line of every `.rs` file under `dir` (workspace-relative)
///
/// Comment-only lines are skipped, and scanning of a file stops at its
/// `#[cfg(test)]` module.
#[must_use]
pub fn production_lines(dir: &str) -> Vec<SourceLine> {
    let root = workspace_root();
    let base = root.join(dir);
    let mut lines = Vec::new();

    for entry in walkdir::WalkDir::new(&base)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };
        let relative = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .display()
            .to_string();

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("#[cfg(test)]") {
                break;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            let code = line.split("//").next().unwrap_or(line);
            lines.push(SourceLine {
                path: relative.clone(),
                number: idx + 1,
                code: code.to_string(),
            });
        }
    }
    lines
}

/// Whether `path` ends with one of `allowed` (workspace-relative suffixes)
#[must_use]
pub fn is_allowed(path: &str, allowed: &[&str]) -> bool {
    allowed.iter().any(|suffix| path.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_core_sources() {
        assert!(workspace_root().join("shuttle/core/src/lib.rs").exists());
    }

    #[test]
    fn test_production_lines_skip_comments() {
        let lines = production_lines("shuttle/core/src");
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| !l.code.trim_start().starts_with("//")));
    }

    #[test]
    fn test_is_allowed_matches_suffix() {
        assert!(is_allowed(
            "shuttle/core/src/transport/process.rs",
            &["transport/process.rs"]
        ));
        assert!(!is_allowed("shuttle/core/src/lib.rs", &["transport/process.rs"]));
    }
}
