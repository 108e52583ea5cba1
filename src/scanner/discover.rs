//! Candidate file discovery: source-control listing first, filesystem walk
//! as fallback.
//!
//! Grounded on `lnds-kimun`'s `walk.rs` (`globset`/`ignore` combination) and
//! the teacher's `git/history.rs` tree-walk idiom for the tracked-file half.

use git2::{Repository, StatusOptions};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::Path;

const VENDOR_DIRS: &[&str] = &[".git", "target", "node_modules", "vendor", "dist", "build", ".weave"];

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

/// Discovers candidate files under `repo_root`, repo-relative, sorted and
/// deduplicated, with `exclude_globs` already applied.
pub fn discover_files(repo_root: &Path, exclude_globs: &[String]) -> Vec<String> {
    let globset = build_globset(exclude_globs);
    let mut paths: BTreeSet<String> = match Repository::open(repo_root) {
        Ok(repo) => source_control_listing(&repo),
        Err(_) => filesystem_walk(repo_root),
    };
    paths.retain(|p| !globset.is_match(p));
    paths.into_iter().collect()
}

/// Tracked files (via the index) plus untracked-but-not-ignored files (via
/// `git status`), matching "tracked + untracked respecting ignore rules".
fn source_control_listing(repo: &Repository) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if let Ok(index) = repo.index() {
        for entry in index.iter() {
            if let Ok(path) = String::from_utf8(entry.path.clone()) {
                out.insert(path);
            }
        }
    }
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    if let Ok(statuses) = repo.statuses(Some(&mut opts)) {
        for entry in statuses.iter() {
            if let Some(path) = entry.path() {
                out.insert(path.to_string());
            }
        }
    }
    out
}

fn filesystem_walk(repo_root: &Path) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut builder = WalkBuilder::new(repo_root);
    builder.hidden(true).git_ignore(true);
    for entry in builder.build().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.components().any(|c| {
            VENDOR_DIRS
                .iter()
                .any(|v| c.as_os_str().to_str() == Some(v))
        }) {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(repo_root) {
            if let Some(s) = rel.to_str() {
                out.insert(s.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globset_excludes_matching_paths() {
        let gs = build_globset(&["target/**".to_string(), "*.lock".to_string()]);
        assert!(gs.is_match("target/debug/foo"));
        assert!(gs.is_match("Cargo.lock"));
        assert!(!gs.is_match("src/main.rs"));
    }

    #[test]
    fn filesystem_walk_finds_files_and_skips_vendor_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/b.js"), "1").unwrap();
        let found = filesystem_walk(dir.path());
        assert!(found.contains("a.py"));
        assert!(!found.iter().any(|p| p.contains("node_modules")));
    }
}
