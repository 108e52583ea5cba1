//! Hot-zone / DB-path resolution and exclude-glob configuration.
//!
//! Grounded on `weave_quality/db.py::_resolve_db_path` (env-var precedence,
//! tmp-dir fallback) and the teacher's `src/cache/paths.rs` (dirs-based
//! resolution idiom).

use std::path::{Path, PathBuf};

pub const QUALITY_DB_NAME: &str = "quality.db";
pub const GRAPH_DB_NAME: &str = "brain.db";

/// Resolves the directory that holds `quality.db` / `brain.db`.
///
/// Precedence: explicit `hot_zone` argument, then `WV_HOT_ZONE`, then
/// `/dev/shm/weave` when it exists and is writable, else a repo-scoped
/// directory under the OS temp dir.
pub fn resolve_hot_zone(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(env_zone) = std::env::var("WV_HOT_ZONE") {
        if !env_zone.is_empty() {
            return PathBuf::from(env_zone);
        }
    }
    let shm = PathBuf::from("/dev/shm/weave");
    if shm.parent().map(|p| p.exists()).unwrap_or(false) {
        return shm;
    }
    std::env::temp_dir().join("weave")
}

pub fn quality_db_path(hot_zone: &Path) -> PathBuf {
    hot_zone.join(QUALITY_DB_NAME)
}

pub fn graph_db_path(hot_zone: &Path) -> PathBuf {
    if let Ok(explicit) = std::env::var("WV_DB") {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }
    hot_zone.join(GRAPH_DB_NAME)
}

/// Resolves the repository root: explicit arg, `REPO_ROOT` env var, else the
/// source-control root of the current directory.
pub fn resolve_repo_root(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));
    }
    if let Ok(env_root) = std::env::var("REPO_ROOT") {
        if !env_root.is_empty() {
            return Ok(PathBuf::from(env_root));
        }
    }
    let cwd = std::env::current_dir()?;
    let repo = git2::Repository::discover(&cwd)?;
    let root = repo
        .workdir()
        .map(|p| p.to_path_buf())
        .unwrap_or(cwd);
    Ok(root)
}

/// `WV_DISABLE_AUTOPRUNE`: when set, graph-store CLI calls skip auto-prune.
/// The scanner sets this for the duration of its own graph CLI calls.
pub fn autoprune_disabled() -> bool {
    std::env::var("WV_DISABLE_AUTOPRUNE").is_ok()
}

/// Parses `.weave/quality.conf`: an `[exclude]` section with one glob per
/// line; `#` comments and blank lines ignored. Absent file yields no globs.
pub fn load_exclude_globs(repo_root: &Path) -> Vec<String> {
    let conf_path = repo_root.join(".weave").join("quality.conf");
    let Ok(text) = std::fs::read_to_string(&conf_path) else {
        return Vec::new();
    };
    parse_exclude_conf(&text)
}

fn parse_exclude_conf(text: &str) -> Vec<String> {
    let mut globs = Vec::new();
    let mut in_exclude = false;
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_exclude = line.eq_ignore_ascii_case("[exclude]");
            continue;
        }
        if in_exclude {
            globs.push(line.to_string());
        }
    }
    globs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exclude_section_only() {
        let text = "# comment\n[exclude]\ntarget/**\n*.lock\n\n[other]\nnope\n";
        let globs = parse_exclude_conf(text);
        assert_eq!(globs, vec!["target/**".to_string(), "*.lock".to_string()]);
    }

    #[test]
    fn empty_conf_yields_no_globs() {
        assert!(parse_exclude_conf("").is_empty());
    }
}
