//! Bounded single-pass history mining: batch churn/authors/age/ownership,
//! co-change within a bounded window, and blob-identity lookup for
//! incremental-scan change detection.
//!
//! Batch paths favor one revwalk over the whole pass; per-file fallbacks
//! (used when a batch pass errors) pay the cost of one pathspec-scoped
//! revwalk per file.

use crate::error::{QError, QResult};
use crate::models::{CoChange, GitStats};
use chrono::{DateTime, Duration, TimeZone, Utc};
use git2::{DiffOptions, Repository, Sort};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

pub const CO_CHANGE_MAX_COMMITS: usize = 500;
const CO_CHANGE_WINDOW_DAYS: i64 = 182;
const MINOR_THRESHOLD: f64 = 0.05;
const OWNERSHIP_MIN_AUTHORS: usize = 3;

pub fn open_repo(path: &Path) -> QResult<Repository> {
    Ok(Repository::discover(path)?)
}

pub fn head_id(repo: &Repository) -> QResult<String> {
    let head = repo.head()?;
    let oid = head.target().ok_or(QError::Missing)?;
    Ok(oid.to_string())
}

fn tree_entry_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}{name}")
    }
}

/// All tracked file paths at HEAD, forward-slash, repo-relative.
pub fn tracked_files(repo: &Repository) -> QResult<Vec<String>> {
    let head = repo.head()?;
    let tree = head.peel_to_tree()?;
    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            files.push(tree_entry_path(dir, entry.name().unwrap_or("")));
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(files)
}

/// Blob object id for every tracked file at HEAD, in one tree walk.
/// Untracked paths are simply absent from the map.
pub fn batch_blob_ids(repo: &Repository) -> QResult<HashMap<String, String>> {
    let head = repo.head()?;
    let tree = head.peel_to_tree()?;
    let mut map = HashMap::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            map.insert(tree_entry_path(dir, entry.name().unwrap_or("")), entry.id().to_string());
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(map)
}

#[derive(Default)]
struct AuthorHistory {
    counts: HashMap<String, i64>,
    last_seen: Option<DateTime<Utc>>,
}

fn compute_ownership(counts: &HashMap<String, i64>) -> (f64, i64) {
    if counts.len() <= 1 {
        return (1.0, 0);
    }
    let total: i64 = counts.values().sum();
    let top = counts.values().copied().max().unwrap_or(0);
    let ownership_fraction = if total > 0 { top as f64 / total as f64 } else { 1.0 };
    let minor_contributors = if counts.len() < OWNERSHIP_MIN_AUTHORS {
        0
    } else {
        counts
            .values()
            .filter(|&&c| total > 0 && (c as f64 / total as f64) < MINOR_THRESHOLD)
            .count() as i64
    };
    (ownership_fraction, minor_contributors)
}

fn commit_time(commit: &git2::Commit) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(commit.time().seconds(), 0).single()
}

/// One revwalk over the whole repository, accumulating per-author commit
/// counts and most-recent-commit time for every path in `target_files`.
/// Revwalk visits newest-first, so the first occurrence of a path is its
/// most recent touch.
pub fn batch_git_stats(repo: &Repository, target_files: &[String]) -> QResult<HashMap<String, GitStats>> {
    let targets: HashSet<&str> = target_files.iter().map(|s| s.as_str()).collect();
    let mut per_file: HashMap<String, AuthorHistory> = HashMap::new();

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;
    revwalk.push_head()?;

    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        let author = commit.author().name().unwrap_or("unknown").to_string();
        let when = commit_time(&commit);

        let tree = commit.tree()?;
        let parent_tree = commit.parent(0).ok().map(|p| p.tree()).transpose()?;
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path().and_then(|p| p.to_str()) {
                    if targets.contains(path) {
                        let entry = per_file.entry(path.to_string()).or_default();
                        *entry.counts.entry(author.clone()).or_insert(0) += 1;
                        if entry.last_seen.is_none() {
                            entry.last_seen = when;
                        }
                    }
                }
                true
            },
            None,
            None,
            None,
        )?;
    }

    let now = Utc::now();
    let mut results = HashMap::new();
    for fp in target_files {
        let Some(history) = per_file.get(fp) else {
            results.insert(fp.clone(), GitStats { path: fp.clone(), ..Default::default() });
            continue;
        };
        let churn: i64 = history.counts.values().sum();
        let authors = history.counts.len() as i64;
        let age_days = history.last_seen.map(|d| (now - d).num_days().max(0)).unwrap_or(0);
        let (ownership_fraction, minor_contributors) = compute_ownership(&history.counts);
        results.insert(
            fp.clone(),
            GitStats {
                path: fp.clone(),
                churn,
                authors,
                age_days,
                hotspot: 0.0,
                ownership_fraction,
                minor_contributors,
            },
        );
    }
    Ok(results)
}

/// Pathspec-scoped per-file revwalk, for the batch-failure fallback.
pub fn build_git_stats_single(repo: &Repository, filepath: &str) -> QResult<GitStats> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;
    revwalk.push_head()?;

    let mut counts: HashMap<String, i64> = HashMap::new();
    let mut last_seen: Option<DateTime<Utc>> = None;

    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;
        let parent_tree = commit.parent(0).ok().map(|p| p.tree()).transpose()?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.pathspec(filepath);
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
        if diff.deltas().len() == 0 {
            continue;
        }

        let author = commit.author().name().unwrap_or("unknown").to_string();
        *counts.entry(author).or_insert(0) += 1;
        if last_seen.is_none() {
            last_seen = commit_time(&commit);
        }
    }

    let now = Utc::now();
    let churn: i64 = counts.values().sum();
    let authors = counts.len() as i64;
    let age_days = last_seen.map(|d| (now - d).num_days().max(0)).unwrap_or(0);
    let (ownership_fraction, minor_contributors) = compute_ownership(&counts);
    Ok(GitStats {
        path: filepath.to_string(),
        churn,
        authors,
        age_days,
        hotspot: 0.0,
        ownership_fraction,
        minor_contributors,
    })
}

/// Batch pass first; on failure, falls back to one per-file revwalk each,
/// logging a single warning (not one per file).
pub fn enrich_all_git_stats(repo: &Repository, file_paths: &[String]) -> Vec<GitStats> {
    if file_paths.is_empty() {
        return Vec::new();
    }
    match batch_git_stats(repo, file_paths) {
        Ok(batch) => file_paths.iter().filter_map(|fp| batch.get(fp).cloned()).collect(),
        Err(e) => {
            warn!(error = %e, "batch git stats failed, falling back to per-file mode");
            file_paths
                .iter()
                .filter_map(|fp| build_git_stats_single(repo, fp).ok())
                .collect()
        }
    }
}

/// Bounded co-change pass: up to `CO_CHANGE_MAX_COMMITS` non-merge commits
/// within the last ~6 months, whichever bound hits first. Returns the top-N
/// pairs by count, plus a per-file ranked co-change map built from the same
/// pass (so `file_co_changes`-style lookups need no second pass).
pub fn compute_co_changes(repo: &Repository, top_n: usize) -> QResult<(Vec<CoChange>, HashMap<String, Vec<String>>)> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;
    revwalk.push_head()?;

    let cutoff = Utc::now() - Duration::days(CO_CHANGE_WINDOW_DAYS);
    let mut pair_counts: HashMap<(String, String), i64> = HashMap::new();
    let mut per_file: HashMap<String, HashMap<String, i64>> = HashMap::new();
    let mut seen = 0usize;

    for oid_result in revwalk {
        if seen >= CO_CHANGE_MAX_COMMITS {
            break;
        }
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        if commit.parent_count() > 1 {
            continue;
        }
        if let Some(when) = commit_time(&commit) {
            if when < cutoff {
                break;
            }
        }
        seen += 1;

        let tree = commit.tree()?;
        let parent_tree = commit.parent(0).ok().map(|p| p.tree()).transpose()?;
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut files: Vec<String> = Vec::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path().and_then(|p| p.to_str()) {
                    files.push(path.to_string());
                }
                true
            },
            None,
            None,
            None,
        )?;
        files.sort();
        files.dedup();

        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                *pair_counts.entry((files[i].clone(), files[j].clone())).or_insert(0) += 1;
            }
        }
        for f in &files {
            let entry = per_file.entry(f.clone()).or_default();
            for other in &files {
                if other != f {
                    *entry.entry(other.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    let mut pairs: Vec<CoChange> = pair_counts.into_iter().map(|((a, b), c)| CoChange::new(a, b, c)).collect();
    pairs.sort_by(|a, b| b.count.cmp(&a.count));
    pairs.truncate(top_n);

    let ranked: HashMap<String, Vec<String>> = per_file
        .into_iter()
        .map(|(f, counts)| {
            let mut v: Vec<(String, i64)> = counts.into_iter().collect();
            v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            (f, v.into_iter().map(|(p, _)| p).collect())
        })
        .collect();

    Ok((pairs, ranked))
}

/// Top-N co-changed neighbors of `filepath` from an already-computed map.
pub fn file_co_changes(ranked: &HashMap<String, Vec<String>>, filepath: &str, top_n: usize) -> Vec<String> {
    ranked
        .get(filepath)
        .map(|v| v.iter().take(top_n).cloned().collect())
        .unwrap_or_default()
}

/// Filesystem mtime as unix seconds, 0 if the file cannot be stat'd.
pub fn mtime_of(full_path: &Path) -> i64 {
    std::fs::metadata(full_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
