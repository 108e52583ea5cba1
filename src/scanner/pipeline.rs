//! The 14-step scan orchestrator.
//!
//! Grounded on `original_source/weave_quality/__main__.py`'s `cmd_scan` step
//! order and the teacher's `cli/analyze.rs` pipeline shape, generalized to
//! this system's incremental/carry-forward persistence model.

use crate::analysis;
use crate::config;
use crate::db;
use crate::error::QResult;
use crate::githist;
use crate::hotspot;
use crate::models::{CKMetrics, ComplexityTrend, FileEntry, FileState, FunctionCC};
use crate::util::ScanLock;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use super::discover;

const TOP_CO_CHANGE: usize = 20;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub files_scanned: i64,
    pub files_changed: i64,
    pub duration_ms: i64,
    pub hotspot_count: i64,
    pub quality_score: i64,
    pub language_counts: BTreeMap<String, i64>,
}

struct AnalyzedFile {
    entry: FileEntry,
    ck: Option<CKMetrics>,
    functions: Vec<FunctionCC>,
}

/// Runs one full scan. `extra_excludes` are CLI-provided globs merged with
/// the config file's `[exclude]` section.
pub fn run_scan(repo_root: &Path, hot_zone: &Path, extra_excludes: &[String]) -> QResult<ScanSummary> {
    let started = Instant::now();

    // 1. Exclusive lock, held for the lifetime of this function.
    let _lock = ScanLock::acquire(hot_zone, "quality")?;

    // 2. repo_root is resolved by the caller (config::resolve_repo_root).

    // 3. Exclude globs: config file merged with CLI-provided globs.
    let mut globs = config::load_exclude_globs(repo_root);
    globs.extend(extra_excludes.iter().cloned());

    // 4. Discover candidate files.
    let candidates = discover::discover_files(repo_root, &globs);

    let git_repo = githist::open_repo(repo_root)?;
    let head = githist::head_id(&git_repo)?;

    let db_path = config::quality_db_path(hot_zone);
    let mut conn = db::open(&db_path)?;
    let latest_before = db::latest_scan(&conn)?;

    let tx = conn.transaction()?;

    // 5. Begin a scan row.
    let scanned_at = Utc::now().to_rfc3339();
    let scan_id = db::begin_scan(&tx, &head, &scanned_at)?;

    // 6. Batch blob identities, partition changed/unchanged.
    let blob_ids = githist::batch_blob_ids(&git_repo)?;
    let mut changed: Vec<String> = Vec::new();
    let mut unchanged: Vec<String> = Vec::new();
    let mut mtimes: BTreeMap<String, i64> = BTreeMap::new();
    for path in &candidates {
        let full = repo_root.join(path);
        let mtime = githist::mtime_of(&full);
        mtimes.insert(path.clone(), mtime);
        let blob_id = blob_ids.get(path).cloned().unwrap_or_default();
        if db::file_changed(&tx, path, mtime, &blob_id)? {
            changed.push(path.clone());
        } else {
            unchanged.push(path.clone());
        }
    }

    // 7. Analyze changed files (computation fanned out, writes serialized).
    let analyzed: Vec<AnalyzedFile> = changed
        .par_iter()
        .map(|path| {
            let full = repo_root.join(path);
            let source = std::fs::read_to_string(&full).unwrap_or_default();
            let result = analysis::analyze_file(path, &source, scan_id);
            AnalyzedFile {
                entry: result.entry,
                ck: result.ck,
                functions: result.functions,
            }
        })
        .collect();

    let mut current_entries: Vec<FileEntry> = Vec::new();
    let mut language_counts: BTreeMap<String, i64> = BTreeMap::new();
    for a in analyzed {
        *language_counts.entry(a.entry.language.as_str().to_string()).or_insert(0) += 1;
        db::upsert_file_entry(&tx, &a.entry)?;
        if let Some(ck) = &a.ck {
            db::upsert_ck_metrics(&tx, ck)?;
        }
        db::bulk_upsert_function_cc(&tx, &a.functions)?;
        db::upsert_complexity_trend(
            &tx,
            &ComplexityTrend {
                path: a.entry.path.clone(),
                scan_id,
                complexity: a.entry.cyclomatic_complexity,
                essential_complexity: a.entry.essential_complexity,
            },
        )?;
        current_entries.push(a.entry);
    }

    // 8. Carry forward unchanged files from the scan that was current before
    // this one began.
    if let Some(from) = latest_before.as_ref().map(|m| m.id) {
        for path in &unchanged {
            if db::carry_forward_file_entry(&tx, path, from, scan_id)? {
                db::carry_forward_file_metrics(&tx, path, from, scan_id)?;
                if let Some(entry) = db::get_file_entry(&tx, path, scan_id)? {
                    *language_counts.entry(entry.language.as_str().to_string()).or_insert(0) += 1;
                    db::upsert_complexity_trend(
                        &tx,
                        &ComplexityTrend {
                            path: path.clone(),
                            scan_id,
                            complexity: entry.cyclomatic_complexity,
                            essential_complexity: entry.essential_complexity,
                        },
                    )?;
                    current_entries.push(entry);
                }
            }
        }
    }

    // 9. Update FileState for every scanned file using the already-fetched
    // blob map (no new sub-invocation per file).
    let all_paths: Vec<String> = candidates.clone();
    let states: Vec<FileState> = all_paths
        .iter()
        .map(|path| FileState {
            path: path.clone(),
            mtime: *mtimes.get(path).unwrap_or(&0),
            content_id: blob_ids.get(path).cloned().unwrap_or_default(),
        })
        .collect();
    db::bulk_upsert_file_state(&tx, &states)?;

    // 10. History miner over the union of changed and unchanged.
    let stats = githist::enrich_all_git_stats(&git_repo, &all_paths);
    let (co_changes, _ranked) = githist::compute_co_changes(&git_repo, TOP_CO_CHANGE)?;

    // 11. Fuse hotspots.
    let fused_stats = hotspot::compute_hotspots(&current_entries, &stats);
    let hotspot_count = fused_stats
        .iter()
        .filter(|s| s.hotspot > hotspot::HOTSPOT_THRESHOLD)
        .count() as i64;
    let quality_score = hotspot::compute_quality_score(&current_entries, &fused_stats);

    // 12. Persist GitStats and CoChange.
    db::bulk_upsert_git_stats(&tx, &fused_stats)?;
    db::bulk_upsert_co_changes(&tx, &co_changes)?;

    // 13. Finish the scan and commit the whole transaction.
    let duration_ms = started.elapsed().as_millis() as i64;
    db::finish_scan(&tx, scan_id, candidates.len() as i64, duration_ms)?;
    tx.commit()?;

    // 14. Summary.
    Ok(ScanSummary {
        scan_id,
        files_scanned: candidates.len() as i64,
        files_changed: changed.len() as i64,
        duration_ms,
        hotspot_count,
        quality_score,
        language_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success());
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["config", "user.email", "a@b.c"]);
        git(dir.path(), &["config", "user.name", "a"]);
        dir
    }

    #[test]
    fn rescan_with_no_changes_reports_zero_changed() {
        let dir = init_repo();
        std::fs::write(dir.path().join("a.py"), "def f():\n    if True:\n        pass\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "init"]);

        let hot_zone = tempfile::tempdir().unwrap();
        let first = run_scan(dir.path(), hot_zone.path(), &[]).unwrap();
        assert_eq!(first.files_changed, 1);

        let second = run_scan(dir.path(), hot_zone.path(), &[]).unwrap();
        assert_eq!(second.files_changed, 0);
        assert_eq!(second.files_scanned, 1);
        assert_eq!(second.quality_score, first.quality_score);
    }
}
