//! Hotspot fusion, severity classification, project quality score, Gini of
//! per-function complexity, complexity-trend direction.
//!
//! Ported from `weave_quality/hotspots.py` with identical constants.

use crate::models::{ComplexityTrend, FileEntry, FunctionCC, GitStats};
use std::collections::BTreeMap;

pub const HOTSPOT_THRESHOLD: f64 = 0.5;
pub const CC_CRITICAL: f64 = 30.0;
pub const CC_WARNING: f64 = 15.0;
pub const FUNCTION_CC_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

fn minmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Intersects `entries`/`stats` on `path`, min-max normalizes complexity and
/// churn across the common set, and writes `hotspot = round(c' * h', 4)` into
/// the matching `GitStats` in place. Returns the updated stats (all of them,
/// not just the fused subset — paths absent from `entries` keep `hotspot = 0`
/// per the data-model invariant).
pub fn compute_hotspots(entries: &[FileEntry], stats: &[GitStats]) -> Vec<GitStats> {
    let entries_by_path: BTreeMap<&str, &FileEntry> =
        entries.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut common_paths: Vec<&str> = stats
        .iter()
        .map(|s| s.path.as_str())
        .filter(|p| entries_by_path.contains_key(p))
        .collect();
    common_paths.sort();

    let complexities: Vec<f64> = common_paths
        .iter()
        .map(|p| entries_by_path[p].cyclomatic_complexity)
        .collect();
    let churns: Vec<f64> = common_paths
        .iter()
        .map(|p| stats.iter().find(|s| s.path == **p).unwrap().churn as f64)
        .collect();

    let norm_c = minmax(&complexities);
    let norm_h = minmax(&churns);
    let scores: BTreeMap<&str, f64> = common_paths
        .iter()
        .zip(norm_c.iter().zip(norm_h.iter()))
        .map(|(p, (c, h))| (*p, (c * h * 10000.0).round() / 10000.0))
        .collect();

    stats
        .iter()
        .cloned()
        .map(|mut s| {
            s.hotspot = *scores.get(s.path.as_str()).unwrap_or(&0.0);
            s
        })
        .collect()
}

/// Top-N stats with `hotspot > threshold`, descending by hotspot.
pub fn rank_hotspots(stats: &[GitStats], threshold: f64, top_n: usize) -> Vec<GitStats> {
    let mut filtered: Vec<GitStats> = stats.iter().filter(|s| s.hotspot > threshold).cloned().collect();
    filtered.sort_by(|a, b| b.hotspot.partial_cmp(&a.hotspot).unwrap());
    filtered.truncate(top_n);
    filtered
}

pub fn classify_complexity(complexity: f64) -> Severity {
    if complexity >= CC_CRITICAL {
        Severity::Critical
    } else if complexity >= CC_WARNING {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

pub fn classify_hotspot(hotspot: f64) -> Severity {
    if hotspot > 0.75 {
        Severity::Critical
    } else if hotspot > HOTSPOT_THRESHOLD {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// A function's complexity exceeds the per-function threshold unless it is a
/// dispatch function (switch/match or flat if/elif chain), which is exempt.
pub fn function_exceeds_threshold(f: &FunctionCC) -> bool {
    f.complexity > FUNCTION_CC_THRESHOLD && !f.is_dispatch
}

/// `100 - 5*|hotspot>0.5| - 3*|complexity>=30| - 1*|15<=complexity<30|`, clamped to `[0,100]`.
pub fn compute_quality_score(entries: &[FileEntry], stats: &[GitStats]) -> i64 {
    let stats_by_path: BTreeMap<&str, &GitStats> = stats.iter().map(|s| (s.path.as_str(), s)).collect();
    let mut score = 100.0f64;
    for s in stats {
        if s.hotspot > HOTSPOT_THRESHOLD {
            score -= 5.0;
        }
    }
    for e in entries {
        let _ = stats_by_path.get(e.path.as_str());
        match classify_complexity(e.cyclomatic_complexity) {
            Severity::Critical => score -= 3.0,
            Severity::Warning => score -= 1.0,
            Severity::Ok => {}
        }
    }
    score.clamp(0.0, 100.0).round() as i64
}

/// Gini coefficient of per-function complexity within one file.
/// `G = (sum((2i - n - 1) * c_i)) / (n * total)` over ascending-sorted `c_i`
/// (1-indexed `i`); 0 when `n <= 1` or `total == 0`.
pub fn cc_gini(functions: &[FunctionCC]) -> f64 {
    let n = functions.len();
    if n <= 1 {
        return 0.0;
    }
    let mut ccs: Vec<f64> = functions.iter().map(|f| f.complexity).collect();
    ccs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let total: f64 = ccs.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let n_f = n as f64;
    let cumulative: f64 = ccs
        .iter()
        .enumerate()
        .map(|(idx, c)| (2.0 * (idx as f64 + 1.0) - n_f - 1.0) * c)
        .sum();
    cumulative / (n_f * total)
}

const CC_HISTOGRAM_BUCKETS: &[(f64, f64)] = &[
    (1.0, 5.0),
    (6.0, 10.0),
    (11.0, 15.0),
    (16.0, 20.0),
    (21.0, 30.0),
    (31.0, f64::INFINITY),
];
pub const CC_HISTOGRAM_LABELS: &[&str] = &["1-5", "6-10", "11-15", "16-20", "21-30", "31+"];

/// Bucket counts of per-function complexity, for `functions` report summaries.
pub fn cc_histogram(functions: &[FunctionCC]) -> Vec<i64> {
    let mut counts = vec![0i64; CC_HISTOGRAM_BUCKETS.len()];
    for f in functions {
        for (idx, (lo, hi)) in CC_HISTOGRAM_BUCKETS.iter().enumerate() {
            if f.complexity >= *lo && f.complexity <= *hi {
                counts[idx] += 1;
                break;
            }
        }
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Deteriorating,
    Refactored,
    Stable,
}

const TREND_DEADBAND: f64 = 0.03;

/// Simple linear regression slope over chronological per-scan complexities,
/// classified by relative slope (`slope / mean`) against a ±3% dead-band.
pub fn trend_direction(points: &[ComplexityTrend]) -> TrendDirection {
    if points.len() < 2 {
        return TrendDirection::Stable;
    }
    let n = points.len() as f64;
    let xs: Vec<f64> = (0..points.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.complexity).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let numerator: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let denominator: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if denominator == 0.0 || mean_y == 0.0 {
        return TrendDirection::Stable;
    }
    let slope = numerator / denominator;
    let relative = slope / mean_y;
    if relative > TREND_DEADBAND {
        TrendDirection::Deteriorating
    } else if relative < -TREND_DEADBAND {
        TrendDirection::Refactored
    } else {
        TrendDirection::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, complexity: f64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            cyclomatic_complexity: complexity,
            ..Default::default()
        }
    }

    fn stats(path: &str, churn: i64) -> GitStats {
        GitStats {
            path: path.to_string(),
            churn,
            ..Default::default()
        }
    }

    #[test]
    fn two_file_fusion_hits_boundaries() {
        let entries = vec![entry("a", 20.0), entry("b", 5.0)];
        let git = vec![stats("a", 100), stats("b", 10)];
        let fused = compute_hotspots(&entries, &git);
        let a = fused.iter().find(|s| s.path == "a").unwrap();
        let b = fused.iter().find(|s| s.path == "b").unwrap();
        assert_eq!(a.hotspot, 1.0);
        assert_eq!(b.hotspot, 0.0);
    }

    #[test]
    fn quality_score_monotonic_on_single_hotspot() {
        let entries = vec![entry("a", 5.0)];
        let baseline = vec![stats("a", 1)];
        let mut hot = stats("a", 1);
        hot.hotspot = 0.9;
        let score_base = compute_quality_score(&entries, &baseline);
        let score_hot = compute_quality_score(&entries, &[hot]);
        assert_eq!(score_base - score_hot, 5);
    }

    #[test]
    fn gini_zero_for_uniform_or_singleton() {
        let single = vec![FunctionCC {
            path: "a".into(),
            scan_id: 1,
            function_name: "f".into(),
            line_start: 1,
            line_end: 2,
            complexity: 5.0,
            essential_complexity: 1.0,
            is_dispatch: false,
        }];
        assert_eq!(cc_gini(&single), 0.0);
    }

    #[test]
    fn trend_classifies_deteriorating() {
        let points: Vec<ComplexityTrend> = (0..5)
            .map(|i| ComplexityTrend {
                path: "a".into(),
                scan_id: i,
                complexity: 10.0 + i as f64 * 5.0,
                essential_complexity: 1.0,
            })
            .collect();
        assert_eq!(trend_direction(&points), TrendDirection::Deteriorating);
    }

    #[test]
    fn trend_stable_with_fewer_than_two_points() {
        assert_eq!(trend_direction(&[]), TrendDirection::Stable);
    }

    #[test]
    fn function_dispatch_exempt_from_threshold() {
        let f = FunctionCC {
            path: "a".into(),
            scan_id: 1,
            function_name: "dispatch".into(),
            line_start: 1,
            line_end: 20,
            complexity: 15.0,
            essential_complexity: 1.0,
            is_dispatch: true,
        };
        assert!(!function_exceeds_threshold(&f));
    }
}
