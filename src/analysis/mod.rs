//! Static analysis dispatch: language detection, then per-family analyzer.

pub mod heuristic;
pub mod python;

use crate::models::{CKMetrics, FileEntry, FunctionCC, Language};

const PYTHON_SHEBANG: &str = r"(?i)^#!\s*/(?:usr/)?(?:bin/)?(?:env\s+)?python[0-9.]*\b";
const SHELL_SHEBANG: &str = r"(?i)^#!\s*/(?:usr/)?(?:bin/)?(?:env\s+)?(?:ba|da)?sh\b";

/// The result of analyzing one file.
pub struct AnalysisResult {
    pub entry: FileEntry,
    pub ck: Option<CKMetrics>,
    pub functions: Vec<FunctionCC>,
}

/// Detect a file's language family from its extension, falling back to a
/// shebang sniff (first 256 bytes) for extensionless files.
pub fn detect_language(path: &str, source: &str) -> Language {
    let lower = path.to_lowercase();
    if lower.ends_with(".py") || lower.ends_with(".pyi") {
        return Language::Structured;
    }
    if lower.ends_with(".sh") || lower.ends_with(".bash") {
        return Language::Heuristic;
    }
    if !path.rsplit('/').next().unwrap_or(path).contains('.') {
        let head: String = source.chars().take(256).collect();
        let first_line = head.lines().next().unwrap_or("");
        if regex_lazy(PYTHON_SHEBANG).is_match(first_line) {
            return Language::Structured;
        }
        if regex_lazy(SHELL_SHEBANG).is_match(first_line) {
            return Language::Heuristic;
        }
    }
    Language::Unknown
}

fn regex_lazy(pattern: &str) -> regex::Regex {
    regex::Regex::new(pattern).expect("static shebang pattern is valid")
}

/// Analyze one file's source, dispatching on detected language. Unknown
/// languages get a bare FileEntry with defaulted metrics (loc still counted).
pub fn analyze_file(path: &str, source: &str, scan_id: i64) -> AnalysisResult {
    match detect_language(path, source) {
        Language::Structured => match python::analyze(source, path, scan_id) {
            Some(result) => result,
            None => heuristic::analyze(source, path, scan_id, Language::Structured),
        },
        Language::Heuristic => heuristic::analyze(source, path, scan_id, Language::Heuristic),
        Language::Unknown => AnalysisResult {
            entry: FileEntry {
                path: path.to_string(),
                scan_id,
                language: Language::Unknown,
                loc: count_loc(source, "#"),
                ..Default::default()
            },
            ck: None,
            functions: Vec::new(),
        },
    }
}

/// Non-empty, non-comment line count, comments identified by `comment_prefix`.
pub fn count_loc(source: &str, comment_prefix: &str) -> i64 {
    source
        .lines()
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with(comment_prefix)
        })
        .count() as i64
}

/// Standard deviation of `leading_spaces / indent_width` across non-empty,
/// non-comment lines (tabs count as one level regardless of width). Fewer
/// than 2 qualifying lines yields 0.
pub fn indent_sd(source: &str, comment_prefix: &str, indent_width: usize) -> f64 {
    let levels: Vec<f64> = source
        .lines()
        .filter_map(|l| {
            let t = l.trim_start();
            if t.is_empty() || t.starts_with(comment_prefix) {
                return None;
            }
            let mut spaces = 0usize;
            let mut tabs = 0usize;
            for c in l.chars() {
                match c {
                    ' ' => spaces += 1,
                    '\t' => tabs += 1,
                    _ => break,
                }
            }
            Some(tabs as f64 + (spaces as f64 / indent_width as f64))
        })
        .collect();
    if levels.len() < 2 {
        return 0.0;
    }
    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    let variance = levels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / levels.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_python_by_extension() {
        assert_eq!(detect_language("foo/bar.py", ""), Language::Structured);
    }

    #[test]
    fn detects_shell_by_shebang_without_extension() {
        let src = "#!/usr/bin/env bash\necho hi\n";
        assert_eq!(detect_language("myscript", src), Language::Heuristic);
    }

    #[test]
    fn unrecognized_extension_is_unknown() {
        assert_eq!(detect_language("notes.txt", ""), Language::Unknown);
    }

    #[test]
    fn indent_sd_zero_below_two_lines() {
        assert_eq!(indent_sd("one line\n", "#", 4), 0.0);
    }
}
