//! Line-oriented regex analyzer for POSIX shell and as the structured
//! analyzer's parse-failure fallback. Produces a FileEntry only — no
//! CKMetrics, no FunctionCC (the data the EAV table would hold for a
//! heuristic-analyzed file simply does not exist).

use super::AnalysisResult;
use crate::models::{FileEntry, Language};
use regex::Regex;
use std::sync::OnceLock;

const SHELL_INDENT_WIDTH: usize = 2;

fn branch_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(if|elif|case|for|while|until)\b").unwrap())
}

fn func_pattern_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*function\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(\s*\))?\s*\{").unwrap())
}

fn func_pattern_posix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\)\s*\{").unwrap())
}

/// Runs the line-oriented heuristic rules over `source`. `language` records
/// whether this ran as a genuine heuristic-family file or as a structured
/// analyzer parse-failure fallback (the FileEntry shape is identical either
/// way; only the recorded language differs).
pub fn analyze(source: &str, path: &str, scan_id: i64, language: Language) -> AnalysisResult {
    let lines: Vec<&str> = source.lines().collect();
    let loc = super::count_loc(source, "#");

    let mut complexity = 1.0f64;
    let mut max_nesting = 0i64;
    let mut func_starts: Vec<(usize, String)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if branch_pattern().is_match(line) {
            complexity += 1.0;
        }
        complexity += line.matches("&&").count() as f64;
        complexity += line.matches("||").count() as f64;

        if let Some(caps) = func_pattern_keyword().captures(line) {
            func_starts.push((i, caps[1].to_string()));
        } else if let Some(caps) = func_pattern_posix().captures(line) {
            func_starts.push((i, caps[1].to_string()));
        }

        let level = nesting_level(line);
        max_nesting = max_nesting.max(level as i64);
    }

    let function_count = func_starts.len() as i64;
    let avg_function_length = if func_starts.is_empty() {
        0.0
    } else {
        let mut lengths = Vec::new();
        for (idx, (start, _)) in func_starts.iter().enumerate() {
            let end = func_starts
                .get(idx + 1)
                .map(|(s, _)| *s)
                .unwrap_or(lines.len());
            lengths.push((end - start) as f64);
        }
        lengths.iter().sum::<f64>() / lengths.len() as f64
    };

    let entry = FileEntry {
        path: path.to_string(),
        scan_id,
        language,
        loc,
        cyclomatic_complexity: complexity,
        function_count,
        max_nesting,
        avg_function_length,
        essential_complexity: 1.0,
        indent_sd: super::indent_sd(source, "#", SHELL_INDENT_WIDTH),
    };

    AnalysisResult {
        entry,
        ck: None,
        functions: Vec::new(),
    }
}

/// Tabs each count as one level; otherwise `leading_spaces / 2`.
fn nesting_level(line: &str) -> usize {
    let mut tabs = 0usize;
    let mut spaces = 0usize;
    for c in line.chars() {
        match c {
            '\t' => tabs += 1,
            ' ' => spaces += 1,
            _ => break,
        }
    }
    if tabs > 0 {
        tabs
    } else {
        spaces / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_branch_keywords_and_logical_operators() {
        let src = "#!/bin/sh\nif [ -f a ]; then\n  echo a && echo b\nfi\n";
        let result = analyze(src, "a.sh", 1, Language::Heuristic);
        assert_eq!(result.entry.cyclomatic_complexity, 3.0);
    }

    #[test]
    fn detects_both_function_styles() {
        let src = "function foo() {\n  echo foo\n}\nbar() {\n  echo bar\n}\n";
        let result = analyze(src, "a.sh", 1, Language::Heuristic);
        assert_eq!(result.entry.function_count, 2);
    }

    #[test]
    fn no_functions_yields_zero_avg_length() {
        let src = "echo hello\n";
        let result = analyze(src, "a.sh", 1, Language::Heuristic);
        assert_eq!(result.entry.avg_function_length, 0.0);
    }
}
