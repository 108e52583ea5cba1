//! Machine-block extraction and issue body composition.
//!
//! Grounded on `weave_gh/body.py`. The block markers are renamed from the
//! original's `WEAVE:BEGIN`/`WEAVE:END` but the extraction/compose/diff
//! logic is unchanged.

use regex::Regex;
use std::sync::OnceLock;

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!-- MACHINE:BEGIN hash=([a-f0-9]+) -->\r?\n(.*?)<!-- MACHINE:END -->").unwrap()
    })
}

/// Extracts `(hash, content)` from an existing machine block in `body`.
pub fn extract_machine_block(body: &str) -> Option<(String, String)> {
    let caps = block_re().captures(body)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Human-written content above the machine block, or the whole body when no
/// block is present (a legacy issue).
pub fn extract_human_content(body: &str) -> String {
    match block_re().find(body) {
        Some(m) => body[..m.start()].trim_end().to_string(),
        None => body.trim().to_string(),
    }
}

pub fn compose_issue_body(human_content: &str, machine_block: &str) -> String {
    if human_content.is_empty() {
        machine_block.to_string()
    } else {
        format!("{human_content}\n\n{machine_block}")
    }
}

/// Whether `existing_body`'s block hash differs from `new_block`'s — i.e.
/// whether an update is needed. No existing block always needs an update.
pub fn should_update_body(existing_body: &str, new_block: &str) -> bool {
    let existing_hash = extract_machine_block(existing_body).map(|(h, _)| h);
    let new_hash = extract_machine_block(new_block).map(|(h, _)| h);
    match existing_hash {
        None => true,
        existing => existing != new_hash,
    }
}

const LEGACY_PREAMBLE_PREFIXES: &[&str] = &["**Local ID**", "**Weave ID**"];

/// Description extracted from legacy (pre-machine-block) issue bodies, with
/// the old ID preamble and separator lines stripped.
pub fn parse_body_description(body: &str) -> String {
    let human = extract_human_content(body);
    if human.is_empty() {
        return String::new();
    }
    human
        .lines()
        .filter(|line| {
            !LEGACY_PREAMBLE_PREFIXES.iter().any(|p| line.starts_with(p))
                && line.trim() != "---"
                && line.trim() != "*Synced*"
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn form_section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?ms)^### (.+?)\s*\n\n(.*?)(?=\n### |\z)").unwrap())
}

/// Parses a GitHub issue-template form body into lowercase-keyed fields.
pub fn parse_issue_template_fields(body: &str) -> std::collections::BTreeMap<String, String> {
    let mut fields = std::collections::BTreeMap::new();
    for caps in form_section_re().captures_iter(body) {
        let key = caps[1].trim().to_lowercase();
        let val = caps[2].trim();
        if !val.is_empty() && val != "_No response_" {
            fields.insert(key, val.to_string());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_block_and_human_content() {
        let body = "Some human notes.\n\n<!-- MACHINE:BEGIN hash=abc123def456 -->\ncontent\n<!-- MACHINE:END -->";
        let (hash, content) = extract_machine_block(body).unwrap();
        assert_eq!(hash, "abc123def456");
        assert_eq!(content.trim(), "content");
        assert_eq!(extract_human_content(body), "Some human notes.");
    }

    #[test]
    fn no_block_means_update_needed() {
        assert!(should_update_body("plain body", "<!-- MACHINE:BEGIN hash=aaa -->\nx\n<!-- MACHINE:END -->"));
    }

    #[test]
    fn same_hash_means_no_update() {
        let block = "<!-- MACHINE:BEGIN hash=aaa111 -->\nx\n<!-- MACHINE:END -->";
        assert!(!should_update_body(block, block));
    }

    #[test]
    fn parses_template_form_fields() {
        let body = "### Type\n\nbug\n\n### Priority\n\nP1 (high)\n";
        let fields = parse_issue_template_fields(body);
        assert_eq!(fields.get("type").map(|s| s.as_str()), Some("bug"));
        assert_eq!(fields.get("priority").map(|s| s.as_str()), Some("P1 (high)"));
    }
}
