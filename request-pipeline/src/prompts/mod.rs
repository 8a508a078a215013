//! Prompt assembly and LLM response parsing shared by all stages.
//!
//! Every stage composes its own system/user pair and JSON response schema;
//! what they share lives here:
//! - the fenced-code stripper (` ```json ` wrappers, think traces),
//! - lenient JSON extraction (first balanced object/array in the text),
//! - the chars-per-token heuristic used by input budgets.
//!
//! Parse failures never propagate: each stage has a fallback decision.

pub mod architect;
pub mod code_review;
pub mod instructions;
pub mod triage;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Rough chars-per-token factor for input budgets.
pub const CHARS_PER_TOKEN: usize = 4;

lazy_static! {
    /// Reasoning models leak `<think>...</think>` traces; drop them before
    /// JSON extraction.
    static ref THINK_TRACE: Regex =
        Regex::new(r"(?s)<think>.*?</think>").expect("valid think-trace regex");
}

/// Char budget corresponding to a token budget.
pub const fn char_budget(tokens: usize) -> usize {
    tokens * CHARS_PER_TOKEN
}

/// Strips common LLM wrappers: think traces and fenced-code markers.
pub fn strip_wrappers(raw: &str) -> String {
    let without_think = THINK_TRACE.replace_all(raw, "");
    let trimmed = without_think.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Extracts the first balanced JSON object or array from `text`.
///
/// Models like to wrap their JSON in prose; this finds the first `{` or `[`
/// and returns everything up to the last matching close bracket.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let end = text.bytes().rposition(|b| b == close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Strips wrappers, extracts the JSON payload, and deserializes it.
///
/// # Errors
/// `serde_json::Error` on missing or malformed JSON; callers map this to
/// their stage fallback.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let stripped = strip_wrappers(raw);
    let payload = extract_json(&stripped).unwrap_or(&stripped);
    serde_json::from_str(payload)
}

/// Truncates to at most `max` chars, cutting at a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Head + tail view of an oversized file: first `head` lines, a gap marker,
/// last `tail` lines.
pub fn head_tail_lines(content: &str, head: usize, tail: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= head + tail {
        return content.to_string();
    }
    let mut out = String::new();
    for l in &lines[..head] {
        out.push_str(l);
        out.push('\n');
    }
    out.push_str(&format!("… ({} lines elided) …\n", lines.len() - head - tail));
    for l in &lines[lines.len() - tail..] {
        out.push_str(l);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn strips_fences_and_info_string() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_wrappers(raw), "{\"a\": 1}");
        assert_eq!(strip_wrappers("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn strips_think_traces() {
        let raw = "<think>long internal monologue</think>\n{\"a\": 1}";
        assert_eq!(strip_wrappers(raw), "{\"a\": 1}");
    }

    #[test]
    fn extracts_json_out_of_prose() {
        let raw = "Sure! Here is the answer:\n{\"decision\": \"approve\"}\nHope it helps.";
        assert_eq!(extract_json(raw), Some("{\"decision\": \"approve\"}"));
        assert_eq!(extract_json("no json at all"), None);
    }

    #[test]
    fn parse_tolerates_wrapping_and_fails_on_garbage() {
        let parsed: HashMap<String, i32> =
            parse_llm_json("```json\n{\"x\": 2}\n``` trailing").unwrap();
        assert_eq!(parsed["x"], 2);
        assert!(parse_llm_json::<HashMap<String, i32>>("not json at all").is_err());
    }

    #[test]
    fn head_tail_elides_middle() {
        let content = (1..=300).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let cut = head_tail_lines(&content, 200, 50);
        assert!(cut.contains("line1\n"));
        assert!(cut.contains("line300"));
        assert!(cut.contains("(50 lines elided)"));
        assert!(!cut.contains("line225\n"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let cut = truncate_chars(s, 3);
        assert!(cut.len() <= 3);
        assert!(s.starts_with(cut));
    }
}
