//! Architect stage: two-phase prompts, the solution document schema, and
//! the file-content budget logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use request_store::{Request, TriageReview};

use super::{head_tail_lines, truncate_chars};
use crate::codebase::RepoMap;

/// Max output tokens for the (cheap) selection phase.
pub const SELECTION_MAX_TOKENS: u32 = 1000;

/// Head/tail line counts applied when file contents blow the char budget.
const TRUNCATE_HEAD_LINES: usize = 200;
const TRUNCATE_TAIL_LINES: usize = 50;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the software architect of this development pipeline. You design implementation solutions for triaged requests against the actual codebase supplied below. Stay inside the existing architecture; prefer small, verifiable changes; call out risks and breaking changes honestly."#;

const SELECTION_SYSTEM_PROMPT: &str = r#"You select the source files most relevant to a development request. You are given a repository map (paths with estimated sizes) and the request. Respond with ONLY a JSON array of repository-relative paths, most relevant first. Exclude build outputs, lockfiles and generated code. Select at most the number of files you are asked for."#;

/// Phase A: file-selection system message.
pub fn build_selection_system() -> String {
    SELECTION_SYSTEM_PROMPT.to_string()
}

/// Phase A: file-selection user message.
pub fn build_selection_user(
    request: &Request,
    map: &RepoMap,
    po_review: Option<&TriageReview>,
    max_files: usize,
) -> String {
    let mut out = format!(
        "# Request\n{title}\n\n{desc}\n",
        title = request.title,
        desc = truncate_chars(&request.description, 4000),
    );
    if let Some(po) = po_review {
        out.push_str(&format!(
            "\n# Product-owner notes\n{}\n",
            truncate_chars(&po.reasoning, 1500)
        ));
    }
    out.push_str(&format!(
        "\n# Repository map\n{}\n\nSelect at most {max_files} paths as a JSON array.",
        map.rendered
    ));
    out
}

/// Parses the selection response: a bare array, or an object wrapping one
/// under `files` / `paths`.
pub fn parse_file_selection(raw: &str) -> Option<Vec<String>> {
    if let Ok(paths) = super::parse_llm_json::<Vec<String>>(raw) {
        return Some(paths);
    }
    #[derive(Deserialize)]
    struct Wrapped {
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        paths: Vec<String>,
    }
    let w: Wrapped = super::parse_llm_json(raw).ok()?;
    if !w.files.is_empty() {
        Some(w.files)
    } else if !w.paths.is_empty() {
        Some(w.paths)
    } else {
        None
    }
}

/* ----------------------- solution document ----------------------- */

/// One existing file the solution touches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImpactedFile {
    pub path: String,
    /// "modify" | "delete" (anything else is kept verbatim and treated as
    /// modify).
    pub action: String,
    pub description: String,
    pub estimated_lines_changed: i64,
}

/// One file the solution creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewFile {
    pub path: String,
    pub description: String,
    pub estimated_lines: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataMigration {
    pub required: bool,
    pub description: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DependencyChange {
    pub package: String,
    /// "add" | "remove" | "upgrade".
    pub action: String,
    pub version: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Risk {
    pub description: String,
    /// "low" | "medium" | "high".
    pub severity: String,
    pub mitigation: String,
}

/// The full solution document. Unknown fields survive in `raw` so the
/// stored JSON round-trips losslessly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolutionDocument {
    pub solution_summary: String,
    pub approach: String,
    pub impacted_files: Vec<ImpactedFile>,
    pub new_files: Vec<NewFile>,
    pub data_migration: DataMigration,
    pub breaking_changes: Vec<String>,
    pub dependency_changes: Vec<DependencyChange>,
    pub risks: Vec<Risk>,
    pub estimated_complexity: String,
    pub estimated_effort: String,
    pub implementation_order: Vec<String>,
    pub testing_notes: String,
    pub architectural_notes: String,
    pub clarification_questions: Vec<String>,
    /// Impacted paths that were not found in the repository map; annotated
    /// by the pipeline, never fatal.
    pub unknown_paths: Vec<String>,
    #[serde(flatten)]
    pub raw: HashMap<String, Value>,
}

impl SolutionDocument {
    /// Synthesized document when the model's output cannot be parsed; the
    /// raw text is preserved for the human reviewer.
    pub fn parse_fallback(raw_text: &str) -> Self {
        Self {
            solution_summary: "Solution could not be parsed — escalated for human review".into(),
            approach: truncate_chars(raw_text, 4000).to_string(),
            estimated_complexity: "unknown".into(),
            estimated_effort: "unknown".into(),
            ..Self::default()
        }
    }

    /// Marks impacted paths missing from the repository map.
    pub fn annotate_unknown_paths(&mut self, map: &RepoMap) {
        self.unknown_paths = self
            .impacted_files
            .iter()
            .map(|f| f.path.clone())
            .filter(|p| !map.contains(p))
            .collect();
    }
}

/// Phase B: solution-proposal system message (role + reference documents).
pub fn build_solution_system(
    role_prompt: &str,
    product_objectives: &str,
    sales_positioning: &str,
) -> String {
    let mut out = String::from(role_prompt);
    if !product_objectives.is_empty() {
        out.push_str("\n\n# Product objectives\n");
        out.push_str(product_objectives);
    }
    if !sales_positioning.is_empty() {
        out.push_str("\n\n# Sales positioning\n");
        out.push_str(sales_positioning);
    }
    out.push_str(
        r#"

Respond with ONLY a JSON object:
{
  "solutionSummary": string, "approach": string,
  "impactedFiles": [{"path": string, "action": "modify"|"delete", "description": string, "estimatedLinesChanged": integer}],
  "newFiles": [{"path": string, "description": string, "estimatedLines": integer}],
  "dataMigration": {"required": boolean, "description": string, "steps": [string]},
  "breakingChanges": [string],
  "dependencyChanges": [{"package": string, "action": "add"|"remove"|"upgrade", "version": string, "reason": string}],
  "risks": [{"description": string, "severity": "low"|"medium"|"high", "mitigation": string}],
  "estimatedComplexity": string, "estimatedEffort": string,
  "implementationOrder": [string], "testingNotes": string,
  "architecturalNotes": string, "clarificationQuestions": [string]
}"#,
    );
    out
}

/// Context carried into a revision round.
pub struct RevisionContext<'a> {
    pub prior_summary: &'a str,
    pub human_feedback: &'a str,
}

/// Phase B: solution-proposal user message.
pub fn build_solution_user(
    request: &Request,
    map: &RepoMap,
    files: &[(String, String)],
    po_review: Option<&TriageReview>,
    revision: Option<RevisionContext<'_>>,
) -> String {
    let mut out = format!(
        "# Request {id}: {title}\nType: {ty}\n\n{desc}\n",
        id = request.id,
        title = request.title,
        ty = request.request_type.as_str(),
        desc = request.description,
    );

    if let Some(po) = po_review {
        out.push_str(&format!(
            "\n# Product-owner review\n{}\n",
            truncate_chars(&po.reasoning, 2000)
        ));
    }

    if let Some(rev) = revision {
        out.push_str(&format!(
            "\n# Previous solution (being revised)\n{}\n\n# Reviewer feedback to address\n{}\n",
            truncate_chars(rev.prior_summary, 2000),
            truncate_chars(rev.human_feedback, 2000),
        ));
    }

    // Trimmed map: directory rendering only, capped.
    out.push_str(&format!(
        "\n# Repository map (trimmed)\n{}\n",
        truncate_chars(&map.rendered, 6000)
    ));

    out.push_str("\n# Selected file contents\n");
    for (path, content) in files {
        out.push_str(&format!("\n## {path}\n```\n{content}\n```\n"));
    }

    out
}

/// Fits fetched contents into the char budget: drops files from the end of
/// the relevance ordering first, then head+tail-truncates what remains.
pub fn fit_file_sections(
    files: Vec<(String, String)>,
    max_content_chars: usize,
) -> Vec<(String, String)> {
    let mut kept: Vec<(String, String)> = Vec::new();
    let mut used = 0usize;

    for (path, content) in files {
        if used + content.len() <= max_content_chars {
            used += content.len();
            kept.push((path, content));
            continue;
        }
        // Budget exhausted: try the head+tail cut before giving up on the
        // file entirely.
        let cut = head_tail_lines(&content, TRUNCATE_HEAD_LINES, TRUNCATE_TAIL_LINES);
        if used + cut.len() <= max_content_chars {
            used += cut.len();
            kept.push((path, cut));
        }
        // Files past the budget are dropped (relevance order puts the most
        // important ones first).
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebase::MapEntry;

    fn map_with(paths: &[&str]) -> RepoMap {
        RepoMap {
            entries: paths
                .iter()
                .map(|p| MapEntry {
                    path: p.to_string(),
                    estimated_lines: 10,
                })
                .collect(),
            rendered: String::new(),
        }
    }

    #[test]
    fn selection_accepts_bare_array_and_wrapped_object() {
        assert_eq!(
            parse_file_selection(r#"["src/a.rs", "src/b.rs"]"#).unwrap(),
            vec!["src/a.rs", "src/b.rs"]
        );
        assert_eq!(
            parse_file_selection(r#"{"files": ["src/a.rs"]}"#).unwrap(),
            vec!["src/a.rs"]
        );
        assert!(parse_file_selection("no json").is_none());
    }

    #[test]
    fn solution_document_round_trips() {
        let raw = r#"{
            "solutionSummary": "Add search endpoint",
            "approach": "Extend the query layer",
            "impactedFiles": [{"path": "src/api.rs", "action": "modify", "description": "add route", "estimatedLinesChanged": 40}],
            "newFiles": [{"path": "src/search.rs", "description": "search module", "estimatedLines": 120}],
            "dataMigration": {"required": false, "description": "", "steps": []},
            "risks": [{"description": "slow queries", "severity": "medium", "mitigation": "index"}],
            "estimatedComplexity": "medium", "estimatedEffort": "2d",
            "implementationOrder": ["src/search.rs", "src/api.rs"],
            "futureExtension": {"keep": "me"}
        }"#;
        let doc: SolutionDocument = crate::prompts::parse_llm_json(raw).unwrap();
        assert_eq!(doc.impacted_files.len(), 1);
        assert!(doc.raw.contains_key("futureExtension"));

        let json = serde_json::to_string(&doc).unwrap();
        let reparsed: SolutionDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.solution_summary, doc.solution_summary);
        assert_eq!(reparsed.impacted_files[0].path, "src/api.rs");
        assert!(reparsed.raw.contains_key("futureExtension"));
    }

    #[test]
    fn unknown_paths_are_annotated_not_fatal() {
        let map = map_with(&["src/api.rs"]);
        let mut doc = SolutionDocument::default();
        doc.impacted_files = vec![
            ImpactedFile {
                path: "src/api.rs".into(),
                ..Default::default()
            },
            ImpactedFile {
                path: "src/phantom.rs".into(),
                ..Default::default()
            },
        ];
        doc.annotate_unknown_paths(&map);
        assert_eq!(doc.unknown_paths, vec!["src/phantom.rs"]);
    }

    #[test]
    fn budget_drops_then_truncates() {
        let small = ("a.rs".to_string(), "x".repeat(100));
        let big = ("b.rs".to_string(), "line\n".repeat(1000));
        let over = ("c.rs".to_string(), "y".repeat(10_000));

        let fitted = fit_file_sections(vec![small.clone(), big, over], 2000);
        assert_eq!(fitted[0].1.len(), 100);
        // Second file was head/tail-cut into the remaining budget.
        assert!(fitted.len() >= 2);
        assert!(fitted[1].1.contains("elided"));
        // Third file no longer fits at all.
        assert_eq!(fitted.len(), 2);
    }
}
