//! Code-review stage: prompt assembly + response schema + degraded
//! fallback.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use request_store::{CodeReviewDecision, Request};

use super::{char_budget, truncate_chars};

/// Notes recorded when the structured response cannot be parsed.
pub const PARSE_FAILURE_NOTES: &str = "Could not parse structured response";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the code reviewer of this development pipeline. You review a pull-request diff against the approved solution design. Check three gates: design compliance, security, coding standards. Be strict about scope creep and silent design deviations.

Respond with ONLY a JSON object:
{
  "decision": "Approved" | "ChangesRequested",
  "summary": string,
  "designCompliance": boolean, "designComplianceNotes": string,
  "securityPass": boolean, "securityNotes": string,
  "codingStandardsPass": boolean, "codingStandardsNotes": string,
  "qualityScore": integer 1-10
}"#;

/// Parsed code-review response. Unknown fields land in `raw`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeReviewResponse {
    pub decision: String,
    pub summary: String,
    pub design_compliance: bool,
    pub design_compliance_notes: String,
    pub security_pass: bool,
    pub security_notes: String,
    pub coding_standards_pass: bool,
    pub coding_standards_notes: String,
    pub quality_score: i64,
    #[serde(flatten)]
    pub raw: HashMap<String, Value>,
}

impl Default for CodeReviewResponse {
    fn default() -> Self {
        Self {
            decision: String::new(),
            summary: String::new(),
            design_compliance: false,
            design_compliance_notes: String::new(),
            security_pass: false,
            security_notes: String::new(),
            coding_standards_pass: false,
            coding_standards_notes: String::new(),
            quality_score: 5,
            raw: HashMap::new(),
        }
    }
}

impl CodeReviewResponse {
    pub fn parsed_decision(&self) -> CodeReviewDecision {
        let squashed: String = self
            .decision
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match squashed.as_str() {
            "approved" | "approve" => CodeReviewDecision::Approved,
            "changesrequested" | "requestchanges" => CodeReviewDecision::ChangesRequested,
            _ => CodeReviewDecision::Failed,
        }
    }

    /// Degraded fallback: scan the raw text for "Approved", otherwise
    /// request changes. All gates carry the parse-failure note.
    pub fn parse_fallback(raw_text: &str) -> Self {
        let approved = raw_text.contains("Approved");
        Self {
            decision: if approved {
                "Approved".into()
            } else {
                "ChangesRequested".into()
            },
            summary: PARSE_FAILURE_NOTES.into(),
            design_compliance: approved,
            design_compliance_notes: PARSE_FAILURE_NOTES.into(),
            security_pass: approved,
            security_notes: PARSE_FAILURE_NOTES.into(),
            coding_standards_pass: approved,
            coding_standards_notes: PARSE_FAILURE_NOTES.into(),
            quality_score: 5,
            raw: HashMap::new(),
        }
    }
}

/// User message: request summary + solution (40 % of the char budget) +
/// diff (60 %, truncated at the end when oversized).
pub fn build_user_message(
    request: &Request,
    solution_summary: &str,
    solution_json: &str,
    diff: &str,
    max_input_tokens: usize,
) -> String {
    let budget = char_budget(max_input_tokens);
    let solution_budget = budget * 40 / 100;
    let diff_budget = budget - solution_budget;

    let mut out = format!(
        "# Request {id}: {title}\n{desc}\n\n# Approved solution\n{summary}\n\n## Solution document\n{json}\n",
        id = request.id,
        title = request.title,
        desc = truncate_chars(&request.description, 1500),
        summary = solution_summary,
        json = truncate_chars(solution_json, solution_budget),
    );
    out.push_str(&format!(
        "\n# Diff\n```diff\n{}\n```\n\n# Task\nReview the diff against the solution and answer with the JSON contract.",
        truncate_chars(diff, diff_budget)
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::parse_llm_json;

    #[test]
    fn parses_decisions_leniently() {
        for (s, want) in [
            ("Approved", CodeReviewDecision::Approved),
            ("approve", CodeReviewDecision::Approved),
            ("ChangesRequested", CodeReviewDecision::ChangesRequested),
            ("changes_requested", CodeReviewDecision::ChangesRequested),
            ("changes requested", CodeReviewDecision::ChangesRequested),
            ("garbage", CodeReviewDecision::Failed),
        ] {
            let resp = CodeReviewResponse {
                decision: s.into(),
                ..Default::default()
            };
            assert_eq!(resp.parsed_decision(), want, "{s}");
        }
    }

    #[test]
    fn fallback_scans_for_approved() {
        let ok = CodeReviewResponse::parse_fallback("The change looks fine. Approved overall.");
        assert_eq!(ok.parsed_decision(), CodeReviewDecision::Approved);
        assert_eq!(ok.summary, PARSE_FAILURE_NOTES);

        let nope = CodeReviewResponse::parse_fallback("cannot tell");
        assert_eq!(nope.parsed_decision(), CodeReviewDecision::ChangesRequested);
    }

    #[test]
    fn parses_canonical_response_with_extras() {
        let raw = r#"{"decision":"Approved","summary":"good","designCompliance":true,
            "designComplianceNotes":"follows design","securityPass":true,"securityNotes":"",
            "codingStandardsPass":true,"codingStandardsNotes":"","qualityScore":8,
            "lintWarnings":[]}"#;
        let resp: CodeReviewResponse = parse_llm_json(raw).unwrap();
        assert_eq!(resp.quality_score, 8);
        assert!(resp.raw.contains_key("lintWarnings"));
    }

    #[test]
    fn oversized_diff_is_truncated_at_the_end() {
        let request = sample_request();
        let diff = "-old\n+new\n".repeat(10_000);
        let msg = build_user_message(&request, "summary", "{}", &diff, 100);
        assert!(msg.len() < 3000);
        assert!(msg.contains("# Diff"));
    }

    fn sample_request() -> Request {
        use chrono::Utc;
        use request_store::*;
        Request {
            id: 1,
            project_id: 1,
            title: "Add search".into(),
            description: "desc".into(),
            submitter_name: "s".into(),
            submitter_email: "s@example.com".into(),
            request_type: RequestType::Feature,
            priority: Priority::Medium,
            bug: BugDetails::default(),
            state: request_store::PipelineState::InProgress,
            last_triage_at: None,
            triage_count: 1,
            last_architect_at: None,
            architect_count: 1,
            issue_number: Some(1),
            session_id: Some("session-1".into()),
            pr_number: Some(27),
            pr_url: None,
            branch_name: None,
            triggered_at: None,
            completed_at: None,
            implementation_status: Some(ImplementationStatus::PrOpened),
            deployment_status: DeploymentStatus::None,
            deployment_run_id: None,
            deployed_at: None,
            deployment_retry_count: 0,
            branch_deleted: false,
            stall_notified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
