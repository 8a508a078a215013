//! Triage stage: prompt assembly + response schema + fallback.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use request_store::{Comment, Request, TriageDecision, TriageReview};

/// Fallback reasoning recorded when the model's output cannot be parsed.
pub const PARSE_FAILURE_REASONING: &str =
    "LLM response could not be parsed — escalated for human review";

/// Compiled default system prompt; the store's `triage` SystemPrompt row
/// overrides it when present.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the product owner of this development pipeline. You triage incoming development requests against the product objectives and sales positioning supplied below.

Rules:
- Approve requests that are in scope, well-specified and aligned.
- Reject requests that are out of scope, harmful, or duplicates of work already triaged or done.
- Ask for clarification when the request cannot be acted on as written.
- Be specific in your reasoning; reference the objectives where relevant.

Respond with ONLY a JSON object, no prose around it:
{
  "decision": "approve" | "reject" | "clarify",
  "reasoning": string,
  "alignmentScore": integer 0-100,
  "completenessScore": integer 0-100,
  "salesAlignmentScore": integer 0-100,
  "clarificationQuestions": [string],
  "suggestedPriority": "Low" | "Medium" | "High" | "Critical" | null,
  "tags": [string],
  "isDuplicate": boolean,
  "duplicateOfRequestId": integer | null
}"#;

/// Parsed triage response. Unknown fields land in `raw` instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriageResponse {
    pub decision: String,
    pub reasoning: String,
    pub alignment_score: i64,
    pub completeness_score: i64,
    pub sales_alignment_score: i64,
    pub clarification_questions: Vec<String>,
    pub suggested_priority: Option<String>,
    pub tags: Vec<String>,
    pub is_duplicate: bool,
    pub duplicate_of_request_id: Option<i64>,
    #[serde(flatten)]
    pub raw: HashMap<String, Value>,
}

impl TriageResponse {
    /// Lenient decision parse; anything unrecognized escalates to Clarify.
    pub fn parsed_decision(&self) -> TriageDecision {
        match self.decision.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => TriageDecision::Approve,
            "reject" | "rejected" => TriageDecision::Reject,
            _ => TriageDecision::Clarify,
        }
    }

    /// The synthesized response used when parsing fails.
    pub fn parse_fallback() -> Self {
        Self {
            decision: "clarify".into(),
            reasoning: PARSE_FAILURE_REASONING.into(),
            ..Self::default()
        }
    }
}

/// System message: role prompt plus the full reference documents.
pub fn build_system_message(
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
    out
}

/// User message: request fields, sibling context for duplicate detection,
/// and the conversation excerpt for re-triage after clarification.
pub fn build_user_message(
    request: &Request,
    siblings: &[Request],
    comments: &[Comment],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Request {id}\nTitle: {title}\nType: {ty}\nPriority: {prio}\nSubmitter: {name} <{email}>\n\n{desc}\n",
        id = request.id,
        title = request.title,
        ty = request.request_type.as_str(),
        prio = request.priority.as_str(),
        name = request.submitter_name,
        email = request.submitter_email,
        desc = request.description,
    ));

    if let (Some(steps), ty) = (&request.bug.steps_to_reproduce, request.request_type) {
        if ty == request_store::RequestType::Bug {
            out.push_str("\n## Reproduction\n");
            out.push_str(&format!("Steps: {steps}\n"));
            if let Some(expected) = &request.bug.expected {
                out.push_str(&format!("Expected: {expected}\n"));
            }
            if let Some(actual) = &request.bug.actual {
                out.push_str(&format!("Actual: {actual}\n"));
            }
        }
    }

    if let Some(excerpt) = conversation_excerpt(comments) {
        out.push_str("\n## Conversation so far\n");
        out.push_str(&excerpt);
    }

    if !siblings.is_empty() {
        out.push_str("\n## Other recent requests in this project (duplicate check)\n");
        for s in siblings {
            out.push_str(&format!(
                "- #{} [{}] {} — {}\n",
                s.id,
                s.state,
                s.title,
                super::truncate_chars(&s.description, 160)
            ));
        }
    }

    out
}

/// Prior agent comment plus the latest submitter comment after it, if any.
fn conversation_excerpt(comments: &[Comment]) -> Option<String> {
    let last_agent = comments.iter().rev().find(|c| c.is_agent);
    let last_human = comments.iter().rev().find(|c| !c.is_agent)?;

    let mut out = String::new();
    if let Some(agent) = last_agent {
        out.push_str(&format!(
            "Agent asked:\n{}\n\n",
            super::truncate_chars(&agent.content, 1200)
        ));
    }
    out.push_str(&format!(
        "{} replied:\n{}\n",
        last_human.author,
        super::truncate_chars(&last_human.content, 1200)
    ));
    Some(out)
}

/// Agent comment posted alongside the stored review.
pub fn render_comment(review: &TriageReview, questions: &[String]) -> String {
    let mut out = format!(
        "**Triage: {}**\n\nAlignment {}/100 · Completeness {}/100 · Sales {}/100\n\n{}",
        review.decision.as_str(),
        review.alignment_score,
        review.completeness_score,
        review.sales_alignment_score,
        review.reasoning,
    );
    if let Some(p) = &review.suggested_priority {
        out.push_str(&format!("\n\nSuggested priority: {p}"));
    }
    if !questions.is_empty() {
        out.push_str("\n\nPlease clarify:\n");
        for q in questions {
            out.push_str(&format!("- {q}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::parse_llm_json;

    #[test]
    fn parses_canonical_response() {
        let raw = r#"```json
        {"decision":"approve","reasoning":"fits roadmap","alignmentScore":85,
         "completenessScore":70,"salesAlignmentScore":80,"clarificationQuestions":[],
         "tags":["search"],"isDuplicate":false,"duplicateOfRequestId":null,
         "surpriseField":{"nested":true}}
        ```"#;
        let resp: TriageResponse = parse_llm_json(raw).unwrap();
        assert_eq!(resp.parsed_decision(), TriageDecision::Approve);
        assert_eq!(resp.alignment_score, 85);
        assert!(resp.raw.contains_key("surpriseField"));
    }

    #[test]
    fn unknown_decision_escalates_to_clarify() {
        let resp = TriageResponse {
            decision: "escalate".into(),
            ..Default::default()
        };
        assert_eq!(resp.parsed_decision(), TriageDecision::Clarify);
    }

    #[test]
    fn fallback_carries_the_escalation_reasoning() {
        let fb = TriageResponse::parse_fallback();
        assert_eq!(fb.parsed_decision(), TriageDecision::Clarify);
        assert!(fb.reasoning.contains("could not be parsed"));
        assert_eq!(fb.alignment_score, 0);
    }
}
