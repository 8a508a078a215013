//! Markdown instruction document handed to the coding agent.
//!
//! Built from the approved solution: what to change, in what order, with
//! which constraints, ending with the fixed coding-conventions tail.

use request_store::{Attachment, Request};

use super::architect::SolutionDocument;

/// Fixed tail appended to every instruction document.
const CODING_CONVENTIONS: &str = r#"## Coding conventions
- Follow the existing style of each file you touch; do not reformat unrelated code.
- Keep the change minimal: implement exactly the solution above, nothing speculative.
- Add or update tests alongside the code they cover.
- Reference the issue number in the PR description.
- Do not commit secrets, generated artifacts, or files under `_temp-attachments/`."#;

/// Renders the full instruction document for one request + solution.
pub fn build_instruction_document(request: &Request, solution: &SolutionDocument) -> String {
    let mut out = format!(
        "# Implementation instructions — request {id}: {title}\n\n{summary}\n\n## Approach\n{approach}\n",
        id = request.id,
        title = request.title,
        summary = solution.solution_summary,
        approach = solution.approach,
    );

    if !solution.impacted_files.is_empty() {
        out.push_str("\n## Files to modify\n");
        for f in &solution.impacted_files {
            out.push_str(&format!(
                "- `{}` ({}): {} (~{} lines)\n",
                f.path, f.action, f.description, f.estimated_lines_changed
            ));
        }
    }

    if !solution.new_files.is_empty() {
        out.push_str("\n## Files to create\n");
        for f in &solution.new_files {
            out.push_str(&format!(
                "- `{}`: {} (~{} lines)\n",
                f.path, f.description, f.estimated_lines
            ));
        }
    }

    if solution.data_migration.required {
        out.push_str(&format!(
            "\n## Data migration\n{}\n",
            solution.data_migration.description
        ));
        for step in &solution.data_migration.steps {
            out.push_str(&format!("1. {step}\n"));
        }
    }

    if !solution.breaking_changes.is_empty() {
        out.push_str("\n## Breaking changes\n");
        for b in &solution.breaking_changes {
            out.push_str(&format!("- {b}\n"));
        }
    }

    if !solution.implementation_order.is_empty() {
        out.push_str("\n## Implementation order\n");
        for (i, step) in solution.implementation_order.iter().enumerate() {
            out.push_str(&format!("{}. {step}\n", i + 1));
        }
    }

    if !solution.dependency_changes.is_empty() {
        out.push_str("\n## Dependencies\n");
        for d in &solution.dependency_changes {
            out.push_str(&format!(
                "- {} `{}` {} — {}\n",
                d.action, d.package, d.version, d.reason
            ));
        }
    }

    if !solution.risks.is_empty() {
        out.push_str("\n## Risks\n");
        for r in &solution.risks {
            out.push_str(&format!(
                "- [{}] {} — mitigation: {}\n",
                r.severity, r.description, r.mitigation
            ));
        }
    }

    if !solution.testing_notes.is_empty() {
        out.push_str(&format!("\n## Testing requirements\n{}\n", solution.testing_notes));
    }

    out.push('\n');
    out.push_str(CODING_CONVENTIONS);
    out
}

/// Appended when image attachments were staged on a side branch.
pub fn attachment_instructions(request_id: i64, images: &[Attachment]) -> String {
    let mut out = format!(
        "\n\n## Attachments\nScreenshots for this request are staged under `_temp-attachments/{request_id}/` on the base branch:\n"
    );
    for a in images {
        out.push_str(&format!("- `_temp-attachments/{request_id}/{}`\n", a.filename));
    }
    out.push_str("Review them before implementing; do not keep them in the final PR.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::architect::{ImpactedFile, NewFile};
    use chrono::Utc;
    use request_store::*;

    #[test]
    fn document_lists_all_solution_sections() {
        let request = Request {
            id: 9,
            project_id: 1,
            title: "Add search".into(),
            description: "d".into(),
            submitter_name: "s".into(),
            submitter_email: "s@example.com".into(),
            request_type: RequestType::Feature,
            priority: Priority::Medium,
            bug: BugDetails::default(),
            state: PipelineState::Approved,
            last_triage_at: None,
            triage_count: 1,
            last_architect_at: None,
            architect_count: 1,
            issue_number: Some(41),
            session_id: None,
            pr_number: None,
            pr_url: None,
            branch_name: None,
            triggered_at: None,
            completed_at: None,
            implementation_status: None,
            deployment_status: DeploymentStatus::None,
            deployment_run_id: None,
            deployed_at: None,
            deployment_retry_count: 0,
            branch_deleted: false,
            stall_notified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut solution = SolutionDocument::default();
        solution.solution_summary = "Add a search endpoint".into();
        solution.approach = "Extend the query layer".into();
        solution.impacted_files = vec![ImpactedFile {
            path: "src/api.rs".into(),
            action: "modify".into(),
            description: "add route".into(),
            estimated_lines_changed: 40,
        }];
        solution.new_files = vec![NewFile {
            path: "src/search.rs".into(),
            description: "search module".into(),
            estimated_lines: 120,
        }];
        solution.implementation_order = vec!["src/search.rs first".into()];

        let doc = build_instruction_document(&request, &solution);
        assert!(doc.contains("## Files to modify"));
        assert!(doc.contains("`src/api.rs`"));
        assert!(doc.contains("## Files to create"));
        assert!(doc.contains("## Implementation order"));
        assert!(doc.contains("## Coding conventions"));
    }
}
