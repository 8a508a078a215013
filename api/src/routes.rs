//! Route handlers: thin delegation into `PipelineOps`.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use tracing::instrument;

use request_pipeline::config::PipelineConfig;
use request_store::PipelineState;

use crate::AppState;
use crate::error_handler::AppError;
use crate::response_envelope::ApiResponse;

type Handler = Result<Response, AppError>;

fn ok_empty() -> Response {
    ApiResponse::success(serde_json::json!({})).into_response_with_status(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub actor: String,
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    pub actor: String,
    pub new_state: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Handler {
    let counters = state.ops.health().await;
    Ok(ApiResponse::success(counters).into_response_with_status(StatusCode::OK))
}

#[instrument(skip(state))]
pub async fn get_config(State(state): State<AppState>) -> Handler {
    Ok(ApiResponse::success(state.ops.config()).into_response_with_status(StatusCode::OK))
}

#[instrument(skip(state, body))]
pub async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<PipelineConfig>,
) -> Handler {
    state.ops.update_config(body);
    Ok(ok_empty())
}

#[instrument(skip(state))]
pub async fn queue_triage(State(state): State<AppState>, Path(id): Path<i64>) -> Handler {
    state.ops.queue_triage(id).await?;
    Ok(ok_empty())
}

#[instrument(skip(state))]
pub async fn queue_architect(State(state): State<AppState>, Path(id): Path<i64>) -> Handler {
    state.ops.queue_architect(id).await?;
    Ok(ok_empty())
}

#[instrument(skip(state))]
pub async fn trigger_implementation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Handler {
    state.ops.trigger_implementation(id).await?;
    Ok(ok_empty())
}

#[instrument(skip(state, body))]
pub async fn reject_implementation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ReasonBody>>,
) -> Handler {
    let reason = body.and_then(|Json(b)| b.reason);
    state.ops.reject_implementation(id, reason.as_deref()).await?;
    Ok(ok_empty())
}

#[instrument(skip(state))]
pub async fn retry_deployment(State(state): State<AppState>, Path(id): Path<i64>) -> Handler {
    state.ops.retry_deployment(id).await?;
    Ok(ok_empty())
}

#[instrument(skip(state, body))]
pub async fn approve_architect(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ActorBody>,
) -> Handler {
    state
        .ops
        .approve_architect(id, &body.actor, body.reason.as_deref())
        .await?;
    Ok(ok_empty())
}

#[instrument(skip(state, body))]
pub async fn reject_architect(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ActorBody>,
) -> Handler {
    state
        .ops
        .reject_architect(id, &body.actor, body.reason.as_deref())
        .await?;
    Ok(ok_empty())
}

#[instrument(skip(state, body))]
pub async fn feedback_architect(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<FeedbackBody>,
) -> Handler {
    state
        .ops
        .feedback_architect(id, &body.actor, &body.feedback)
        .await?;
    Ok(ok_empty())
}

#[instrument(skip(state, body))]
pub async fn override_triage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<OverrideBody>,
) -> Handler {
    let new_state = parse_state(&body.new_state)
        .ok_or_else(|| AppError::BadRequest(format!("unknown state: {}", body.new_state)))?;
    state
        .ops
        .override_triage(id, &body.actor, new_state, body.reason.as_deref())
        .await?;
    Ok(ok_empty())
}

#[instrument(skip(state))]
pub async fn deploy_staged(State(state): State<AppState>) -> Handler {
    let merged = state.ops.deploy_staged().await?;
    Ok(ApiResponse::success(serde_json::json!({ "merged": merged }))
        .into_response_with_status(StatusCode::OK))
}

fn parse_state(s: &str) -> Option<PipelineState> {
    match s.trim().to_ascii_lowercase().as_str() {
        "new" => Some(PipelineState::New),
        "needsclarification" | "needs-clarification" => Some(PipelineState::NeedsClarification),
        "triaged" => Some(PipelineState::Triaged),
        "architectreview" | "architect-review" => Some(PipelineState::ArchitectReview),
        "approved" => Some(PipelineState::Approved),
        "inprogress" | "in-progress" => Some(PipelineState::InProgress),
        "done" => Some(PipelineState::Done),
        "rejected" => Some(PipelineState::Rejected),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_state;
    use request_store::PipelineState;

    #[test]
    fn state_parse_accepts_both_spellings() {
        assert_eq!(parse_state("Triaged"), Some(PipelineState::Triaged));
        assert_eq!(
            parse_state("needs-clarification"),
            Some(PipelineState::NeedsClarification)
        );
        assert_eq!(parse_state("nope"), None);
    }
}
