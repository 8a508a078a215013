//! Optional prompt dump for debugging LLM interactions.
//!
//! When `DEVFLOW_PROMPT_DUMP_DIR` is set, every stage writes the exact
//! system/user pair it sent to disk before the call. Best-effort: a failed
//! dump is a warn, never an error.

use chrono::Utc;
use tracing::warn;

/// Dumps one prompt pair to `$DEVFLOW_PROMPT_DUMP_DIR/<stage>-<request>-<ts>.txt`.
pub async fn dump_prompt(stage: &str, request_id: i64, system: &str, user: &str) {
    let Ok(dir) = std::env::var("DEVFLOW_PROMPT_DUMP_DIR") else {
        return;
    };
    if dir.trim().is_empty() {
        return;
    }

    let ts = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = std::path::Path::new(&dir).join(format!("{stage}-{request_id}-{ts}.txt"));
    let body = format!("# SYSTEM\n{system}\n\n# USER\n{user}\n");

    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(error = %e, "prompt dump dir unavailable");
        return;
    }
    if let Err(e) = tokio::fs::write(&path, body).await {
        warn!(error = %e, path = %path.display(), "prompt dump failed");
    }
}
