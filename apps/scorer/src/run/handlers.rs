use axum::{extract::State, http::HeaderMap, Json};

use crate::auth::authorize;
use crate::errors::AppError;
use crate::run::orchestrator::RunSummary;
use crate::run::trigger_run;
use crate::state::AppState;

/// GET|POST /api/v1/notes/score
pub async fn handle_score_run(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, AppError> {
    authorize(&headers, &state.config.scoring_secret)?;
    let summary = trigger_run(&state).await?;
    Ok(Json(summary))
}
