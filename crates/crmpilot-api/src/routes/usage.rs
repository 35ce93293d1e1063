use axum::{
    extract::{Query, State},
    Json,
};
use crmpilot::persist::{UsageLogEntry, UsageTotals};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Session;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub entries: Vec<UsageLogEntry>,
    pub totals: UsageTotals,
}

/// Caller's usage ledger with totals, for quota display
pub async fn list_usage(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<UsageResponse>> {
    let entries = state
        .pilot
        .stores()
        .usage
        .list_usage(&session.user_id, query.agent.as_deref())
        .await?;
    let totals = entries.iter().collect();

    Ok(Json(UsageResponse { entries, totals }))
}
