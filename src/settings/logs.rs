//! Client error intake and the caller's own activity history.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::audit_log::{load_audit_entries, AuditQuery};
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::DbAuditLog;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{validate_date_range, with_conn};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::AuthenticatedUser;

const MAX_ERRORS_PER_REPORT: usize = 50;

#[derive(Debug, serde::Deserialize)]
pub struct ClientErrorsRequest {
    errors: Vec<ClientErrorData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ClientErrorData {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    timestamp: String,
}

pub async fn receive_client_errors(
    user: Option<AuthenticatedUser>,
    Json(payload): Json<ClientErrorsRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.errors.len() > MAX_ERRORS_PER_REPORT {
        return Err(ApiError::Validation(format!(
            "At most {MAX_ERRORS_PER_REPORT} errors can be reported at once"
        )));
    }

    let reporter = user.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous");
    for error in &payload.errors {
        log::error!(
            "[CLIENT ERROR] {} | {} | {} | {} | URL: {} | Stack: {}",
            reporter,
            error.timestamp,
            error.r#type,
            error.message,
            error.url,
            error.stack.as_deref().unwrap_or("<no stack>")
        );
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "received",
            "count": payload.errors.len(),
            "reporter": user.map(|u| u.username)
        })),
    ))
}

pub async fn handle_my_activity(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<DbAuditLog>>> {
    validate_date_range(query.from, query.to)?;

    let entries = with_conn(&state.conn, move |conn| {
        Ok(load_audit_entries(conn, &query, None, Some(&user.user_id))?)
    })
    .await?;

    Ok(Json(entries))
}

pub fn configure_log_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        ApiUrls::LOGS,
        get(handle_my_activity).post(receive_client_errors),
    )
}
