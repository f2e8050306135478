use super::{
    error::AuthError,
    types::{AuthenticatedUser, Permission},
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Method, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::user_models::find_user;
use crate::core::shared::state::AppState;
use crate::security::jwt::extract_bearer_token;

/// Resolves the bearer token to the current user row and attaches it to the request.
/// Anonymous paths still pick up a caller when a valid token is presented.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    if request.method() == Method::OPTIONS
        || state.auth_config.is_anonymous_allowed(request.method(), &path)
    {
        if let Some(token) = token {
            match resolve_caller(&state, &token, &path).await {
                Ok(user) => {
                    request.extensions_mut().insert(user);
                }
                Err(e) => debug!("Ignoring token on anonymous path {}: {}", path, e.error_code()),
            }
        }
        return Ok(next.run(request).await);
    }

    let token = token.ok_or(AuthError::MissingToken)?;
    let user = resolve_caller(&state, &token, &path).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn resolve_caller(
    state: &AppState,
    token: &str,
    path: &str,
) -> Result<AuthenticatedUser, AuthError> {
    let claims = state
        .jwt_manager
        .validate_access_token(token)
        .await
        .map_err(|e| {
            debug!("Rejected token on {}: {}", path, e);
            if e.to_string().contains("ExpiredSignature") {
                AuthError::ExpiredToken
            } else {
                AuthError::InvalidToken
            }
        })?;

    let pool = state.conn.clone();
    let user_id = claims.sub.clone();
    let db_user = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        find_user(&mut conn, &user_id).map_err(|e| AuthError::InternalError(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::InternalError(e.to_string()))??
    .ok_or(AuthError::UserNotFound)?;

    if !db_user.is_active {
        warn!("Token presented for disabled account {}", db_user.username);
        return Err(AuthError::AccountDisabled);
    }

    Ok(db_user.to_authenticated().with_token(claims.jti, claims.exp))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

pub fn require_permission(user: &AuthenticatedUser, permission: Permission) -> ApiResult<()> {
    if user.has_permission(&permission) {
        Ok(())
    } else {
        debug!("{} lacks {:?}", user.username, permission);
        Err(ApiError::forbidden())
    }
}
