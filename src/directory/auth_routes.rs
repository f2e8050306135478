use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::user_models::find_user;
use crate::core::shared::models::{DbUser, UserProfile};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{now, with_conn};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{AuthError, AuthenticatedUser};
use crate::security::jwt::{TokenPair, TokenSubject};
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn token_subject(user: &DbUser) -> TokenSubject {
    TokenSubject {
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role.as_str().to_string(),
        office: user.office.clone(),
    }
}

fn issue_tokens(state: &AppState, user: &DbUser) -> ApiResult<TokenPair> {
    state
        .jwt_manager
        .generate_token_pair(&token_subject(user))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn find_by_login(conn: &mut SqliteConnection, login: &str) -> QueryResult<Option<DbUser>> {
    users::table
        .filter(
            users::username
                .eq(login)
                .or(users::email.eq(login.to_lowercase())),
        )
        .select(DbUser::as_select())
        .first(conn)
        .optional()
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let login = req.login.trim().to_string();
    if login.is_empty() || req.password.is_empty() {
        return Err(AuthError::InvalidCredentials.into());
    }

    let passwords = Arc::clone(&state.password_service);
    let user = with_conn(&state.conn, move |conn| {
        let Some(mut user) = find_by_login(conn, &login)? else {
            passwords.verify_decoy(&req.password);
            warn!("Login failed for unknown account '{login}'");
            return Err(AuthError::InvalidCredentials.into());
        };

        let verified = passwords
            .verify(&req.password, &user.password_hash)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !verified {
            warn!("Login failed for '{}': wrong password", user.username);
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        conn.transaction::<_, ApiError, _>(|conn| {
            let timestamp = now();
            diesel::update(users::table.find(&user.id))
                .set(users::last_login_at.eq(Some(timestamp)))
                .execute(conn)?;
            user.last_login_at = Some(timestamp);

            AuditLogEntry::new(AuditAction::Login, ResourceType::Session)
                .with_actor(&user.to_authenticated())
                .with_resource_id(&user.id)
                .with_description(format!("{} logged in", user.username))
                .record(conn)?;
            Ok(())
        })?;
        Ok(user)
    })
    .await?;

    let tokens = issue_tokens(&state, &user)?;
    info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        tokens,
        user: user.into(),
    }))
}

pub async fn handle_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state
        .jwt_manager
        .consume_refresh_token(req.refresh_token.trim())
        .await
        .map_err(|e| {
            warn!("Refresh rejected: {e}");
            ApiError::from(AuthError::InvalidToken)
        })?;

    let user = with_conn(&state.conn, move |conn| {
        find_user(conn, &claims.sub)?
            .filter(|u| u.is_active)
            .ok_or_else(|| AuthError::UserNotFound.into())
    })
    .await?;

    Ok(Json(issue_tokens(&state, &user)?))
}

pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<StatusCode> {
    if let (Some(jti), Some(exp)) = (&user.token_id, user.token_expires_at) {
        state.jwt_manager.revoke_token(jti, exp).await;
    }

    with_conn(&state.conn, move |conn| {
        AuditLogEntry::new(AuditAction::Logout, ResourceType::Session)
            .with_actor(&user)
            .with_resource_id(&user.user_id)
            .with_description(format!("{} logged out", user.username))
            .record(conn)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<UserProfile>> {
    let profile = with_conn(&state.conn, move |conn| {
        find_user(conn, &user.user_id)?
            .map(UserProfile::from)
            .ok_or_else(|| ApiError::not_found("User"))
    })
    .await?;
    Ok(Json(profile))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUTH_LOGIN, post(handle_login))
        .route(ApiUrls::AUTH_REFRESH, post(handle_refresh))
        .route(ApiUrls::AUTH_LOGOUT, post(handle_logout))
        .route(ApiUrls::AUTH_ME, get(handle_me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, TestDb};
    use crate::security::auth_api::Role;

    #[test]
    fn test_login_matches_username_or_email() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let ada = insert_user(&mut conn, "ada", Role::Agent, Some("Lagos"));

        let by_name = find_by_login(&mut conn, "ada").expect("query");
        assert_eq!(by_name.map(|u| u.id), Some(ada.id.clone()));

        let by_email = find_by_login(&mut conn, "ADA@example.com").expect("query");
        assert_eq!(by_email.map(|u| u.id), Some(ada.id));

        assert!(find_by_login(&mut conn, "nobody").expect("query").is_none());
    }

    #[test]
    fn test_token_subject_carries_role_and_office() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let user = insert_user(&mut conn, "sade", Role::Supervisor, Some("Lagos"));
        let subject = token_subject(&user);
        assert_eq!(subject.role, "Supervisor");
        assert_eq!(subject.office.as_deref(), Some("Lagos"));
    }

    #[test]
    fn test_login_request_accepts_username_field() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username":"ada","password":"secret123"}"#).expect("parse");
        assert_eq!(req.login, "ada");
    }
}
