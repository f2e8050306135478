use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use log::info;
use serde::Deserialize;
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::user_models::find_user;
use crate::core::shared::models::{DbUser, UserProfile};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{clamp_limit, clean_optional, new_id, now, with_conn};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission, Role};
use crate::security::visibility::{can_assign_role, can_manage_user, Scope};
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub office: Option<String>,
    pub active: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Accounts visible to `scope`, ordered by username.
pub fn scoped_users_query(scope: &Scope, query: &UserQuery) -> users::BoxedQuery<'static, Sqlite> {
    let mut q = users::table.into_boxed();

    match scope {
        Scope::All => {}
        Scope::Office { office, user_id } => {
            q = q.filter(
                users::office
                    .eq(office.clone())
                    .or(users::id.eq(user_id.clone())),
            );
        }
        Scope::Own { user_id } => {
            q = q.filter(users::id.eq(user_id.clone()));
        }
    }

    if let Some(role) = query.role {
        q = q.filter(users::role.eq(role));
    }
    if let Some(office) = &query.office {
        q = q.filter(users::office.eq(office.clone()));
    }
    if let Some(active) = query.active {
        q = q.filter(users::is_active.eq(active));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        q = q.filter(
            users::username
                .like(pattern.clone())
                .escape('\\')
                .or(users::full_name.like(pattern.clone()).escape('\\'))
                .or(users::email.like(pattern).escape('\\')),
        );
    }

    q.order(users::username.asc())
}

pub fn validate_username(username: &str) -> ApiResult<String> {
    let username = username.trim();
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !(3..=50).contains(&username.len()) || !valid_chars {
        return Err(ApiError::Validation(
            "Username must be 3-50 characters of letters, digits, '.', '_' or '-'".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Emails are stored lowercased.
pub fn validate_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !well_formed || email.len() > 254 {
        return Err(ApiError::Validation(format!("Invalid email address: {email}")));
    }
    Ok(email)
}

fn validate_full_name(full_name: &str) -> ApiResult<String> {
    let full_name = full_name.trim();
    if full_name.is_empty() || full_name.chars().count() > 100 {
        return Err(ApiError::Validation(
            "Full name must be between 1 and 100 characters".to_string(),
        ));
    }
    Ok(full_name.to_string())
}

fn ensure_unique(
    conn: &mut SqliteConnection,
    username: Option<&str>,
    email: Option<&str>,
    except_id: Option<&str>,
) -> ApiResult<()> {
    if let Some(username) = username {
        let taken: i64 = users::table
            .filter(users::username.eq(username))
            .filter(users::id.ne(except_id.unwrap_or_default()))
            .count()
            .get_result(conn)?;
        if taken > 0 {
            return Err(ApiError::Conflict(format!("Username '{username}' is already taken")));
        }
    }
    if let Some(email) = email {
        let taken: i64 = users::table
            .filter(users::email.eq(email))
            .filter(users::id.ne(except_id.unwrap_or_default()))
            .count()
            .get_result(conn)?;
        if taken > 0 {
            return Err(ApiError::Conflict(format!("Email '{email}' is already in use")));
        }
    }
    Ok(())
}

fn load_visible_user(conn: &mut SqliteConnection, scope: &Scope, id: &str) -> ApiResult<DbUser> {
    find_user(conn, id)?
        .filter(|u| scope.permits(u))
        .ok_or_else(|| ApiError::not_found("User"))
}

pub async fn handle_user_list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let scope = Scope::for_user(&user);
    let rows = with_conn(&state.conn, move |conn| {
        Ok(scoped_users_query(&scope, &query)
            .limit(clamp_limit(query.limit, 100, 1000))
            .offset(query.offset.unwrap_or(0).max(0))
            .load::<DbUser>(conn)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(UserProfile::from).collect()))
}

pub async fn handle_user_get(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let scope = Scope::for_user(&user);
    let found = with_conn(&state.conn, move |conn| load_visible_user(conn, &scope, &id)).await?;
    Ok(Json(found.into()))
}

pub async fn handle_user_create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    require_permission(&user, Permission::ManageUsers)?;

    let username = validate_username(&req.username)?;
    let email = validate_email(&req.email)?;
    let full_name = validate_full_name(&req.full_name)?;
    let office = clean_optional(req.office).or_else(|| {
        (!user.sees_all_offices())
            .then(|| user.office.clone())
            .flatten()
    });
    if !can_assign_role(&user, req.role, office.as_deref()) {
        return Err(ApiError::Forbidden(format!(
            "You cannot create a {} account in this office",
            req.role
        )));
    }
    if let Some(problem) = state
        .password_service
        .check_policy(&req.password, Some(&username))
    {
        return Err(ApiError::Validation(problem));
    }

    let passwords = Arc::clone(&state.password_service);
    let created = with_conn(&state.conn, move |conn| {
        let password_hash = passwords
            .hash(&req.password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        conn.transaction::<_, ApiError, _>(|conn| {
            ensure_unique(conn, Some(&username), Some(&email), None)?;

            let timestamp = now();
            let account = DbUser {
                id: new_id(),
                username,
                email,
                password_hash,
                full_name,
                role: req.role,
                office,
                phone: clean_optional(req.phone),
                position: clean_optional(req.position),
                is_active: true,
                last_login_at: None,
                created_at: timestamp,
                updated_at: timestamp,
            };
            diesel::insert_into(users::table).values(&account).execute(conn)?;

            AuditLogEntry::new(AuditAction::Create, ResourceType::User)
                .with_actor(&user)
                .with_resource_id(&account.id)
                .with_description(format!(
                    "Created {} account {}",
                    account.role, account.username
                ))
                .record(conn)?;
            Ok(account)
        })
    })
    .await?;

    info!("User {} created with role {}", created.username, created.role);
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn handle_user_update(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    require_permission(&user, Permission::ManageUsers)?;
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let full_name = req.full_name.as_deref().map(validate_full_name).transpose()?;
    let scope = Scope::for_user(&user);

    let updated = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut account = load_visible_user(conn, &scope, &id)?;
            let is_self = account.id == user.user_id;
            if !is_self && !can_manage_user(&user, &account) {
                return Err(ApiError::forbidden());
            }

            let role = req.role.unwrap_or(account.role);
            let office = match req.office {
                Some(office) => clean_optional(Some(office)),
                None => account.office.clone(),
            };
            let role_changed = role != account.role;
            if role_changed || office != account.office {
                if is_self {
                    return Err(ApiError::Forbidden(
                        "You cannot change your own role or office".to_string(),
                    ));
                }
                if !can_assign_role(&user, role, office.as_deref()) {
                    return Err(ApiError::Forbidden(format!(
                        "You cannot assign the {role} role in this office"
                    )));
                }
            }
            if req.is_active == Some(false) && is_self {
                return Err(ApiError::Validation(
                    "You cannot deactivate your own account".to_string(),
                ));
            }

            ensure_unique(conn, None, email.as_deref(), Some(&account.id))?;
            if let Some(email) = email {
                account.email = email;
            }
            if let Some(full_name) = full_name {
                account.full_name = full_name;
            }
            if req.phone.is_some() {
                account.phone = clean_optional(req.phone);
            }
            if req.position.is_some() {
                account.position = clean_optional(req.position);
            }
            let deactivated = account.is_active && req.is_active == Some(false);
            if let Some(active) = req.is_active {
                account.is_active = active;
            }
            account.role = role;
            account.office = office;
            account.updated_at = now();

            diesel::update(users::table.find(&account.id))
                .set(&account)
                .execute(conn)?;

            let action = if role_changed {
                AuditAction::RoleAssign
            } else if deactivated {
                AuditAction::Deactivate
            } else {
                AuditAction::Update
            };
            AuditLogEntry::new(action, ResourceType::User)
                .with_actor(&user)
                .with_resource_id(&account.id)
                .with_description(format!(
                    "Updated account {} ({})",
                    account.username, account.role
                ))
                .record(conn)?;
            Ok(account)
        })
    })
    .await?;

    Ok(Json(updated.into()))
}

pub async fn handle_user_delete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_permission(&user, Permission::ManageUsers)?;
    if id == user.user_id {
        return Err(ApiError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }
    let scope = Scope::for_user(&user);

    with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let account = load_visible_user(conn, &scope, &id)?;
            if !can_manage_user(&user, &account) {
                return Err(ApiError::forbidden());
            }

            diesel::update(users::table.find(&account.id))
                .set((users::is_active.eq(false), users::updated_at.eq(now())))
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::Deactivate, ResourceType::User)
                .with_actor(&user)
                .with_resource_id(&account.id)
                .with_description(format!("Deactivated account {}", account.username))
                .record(conn)?;
            info!("User {} deactivated", account.username);
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let full_name = req.full_name.as_deref().map(validate_full_name).transpose()?;

    let updated = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut account =
                find_user(conn, &user.user_id)?.ok_or_else(|| ApiError::not_found("User"))?;

            ensure_unique(conn, None, email.as_deref(), Some(&account.id))?;
            if let Some(email) = email {
                account.email = email;
            }
            if let Some(full_name) = full_name {
                account.full_name = full_name;
            }
            if req.phone.is_some() {
                account.phone = clean_optional(req.phone);
            }
            if req.position.is_some() {
                account.position = clean_optional(req.position);
            }
            account.updated_at = now();

            diesel::update(users::table.find(&account.id))
                .set(&account)
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::Update, ResourceType::User)
                .with_actor(&user)
                .with_resource_id(&account.id)
                .with_description("Updated own profile")
                .record(conn)?;
            Ok(account)
        })
    })
    .await?;

    Ok(Json(updated.into()))
}

pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if let Some(problem) = state
        .password_service
        .check_policy(&req.new_password, Some(&user.username))
    {
        return Err(ApiError::Validation(problem));
    }
    if req.new_password == req.current_password {
        return Err(ApiError::Validation(
            "New password must differ from the current one".to_string(),
        ));
    }

    let passwords = Arc::clone(&state.password_service);
    with_conn(&state.conn, move |conn| {
        let account = find_user(conn, &user.user_id)?.ok_or_else(|| ApiError::not_found("User"))?;
        let verified = passwords
            .verify(&req.current_password, &account.password_hash)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !verified {
            return Err(ApiError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        let password_hash = passwords
            .hash(&req.new_password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        conn.transaction::<_, ApiError, _>(|conn| {
            diesel::update(users::table.find(&account.id))
                .set((
                    users::password_hash.eq(password_hash),
                    users::updated_at.eq(now()),
                ))
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::PasswordChange, ResourceType::User)
                .with_actor(&user)
                .with_resource_id(&account.id)
                .with_description("Changed own password")
                .record(conn)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::USERS, get(handle_user_list).post(handle_user_create))
        .route(ApiUrls::USER_PROFILE, put(handle_update_profile))
        .route(ApiUrls::USER_PASSWORD, put(handle_change_password))
        .route(
            ApiUrls::USER_BY_ID,
            get(handle_user_get)
                .put(handle_user_update)
                .delete(handle_user_delete),
        )
}
