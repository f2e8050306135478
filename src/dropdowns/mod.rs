//! Typed reference data backing the task form fields.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::shared::enums::DropdownType;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::DbDropdown;
use crate::core::shared::schema::dropdowns;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{new_id, now, with_conn};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission};
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

#[derive(Debug, Default, Deserialize)]
pub struct DropdownQuery {
    #[serde(rename = "type")]
    pub dropdown_type: Option<DropdownType>,
    pub parent_id: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDropdownRequest {
    pub dropdown_type: DropdownType,
    pub value: String,
    pub parent_id: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDropdownRequest {
    pub value: Option<String>,
    pub parent_id: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct GroupedDropdowns(pub BTreeMap<DropdownType, Vec<DbDropdown>>);

fn load_dropdowns(
    conn: &mut SqliteConnection,
    query: &DropdownQuery,
    include_inactive: bool,
) -> QueryResult<Vec<DbDropdown>> {
    let mut q = dropdowns::table.into_boxed();
    if let Some(dropdown_type) = query.dropdown_type {
        q = q.filter(dropdowns::dropdown_type.eq(dropdown_type));
    }
    if let Some(parent_id) = &query.parent_id {
        q = q.filter(dropdowns::parent_id.eq(parent_id.clone()));
    }
    if !include_inactive {
        q = q.filter(dropdowns::is_active.eq(true));
    }
    q.order((
        dropdowns::dropdown_type.asc(),
        dropdowns::sort_order.asc(),
        dropdowns::value.asc(),
    ))
    .load(conn)
}

/// Finds the active entry of `dropdown_type` whose value is `value`.
pub fn find_active_value(
    conn: &mut SqliteConnection,
    dropdown_type: DropdownType,
    value: &str,
) -> QueryResult<Option<DbDropdown>> {
    dropdowns::table
        .filter(dropdowns::dropdown_type.eq(dropdown_type))
        .filter(dropdowns::value.eq(value))
        .filter(dropdowns::is_active.eq(true))
        .first(conn)
        .optional()
}

/// Checks that `value` names an active entry of `dropdown_type`.
pub fn require_active_value(
    conn: &mut SqliteConnection,
    dropdown_type: DropdownType,
    value: &str,
) -> ApiResult<DbDropdown> {
    find_active_value(conn, dropdown_type, value)?.ok_or_else(|| {
        ApiError::Validation(format!("'{value}' is not a valid {dropdown_type}"))
    })
}

fn validate_parent(
    conn: &mut SqliteConnection,
    dropdown_type: DropdownType,
    parent_id: Option<&str>,
    self_id: Option<&str>,
) -> ApiResult<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let Some(expected) = dropdown_type.parent_type() else {
        return Err(ApiError::Validation(format!(
            "{dropdown_type} entries cannot have a parent"
        )));
    };
    if self_id == Some(parent_id) {
        return Err(ApiError::Validation(
            "An entry cannot be its own parent".to_string(),
        ));
    }

    let parent: Option<DbDropdown> = dropdowns::table.find(parent_id).first(conn).optional()?;
    match parent {
        Some(p) if p.dropdown_type == expected => Ok(()),
        Some(_) => Err(ApiError::Validation(format!(
            "The parent of a {dropdown_type} must be a {expected}"
        ))),
        None => Err(ApiError::Validation("Parent entry does not exist".to_string())),
    }
}

fn ensure_unique(
    conn: &mut SqliteConnection,
    dropdown_type: DropdownType,
    value: &str,
    self_id: Option<&str>,
) -> ApiResult<()> {
    let existing: Option<DbDropdown> = dropdowns::table
        .filter(dropdowns::dropdown_type.eq(dropdown_type))
        .filter(dropdowns::value.eq(value))
        .first(conn)
        .optional()?;
    match existing {
        Some(e) if Some(e.id.as_str()) != self_id => Err(ApiError::Conflict(format!(
            "{dropdown_type} '{value}' already exists"
        ))),
        _ => Ok(()),
    }
}

fn clean_value(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation("Value is required".to_string()));
    }
    if value.chars().count() > 200 {
        return Err(ApiError::Validation(
            "Value must be at most 200 characters".to_string(),
        ));
    }
    Ok(value.to_string())
}

pub async fn handle_list_dropdowns(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<DropdownQuery>,
) -> ApiResult<Json<Vec<DbDropdown>>> {
    let include_inactive = query.include_inactive.unwrap_or(false)
        && user.has_permission(&Permission::ManageDropdowns);

    let rows = with_conn(&state.conn, move |conn| {
        Ok(load_dropdowns(conn, &query, include_inactive)?)
    })
    .await?;

    Ok(Json(rows))
}

pub async fn handle_grouped_dropdowns(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<GroupedDropdowns>> {
    let rows = with_conn(&state.conn, move |conn| {
        Ok(load_dropdowns(conn, &DropdownQuery::default(), false)?)
    })
    .await?;

    let mut grouped: BTreeMap<DropdownType, Vec<DbDropdown>> =
        DropdownType::ALL.iter().map(|t| (*t, Vec::new())).collect();
    for row in rows {
        grouped.entry(row.dropdown_type).or_default().push(row);
    }

    Ok(Json(GroupedDropdowns(grouped)))
}

pub async fn handle_get_dropdown(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DbDropdown>> {
    let row = with_conn(&state.conn, move |conn| {
        dropdowns::table
            .find(&id)
            .first::<DbDropdown>(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Dropdown"))
    })
    .await?;

    Ok(Json(row))
}

pub async fn handle_create_dropdown(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateDropdownRequest>,
) -> ApiResult<(StatusCode, Json<DbDropdown>)> {
    require_permission(&user, Permission::ManageDropdowns)?;
    let value = clean_value(&req.value)?;

    let row = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            ensure_unique(conn, req.dropdown_type, &value, None)?;
            validate_parent(conn, req.dropdown_type, req.parent_id.as_deref(), None)?;

            let timestamp = now();
            let row = DbDropdown {
                id: new_id(),
                dropdown_type: req.dropdown_type,
                value,
                parent_id: req.parent_id,
                sort_order: req.sort_order.unwrap_or(0),
                is_active: req.is_active.unwrap_or(true),
                created_at: timestamp,
                updated_at: timestamp,
            };
            diesel::insert_into(dropdowns::table)
                .values(&row)
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::Create, ResourceType::Dropdown)
                .with_actor(&user)
                .with_resource_id(&row.id)
                .with_description(format!("Created {} '{}'", row.dropdown_type, row.value))
                .record(conn)?;
            Ok(row)
        })
    })
    .await?;

    info!("Dropdown {} '{}' created", row.dropdown_type, row.value);
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handle_update_dropdown(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateDropdownRequest>,
) -> ApiResult<Json<DbDropdown>> {
    require_permission(&user, Permission::ManageDropdowns)?;
    let value = req.value.as_deref().map(clean_value).transpose()?;

    let row = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut row: DbDropdown = dropdowns::table
                .find(&id)
                .first(conn)
                .optional()?
                .ok_or_else(|| ApiError::not_found("Dropdown"))?;

            if let Some(value) = value {
                ensure_unique(conn, row.dropdown_type, &value, Some(&row.id))?;
                row.value = value;
            }
            if let Some(parent_id) = req.parent_id {
                let parent_id = Some(parent_id).filter(|p| !p.is_empty());
                validate_parent(conn, row.dropdown_type, parent_id.as_deref(), Some(&row.id))?;
                row.parent_id = parent_id;
            }
            if let Some(sort_order) = req.sort_order {
                row.sort_order = sort_order;
            }
            if let Some(is_active) = req.is_active {
                row.is_active = is_active;
            }
            row.updated_at = now();

            diesel::update(dropdowns::table.find(&row.id))
                .set(&row)
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::Update, ResourceType::Dropdown)
                .with_actor(&user)
                .with_resource_id(&row.id)
                .with_description(format!("Updated {} '{}'", row.dropdown_type, row.value))
                .record(conn)?;
            Ok(row)
        })
    })
    .await?;

    Ok(Json(row))
}

pub async fn handle_delete_dropdown(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_permission(&user, Permission::ManageDropdowns)?;

    with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let row: DbDropdown = dropdowns::table
                .find(&id)
                .first(conn)
                .optional()?
                .ok_or_else(|| ApiError::not_found("Dropdown"))?;

            let children: i64 = dropdowns::table
                .filter(dropdowns::parent_id.eq(&row.id))
                .count()
                .get_result(conn)?;
            if children > 0 {
                return Err(ApiError::Conflict(format!(
                    "{} '{}' still has {} child entries",
                    row.dropdown_type, row.value, children
                )));
            }

            diesel::delete(dropdowns::table.find(&row.id)).execute(conn)?;

            AuditLogEntry::new(AuditAction::Delete, ResourceType::Dropdown)
                .with_actor(&user)
                .with_resource_id(&row.id)
                .with_description(format!("Deleted {} '{}'", row.dropdown_type, row.value))
                .record(conn)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_dropdown_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::DROPDOWNS,
            get(handle_list_dropdowns).post(handle_create_dropdown),
        )
        .route(ApiUrls::DROPDOWNS_GROUPED, get(handle_grouped_dropdowns))
        .route(
            ApiUrls::DROPDOWN_BY_ID,
            get(handle_get_dropdown)
                .put(handle_update_dropdown)
                .delete(handle_delete_dropdown),
        )
}
