pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use log::info;
use std::sync::Arc;

use crate::core::shared::enums::{DropdownType, TaskStatus};
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::user_models::find_user;
use crate::core::shared::models::{DbTask, DbUser};
use crate::core::shared::schema::tasks;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{
    clamp_limit, clean_optional, new_id, now, validate_date_range, with_conn,
};
use crate::core::urls::ApiUrls;
use crate::dropdowns::require_active_value;
use crate::notifications::{notify_users, NotificationKind};
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission};
use crate::security::visibility::Scope;
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

pub use types::*;

const MAX_DESCRIPTION_LEN: usize = 4000;

/// Tasks visible to `scope`, narrowed by `filters` and ordered newest first.
/// Paging is left to the caller.
pub fn scoped_tasks_query(scope: &Scope, filters: &TaskFilters) -> tasks::BoxedQuery<'static, Sqlite> {
    let mut q = tasks::table.into_boxed();

    match scope {
        Scope::All => {}
        Scope::Office { office, user_id } => {
            q = q.filter(
                tasks::office
                    .eq(office.clone())
                    .or(tasks::user_id.eq(user_id.clone())),
            );
        }
        Scope::Own { user_id } => {
            q = q.filter(tasks::user_id.eq(user_id.clone()));
        }
    }

    if let Some(status) = filters.status {
        q = q.filter(tasks::status.eq(status));
    }
    if let Some(user_id) = &filters.user_id {
        q = q.filter(tasks::user_id.eq(user_id.clone()));
    }
    if let Some(office) = &filters.office {
        q = q.filter(tasks::office.eq(office.clone()));
    }
    if let Some(category) = &filters.category {
        q = q.filter(tasks::category.eq(category.clone()));
    }
    if let Some(source) = &filters.source {
        q = q.filter(tasks::source.eq(source.clone()));
    }
    if let Some(from) = filters.from {
        q = q.filter(tasks::task_date.ge(from));
    }
    if let Some(to) = filters.to {
        q = q.filter(tasks::task_date.le(to));
    }

    q.order((tasks::task_date.desc(), tasks::created_at.desc()))
}

/// Checks that each dropdown-backed field names an active entry, and that a
/// sub-category with a parent sits under the chosen category.
pub fn validate_classification(
    conn: &mut SqliteConnection,
    fields: &TaskClassification<'_>,
) -> ApiResult<()> {
    if let Some(source) = fields.source {
        require_active_value(conn, DropdownType::Source, source)?;
    }
    if let Some(service) = fields.service {
        require_active_value(conn, DropdownType::Service, service)?;
    }
    if let Some(obligation) = fields.obligation {
        require_active_value(conn, DropdownType::Obligation, obligation)?;
    }

    let category = match fields.category {
        Some(value) => Some(require_active_value(conn, DropdownType::Category, value)?),
        None => None,
    };

    if let Some(value) = fields.sub_category {
        let sub_category = require_active_value(conn, DropdownType::SubCategory, value)?;
        if let Some(parent_id) = &sub_category.parent_id {
            match &category {
                Some(c) if &c.id == parent_id => {}
                Some(c) => {
                    return Err(ApiError::Validation(format!(
                        "Sub-category '{}' does not belong to category '{}'",
                        sub_category.value, c.value
                    )))
                }
                None => {
                    return Err(ApiError::Validation(format!(
                        "Sub-category '{}' requires its category",
                        sub_category.value
                    )))
                }
            }
        }
    }

    Ok(())
}

/// The classification fields an update has to re-check. Untouched fields keep
/// their stored values even if the dropdown entry was since retired; a change
/// to either category or sub-category re-checks the pair.
pub fn touched_classification<'a>(
    req: &UpdateTaskRequest,
    task: &'a DbTask,
) -> TaskClassification<'a> {
    let pairing = req.category.is_some() || req.sub_category.is_some();
    let pick = |touched: bool, value: &'a Option<String>| value.as_deref().filter(|_| touched);

    TaskClassification {
        source: pick(req.source.is_some(), &task.source),
        category: pick(pairing, &task.category),
        sub_category: pick(pairing, &task.sub_category),
        service: pick(req.service.is_some(), &task.service),
        obligation: pick(req.obligation.is_some(), &task.obligation),
    }
}

/// Resolves who a task belongs to. Without `requested` the caller owns it;
/// handing it to someone else needs `AssignTasks` and, below SystemAdmin, a
/// user in the caller's office.
fn resolve_owner(
    conn: &mut SqliteConnection,
    caller: &AuthenticatedUser,
    requested: Option<&str>,
) -> ApiResult<DbUser> {
    let target_id = match requested {
        Some(id) if id != caller.user_id => id,
        _ => {
            return find_user(conn, &caller.user_id)?
                .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))
        }
    };

    require_permission(caller, Permission::AssignTasks)?;

    let target = find_user(conn, target_id)?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Validation("Assignee does not exist".to_string()))?;

    if !caller.sees_all_offices() && !caller.same_office(target.office.as_deref()) {
        return Err(ApiError::Forbidden(
            "Tasks can only be assigned to users in your office".to_string(),
        ));
    }
    Ok(target)
}

fn validate_description(description: &str) -> ApiResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(ApiError::Validation("Description is required".to_string()));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::Validation(format!(
            "Description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(description.to_string())
}

fn validate_duration(duration: Option<i32>) -> ApiResult<Option<i32>> {
    match duration {
        Some(d) if !(0..=24 * 60).contains(&d) => Err(ApiError::Validation(
            "Duration must be between 0 and 1440 minutes".to_string(),
        )),
        other => Ok(other),
    }
}

fn load_visible_task(
    conn: &mut SqliteConnection,
    scope: &Scope,
    id: &str,
) -> ApiResult<DbTask> {
    tasks::table
        .find(id)
        .first::<DbTask>(conn)
        .optional()?
        .filter(|task| scope.permits(task))
        .ok_or_else(|| ApiError::not_found("Task"))
}

fn notify_assignee(
    conn: &mut SqliteConnection,
    caller: &AuthenticatedUser,
    task: &DbTask,
) -> QueryResult<()> {
    if task.user_id == caller.user_id {
        return Ok(());
    }
    let message = format!(
        "{} assigned you a task for {}: {}",
        caller.username, task.task_date, task.description
    );
    notify_users(
        conn,
        std::slice::from_ref(&task.user_id),
        NotificationKind::TaskAssigned,
        &message,
        Some((ResourceType::Task, &task.id)),
    )?;
    Ok(())
}

pub async fn handle_task_list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<TaskFilters>,
) -> ApiResult<Json<Vec<DbTask>>> {
    require_permission(&user, Permission::ReadTasks)?;
    validate_date_range(filters.from, filters.to)?;
    let scope = Scope::for_user(&user);

    let rows = with_conn(&state.conn, move |conn| {
        Ok(scoped_tasks_query(&scope, &filters)
            .limit(clamp_limit(filters.limit, 100, 1000))
            .offset(filters.offset.unwrap_or(0).max(0))
            .load::<DbTask>(conn)?)
    })
    .await?;

    Ok(Json(rows))
}

pub async fn handle_task_get(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DbTask>> {
    require_permission(&user, Permission::ReadTasks)?;
    let scope = Scope::for_user(&user);

    let task = with_conn(&state.conn, move |conn| load_visible_task(conn, &scope, &id)).await?;
    Ok(Json(task))
}

pub async fn handle_task_create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<DbTask>)> {
    require_permission(&user, Permission::WriteTasks)?;
    let description = validate_description(&req.description)?;
    let duration_minutes = validate_duration(req.duration_minutes)?;

    let task = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let owner = resolve_owner(conn, &user, clean_optional(req.user_id).as_deref())?;

            let source = clean_optional(req.source);
            let category = clean_optional(req.category);
            let sub_category = clean_optional(req.sub_category);
            let service = clean_optional(req.service);
            let obligation = clean_optional(req.obligation);
            validate_classification(
                conn,
                &TaskClassification {
                    source: source.as_deref(),
                    category: category.as_deref(),
                    sub_category: sub_category.as_deref(),
                    service: service.as_deref(),
                    obligation: obligation.as_deref(),
                },
            )?;

            let timestamp = now();
            let status = req.status.unwrap_or_default();
            let task = DbTask {
                id: new_id(),
                user_id: owner.id.clone(),
                created_by: user.user_id.clone(),
                office: owner.office.clone(),
                task_date: req.task_date.unwrap_or_else(today),
                source,
                category,
                sub_category,
                service,
                obligation,
                description,
                status,
                duration_minutes,
                created_at: timestamp,
                updated_at: timestamp,
                completed_at: (status == TaskStatus::Completed).then_some(timestamp),
            };

            diesel::insert_into(tasks::table).values(&task).execute(conn)?;
            notify_assignee(conn, &user, &task)?;

            AuditLogEntry::new(AuditAction::Create, ResourceType::Task)
                .with_actor(&user)
                .with_resource_id(&task.id)
                .with_description(format!(
                    "Created task for {} on {}",
                    owner.username, task.task_date
                ))
                .record(conn)?;
            Ok(task)
        })
    })
    .await?;

    info!("Task {} created for user {}", task.id, task.user_id);
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn handle_task_update(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<DbTask>> {
    require_permission(&user, Permission::WriteTasks)?;
    let description = req
        .description
        .as_deref()
        .map(validate_description)
        .transpose()?;
    let duration_minutes = validate_duration(req.duration_minutes)?;
    let scope = Scope::for_user(&user);

    let task = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut task = load_visible_task(conn, &scope, &id)?;
            let previous_owner = task.user_id.clone();

            if let Some(requested) = clean_optional(req.user_id.clone()) {
                if requested != task.user_id {
                    let owner = resolve_owner(conn, &user, Some(&requested))?;
                    task.user_id = owner.id;
                    task.office = owner.office;
                }
            }

            if req.source.is_some() {
                task.source = clean_optional(req.source.clone());
            }
            if req.category.is_some() {
                task.category = clean_optional(req.category.clone());
            }
            if req.sub_category.is_some() {
                task.sub_category = clean_optional(req.sub_category.clone());
            }
            if req.service.is_some() {
                task.service = clean_optional(req.service.clone());
            }
            if req.obligation.is_some() {
                task.obligation = clean_optional(req.obligation.clone());
            }
            validate_classification(conn, &touched_classification(&req, &task))?;

            if let Some(task_date) = req.task_date {
                task.task_date = task_date;
            }
            if let Some(description) = description {
                task.description = description;
            }
            if duration_minutes.is_some() {
                task.duration_minutes = duration_minutes;
            }

            let timestamp = now();
            if let Some(next) = req.status {
                apply_status(&mut task, next, timestamp)?;
            }
            task.updated_at = timestamp;

            diesel::update(tasks::table.find(&task.id))
                .set(&task)
                .execute(conn)?;

            if task.user_id != previous_owner {
                notify_assignee(conn, &user, &task)?;
            }

            AuditLogEntry::new(AuditAction::Update, ResourceType::Task)
                .with_actor(&user)
                .with_resource_id(&task.id)
                .with_description(format!("Updated task ({})", task.status))
                .record(conn)?;
            Ok(task)
        })
    })
    .await?;

    Ok(Json(task))
}

/// Moves `task` to `next`, keeping `completed_at` in step with the status.
pub fn apply_status(
    task: &mut DbTask,
    next: TaskStatus,
    at: NaiveDateTime,
) -> ApiResult<()> {
    if !task.status.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "Cannot move a task from {} to {}",
            task.status, next
        )));
    }
    if next != task.status {
        task.completed_at = match next {
            TaskStatus::Completed => Some(at),
            _ => None,
        };
        task.status = next;
    }
    Ok(())
}

pub async fn handle_task_delete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_permission(&user, Permission::WriteTasks)?;
    let scope = Scope::for_user(&user);

    with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let task = load_visible_task(conn, &scope, &id)?;
            diesel::delete(tasks::table.find(&task.id)).execute(conn)?;

            AuditLogEntry::new(AuditAction::Delete, ResourceType::Task)
                .with_actor(&user)
                .with_resource_id(&task.id)
                .with_description(format!("Deleted task from {}", task.task_date))
                .record(conn)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TASKS, get(handle_task_list).post(handle_task_create))
        .route(
            ApiUrls::TASK_BY_ID,
            get(handle_task_get)
                .put(handle_task_update)
                .delete(handle_task_delete),
        )
}

/// Today's date in UTC, the default `task_date`.
pub fn today() -> NaiveDate {
    now().date()
}
