//! Leave requests and their review workflow.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::enums::{LeaveStatus, LeaveType};
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::leave_models::calendar_days;
use crate::core::shared::models::DbLeave;
use crate::core::shared::schema::{leaves, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{
    clamp_limit, clean_optional, new_id, now, validate_date_range, with_conn,
};
use crate::core::urls::ApiUrls;
use crate::notifications::{notify_users, NotificationKind};
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission, Role};
use crate::security::visibility::Scope;
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

const MAX_REASON_LEN: usize = 2000;
const MAX_LEAVE_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveFilters {
    pub status: Option<LeaveStatus>,
    pub user_id: Option<String>,
    pub leave_type: Option<LeaveType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeaveRequest {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewLeaveRequest {
    pub comment: Option<String>,
}

/// A leave with its derived day counts.
#[derive(Debug, Clone, Serialize)]
pub struct LeaveView {
    #[serde(flatten)]
    pub leave: DbLeave,
    pub days: i64,
    pub working_days: i64,
}

impl From<DbLeave> for LeaveView {
    fn from(leave: DbLeave) -> Self {
        Self {
            days: leave.days(),
            working_days: leave.working_days(),
            leave,
        }
    }
}

/// Leaves visible to `scope`. A leave matches a `from`/`to` window when any
/// of its days falls inside it.
pub fn scoped_leaves_query(
    scope: &Scope,
    filters: &LeaveFilters,
) -> leaves::BoxedQuery<'static, Sqlite> {
    let mut q = leaves::table.into_boxed();

    match scope {
        Scope::All => {}
        Scope::Office { office, user_id } => {
            q = q.filter(
                leaves::office
                    .eq(office.clone())
                    .or(leaves::user_id.eq(user_id.clone())),
            );
        }
        Scope::Own { user_id } => {
            q = q.filter(leaves::user_id.eq(user_id.clone()));
        }
    }

    if let Some(status) = filters.status {
        q = q.filter(leaves::status.eq(status));
    }
    if let Some(leave_type) = filters.leave_type {
        q = q.filter(leaves::leave_type.eq(leave_type));
    }
    if let Some(user_id) = &filters.user_id {
        q = q.filter(leaves::user_id.eq(user_id.clone()));
    }
    if let Some(from) = filters.from {
        q = q.filter(leaves::end_date.ge(from));
    }
    if let Some(to) = filters.to {
        q = q.filter(leaves::start_date.le(to));
    }

    q.order((leaves::start_date.desc(), leaves::created_at.desc()))
}

/// The caller's Pending or Approved leave that shares a day with `[start, end]`.
fn find_overlap(
    conn: &mut SqliteConnection,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> QueryResult<Option<DbLeave>> {
    leaves::table
        .filter(leaves::user_id.eq(user_id))
        .filter(leaves::status.eq_any(LeaveStatus::BLOCKING))
        .filter(leaves::start_date.le(end))
        .filter(leaves::end_date.ge(start))
        .first::<DbLeave>(conn)
        .optional()
}

/// A leave runs forward and covers at most `MAX_LEAVE_DAYS` calendar days.
pub fn validate_leave_span(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    if calendar_days(start, end) > MAX_LEAVE_DAYS {
        return Err(ApiError::Validation(format!(
            "A leave request may cover at most {MAX_LEAVE_DAYS} days"
        )));
    }
    Ok(())
}

/// Active reviewers for a request from `office`. Requests without an office go to SystemAdmins.
fn reviewers_for(
    conn: &mut SqliteConnection,
    office: Option<&str>,
    requester_id: &str,
) -> QueryResult<Vec<String>> {
    let mut q = users::table
        .select(users::id)
        .filter(users::is_active.eq(true))
        .filter(users::id.ne(requester_id))
        .into_boxed();

    q = match office {
        Some(office) => q
            .filter(users::office.eq(office.to_string()))
            .filter(users::role.eq_any(vec![Role::Supervisor, Role::Admin])),
        None => q.filter(users::role.eq(Role::SystemAdmin)),
    };
    q.load::<String>(conn)
}

fn load_visible_leave(
    conn: &mut SqliteConnection,
    scope: &Scope,
    id: &str,
) -> ApiResult<DbLeave> {
    leaves::table
        .find(id)
        .first::<DbLeave>(conn)
        .optional()?
        .filter(|leave| scope.permits(leave))
        .ok_or_else(|| ApiError::not_found("Leave"))
}

/// Rules a reviewer must satisfy before deciding on `leave`.
pub fn check_reviewable(user: &AuthenticatedUser, leave: &DbLeave) -> ApiResult<()> {
    if leave.user_id == user.user_id {
        return Err(ApiError::Forbidden(
            "You cannot review your own leave request".to_string(),
        ));
    }
    if leave.status != LeaveStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Leave is already {}",
            leave.status
        )));
    }
    Ok(())
}

/// Whether the requester may still withdraw `leave` on `today`.
pub fn can_cancel(leave: &DbLeave, today: NaiveDate) -> bool {
    match leave.status {
        LeaveStatus::Pending => true,
        LeaveStatus::Approved => leave.start_date > today,
        LeaveStatus::Rejected | LeaveStatus::Cancelled => false,
    }
}

pub async fn handle_leave_list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<LeaveFilters>,
) -> ApiResult<Json<Vec<LeaveView>>> {
    validate_date_range(filters.from, filters.to)?;
    let scope = Scope::for_user(&user);

    let rows = with_conn(&state.conn, move |conn| {
        Ok(scoped_leaves_query(&scope, &filters)
            .limit(clamp_limit(filters.limit, 100, 1000))
            .offset(filters.offset.unwrap_or(0).max(0))
            .load::<DbLeave>(conn)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(LeaveView::from).collect()))
}

pub async fn handle_leave_get(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LeaveView>> {
    let scope = Scope::for_user(&user);
    let leave = with_conn(&state.conn, move |conn| load_visible_leave(conn, &scope, &id)).await?;
    Ok(Json(leave.into()))
}

pub async fn handle_leave_create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateLeaveRequest>,
) -> ApiResult<(StatusCode, Json<LeaveView>)> {
    require_permission(&user, Permission::RequestLeave)?;
    validate_leave_span(req.start_date, req.end_date)?;
    let reason = clean_optional(req.reason);
    if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
        return Err(ApiError::Validation(format!(
            "Reason must be at most {MAX_REASON_LEN} characters"
        )));
    }

    let leave = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            if let Some(existing) = find_overlap(conn, &user.user_id, req.start_date, req.end_date)? {
                return Err(ApiError::Conflict(format!(
                    "Overlaps your {} leave from {} to {}",
                    existing.status, existing.start_date, existing.end_date
                )));
            }

            let timestamp = now();
            let leave = DbLeave {
                id: new_id(),
                user_id: user.user_id.clone(),
                office: user.office.clone(),
                leave_type: req.leave_type,
                start_date: req.start_date,
                end_date: req.end_date,
                reason,
                status: LeaveStatus::Pending,
                reviewed_by: None,
                reviewed_at: None,
                review_comment: None,
                created_at: timestamp,
                updated_at: timestamp,
            };
            diesel::insert_into(leaves::table).values(&leave).execute(conn)?;

            let reviewers = reviewers_for(conn, leave.office.as_deref(), &user.user_id)?;
            notify_users(
                conn,
                &reviewers,
                NotificationKind::LeaveRequested,
                &format!(
                    "{} requested {} leave from {} to {}",
                    user.username, leave.leave_type, leave.start_date, leave.end_date
                ),
                Some((ResourceType::Leave, &leave.id)),
            )?;

            AuditLogEntry::new(AuditAction::Create, ResourceType::Leave)
                .with_actor(&user)
                .with_resource_id(&leave.id)
                .with_description(format!(
                    "Requested {} leave {} to {}",
                    leave.leave_type, leave.start_date, leave.end_date
                ))
                .record(conn)?;
            Ok(leave)
        })
    })
    .await?;

    info!("Leave {} requested by {}", leave.id, leave.user_id);
    Ok((StatusCode::CREATED, Json(leave.into())))
}

async fn review_leave(
    state: Arc<AppState>,
    user: AuthenticatedUser,
    id: String,
    decision: LeaveStatus,
    comment: Option<String>,
) -> ApiResult<Json<LeaveView>> {
    require_permission(&user, Permission::ReviewLeave)?;
    let scope = Scope::for_user(&user);
    let comment = clean_optional(comment);

    let leave = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut leave = load_visible_leave(conn, &scope, &id)?;
            check_reviewable(&user, &leave)?;

            let timestamp = now();
            leave.status = decision;
            leave.reviewed_by = Some(user.user_id.clone());
            leave.reviewed_at = Some(timestamp);
            leave.review_comment = comment;
            leave.updated_at = timestamp;
            diesel::update(leaves::table.find(&leave.id))
                .set(&leave)
                .execute(conn)?;

            let (kind, action) = match decision {
                LeaveStatus::Approved => (NotificationKind::LeaveApproved, AuditAction::Approve),
                _ => (NotificationKind::LeaveRejected, AuditAction::Reject),
            };
            let mut message = format!(
                "Your {} leave from {} to {} was {} by {}",
                leave.leave_type,
                leave.start_date,
                leave.end_date,
                decision.as_str().to_lowercase(),
                user.username
            );
            if let Some(comment) = &leave.review_comment {
                message.push_str(": ");
                message.push_str(comment);
            }
            notify_users(
                conn,
                std::slice::from_ref(&leave.user_id),
                kind,
                &message,
                Some((ResourceType::Leave, &leave.id)),
            )?;

            AuditLogEntry::new(action, ResourceType::Leave)
                .with_actor(&user)
                .with_resource_id(&leave.id)
                .with_description(format!("Leave {}", decision.as_str().to_lowercase()))
                .record(conn)?;
            Ok(leave)
        })
    })
    .await?;

    Ok(Json(leave.into()))
}

pub async fn handle_leave_approve(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> ApiResult<Json<LeaveView>> {
    let comment = body.and_then(|Json(b)| b.comment);
    review_leave(state, user, id, LeaveStatus::Approved, comment).await
}

pub async fn handle_leave_reject(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> ApiResult<Json<LeaveView>> {
    let comment = body.and_then(|Json(b)| b.comment);
    review_leave(state, user, id, LeaveStatus::Rejected, comment).await
}

pub async fn handle_leave_cancel(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LeaveView>> {
    let scope = Scope::for_user(&user);

    let leave = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut leave = load_visible_leave(conn, &scope, &id)?;
            if leave.user_id != user.user_id {
                return Err(ApiError::Forbidden(
                    "Only the requester can cancel a leave".to_string(),
                ));
            }
            let timestamp = now();
            if !can_cancel(&leave, timestamp.date()) {
                return Err(ApiError::Conflict(format!(
                    "A {} leave starting {} can no longer be cancelled",
                    leave.status, leave.start_date
                )));
            }

            leave.status = LeaveStatus::Cancelled;
            leave.updated_at = timestamp;
            diesel::update(leaves::table.find(&leave.id))
                .set(&leave)
                .execute(conn)?;

            AuditLogEntry::new(AuditAction::Cancel, ResourceType::Leave)
                .with_actor(&user)
                .with_resource_id(&leave.id)
                .with_description("Leave cancelled by requester")
                .record(conn)?;
            Ok(leave)
        })
    })
    .await?;

    Ok(Json(leave.into()))
}

pub async fn handle_leave_delete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_permission(&user, Permission::DeleteLeave)?;
    let scope = Scope::for_user(&user);

    with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let leave = load_visible_leave(conn, &scope, &id)?;
            diesel::delete(leaves::table.find(&leave.id)).execute(conn)?;

            AuditLogEntry::new(AuditAction::Delete, ResourceType::Leave)
                .with_actor(&user)
                .with_resource_id(&leave.id)
                .with_description(format!(
                    "Deleted {} leave {} to {}",
                    leave.leave_type, leave.start_date, leave.end_date
                ))
                .record(conn)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_leave_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::LEAVES, get(handle_leave_list).post(handle_leave_create))
        .route(
            ApiUrls::LEAVE_BY_ID,
            get(handle_leave_get).delete(handle_leave_delete),
        )
        .route(ApiUrls::LEAVE_APPROVE, put(handle_leave_approve))
        .route(ApiUrls::LEAVE_REJECT, put(handle_leave_reject))
        .route(ApiUrls::LEAVE_CANCEL, put(handle_leave_cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, TestDb};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn leave(user_id: &str, start: NaiveDate, end: NaiveDate, status: LeaveStatus) -> DbLeave {
        DbLeave {
            id: new_id(),
            user_id: user_id.into(),
            office: Some("Lagos".into()),
            leave_type: LeaveType::Annual,
            start_date: start,
            end_date: end,
            reason: None,
            status,
            reviewed_by: None,
            reviewed_at: None,
            review_comment: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_overlap_ignores_closed_leaves() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let ada = insert_user(&mut conn, "ada", Role::Agent, Some("Lagos"));

        let rows = [
            leave(&ada.id, date(2024, 7, 1), date(2024, 7, 5), LeaveStatus::Approved),
            leave(&ada.id, date(2024, 8, 1), date(2024, 8, 2), LeaveStatus::Rejected),
        ];
        diesel::insert_into(leaves::table)
            .values(&rows[..])
            .execute(&mut conn)
            .expect("insert leaves");

        let clash = find_overlap(&mut conn, &ada.id, date(2024, 7, 5), date(2024, 7, 9)).expect("query");
        assert!(clash.is_some());
        let free = find_overlap(&mut conn, &ada.id, date(2024, 8, 1), date(2024, 8, 2)).expect("query");
        assert!(free.is_none());
        let after = find_overlap(&mut conn, &ada.id, date(2024, 7, 6), date(2024, 7, 6)).expect("query");
        assert!(after.is_none());
    }

    #[test]
    fn test_reviewers_are_office_supervisors_and_admins() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let requester = insert_user(&mut conn, "ada", Role::Supervisor, Some("Lagos"));
        let supervisor = insert_user(&mut conn, "sade", Role::Supervisor, Some("Lagos"));
        let admin = insert_user(&mut conn, "tunde", Role::Admin, Some("Lagos"));
        insert_user(&mut conn, "bola", Role::Agent, Some("Lagos"));
        insert_user(&mut conn, "chidi", Role::Admin, Some("Abuja"));
        let root = insert_user(&mut conn, "root", Role::SystemAdmin, None);

        let mut reviewers = reviewers_for(&mut conn, Some("Lagos"), &requester.id).expect("query");
        reviewers.sort();
        let mut expected = vec![supervisor.id, admin.id];
        expected.sort();
        assert_eq!(reviewers, expected);

        let fallback = reviewers_for(&mut conn, None, &requester.id).expect("query");
        assert_eq!(fallback, vec![root.id]);
    }

    #[test]
    fn test_review_rules() {
        let reviewer = AuthenticatedUser::new("rev", "rev")
            .with_role(Role::Supervisor)
            .with_office("Lagos");
        let pending = leave("ada", date(2024, 7, 1), date(2024, 7, 2), LeaveStatus::Pending);
        assert!(check_reviewable(&reviewer, &pending).is_ok());

        let own = leave("rev", date(2024, 7, 1), date(2024, 7, 2), LeaveStatus::Pending);
        assert_eq!(
            check_reviewable(&reviewer, &own).unwrap_err().status_code(),
            StatusCode::FORBIDDEN
        );

        let decided = leave("ada", date(2024, 7, 1), date(2024, 7, 2), LeaveStatus::Approved);
        assert_eq!(
            check_reviewable(&reviewer, &decided).unwrap_err().status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_leave_span_limits() {
        assert!(validate_leave_span(date(2030, 3, 4), date(2030, 3, 4)).is_ok());
        assert!(validate_leave_span(date(2030, 1, 1), date(2030, 12, 31)).is_ok());
        assert!(validate_leave_span(date(2028, 1, 1), date(2028, 12, 31)).is_ok());
        assert!(validate_leave_span(date(2030, 3, 10), date(2030, 3, 4)).is_err());
        let err = validate_leave_span(date(2030, 1, 1), date(2031, 1, 2)).unwrap_err();
        assert!(err.to_string().contains("366"));
    }

    #[test]
    fn test_cancel_window() {
        let today = date(2024, 7, 10);
        let pending = leave("ada", date(2024, 7, 1), date(2024, 7, 2), LeaveStatus::Pending);
        assert!(can_cancel(&pending, today));

        let upcoming = leave("ada", date(2024, 7, 11), date(2024, 7, 12), LeaveStatus::Approved);
        assert!(can_cancel(&upcoming, today));

        let started = leave("ada", date(2024, 7, 10), date(2024, 7, 12), LeaveStatus::Approved);
        assert!(!can_cancel(&started, today));

        let rejected = leave("ada", date(2024, 7, 11), date(2024, 7, 12), LeaveStatus::Rejected);
        assert!(!can_cancel(&rejected, today));
    }

    #[test]
    fn test_view_reports_day_counts() {
        let view = LeaveView::from(leave("ada", date(2024, 3, 4), date(2024, 3, 10), LeaveStatus::Pending));
        assert_eq!(view.days, 7);
        assert_eq!(view.working_days, 5);
        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(json["days"], 7);
        assert_eq!(json["status"], "Pending");
    }
}
