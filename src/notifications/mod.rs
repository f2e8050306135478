//! Per-user notifications raised by task assignment, leave review and meeting invites.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::DbNotification;
use crate::core::shared::schema::notifications;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{clamp_limit, new_id, now, with_conn};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::AuthenticatedUser;
use crate::settings::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    LeaveRequested,
    LeaveApproved,
    LeaveRejected,
    MeetingInvite,
    MeetingUpdated,
    MeetingCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskAssigned => "task_assigned",
            Self::LeaveRequested => "leave_requested",
            Self::LeaveApproved => "leave_approved",
            Self::LeaveRejected => "leave_rejected",
            Self::MeetingInvite => "meeting_invite",
            Self::MeetingUpdated => "meeting_updated",
            Self::MeetingCancelled => "meeting_cancelled",
        }
    }
}

/// Queues one notification per recipient on the caller's connection, so
/// it commits or rolls back with the change that raised it.
pub fn notify_users(
    conn: &mut SqliteConnection,
    recipients: &[String],
    kind: NotificationKind,
    message: &str,
    resource: Option<(ResourceType, &str)>,
) -> QueryResult<usize> {
    let created_at = now();
    let rows: Vec<DbNotification> = recipients
        .iter()
        .map(|user_id| DbNotification {
            id: new_id(),
            user_id: user_id.clone(),
            kind: kind.as_str().to_string(),
            message: message.to_string(),
            resource_type: resource.map(|(t, _)| t.as_str().to_string()),
            resource_id: resource.map(|(_, id)| id.to_string()),
            is_read: false,
            created_at,
        })
        .collect();

    if rows.is_empty() {
        return Ok(0);
    }
    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub unread: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<DbNotification>,
    pub unread_count: i64,
}

pub async fn handle_list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationList>> {
    let list = with_conn(&state.conn, move |conn| {
        let mut q = notifications::table
            .filter(notifications::user_id.eq(user.user_id.clone()))
            .into_boxed();
        if query.unread.unwrap_or(false) {
            q = q.filter(notifications::is_read.eq(false));
        }

        let rows: Vec<DbNotification> = q
            .order(notifications::created_at.desc())
            .limit(clamp_limit(query.limit, 50, 200))
            .offset(query.offset.unwrap_or(0).max(0))
            .load(conn)?;

        let unread_count: i64 = notifications::table
            .filter(notifications::user_id.eq(&user.user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(conn)?;

        Ok(NotificationList {
            notifications: rows,
            unread_count,
        })
    })
    .await?;

    Ok(Json(list))
}

pub async fn handle_mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DbNotification>> {
    let row: DbNotification = with_conn(&state.conn, move |conn| {
        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(&id))
                .filter(notifications::user_id.eq(&user.user_id)),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?;

        if updated == 0 {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(notifications::table.find(&id).first(conn)?)
    })
    .await?;

    Ok(Json(row))
}

pub async fn handle_mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = with_conn(&state.conn, move |conn| {
        Ok(diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(&user.user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?)
    })
    .await?;

    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn handle_delete_notification(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(
            notifications::table
                .filter(notifications::id.eq(&id))
                .filter(notifications::user_id.eq(&user.user_id)),
        )
        .execute(conn)?;

        if deleted == 0 {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::NOTIFICATIONS, get(handle_list_notifications))
        .route(ApiUrls::NOTIFICATIONS_READ_ALL, put(handle_mark_all_read))
        .route(ApiUrls::NOTIFICATION_READ, put(handle_mark_read))
        .route(ApiUrls::NOTIFICATION_BY_ID, delete(handle_delete_notification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, TestDb};
    use crate::security::auth_api::Role;

    #[test]
    fn test_notify_users_inserts_one_row_per_recipient() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let ada = insert_user(&mut conn, "ada", Role::Agent, Some("Lagos"));
        let bola = insert_user(&mut conn, "bola", Role::Agent, Some("Lagos"));

        let inserted = notify_users(
            &mut conn,
            &[ada.id.clone(), bola.id.clone()],
            NotificationKind::MeetingInvite,
            "You have been invited to Weekly sync",
            Some((ResourceType::Meeting, "m-1")),
        )
        .expect("notify");
        assert_eq!(inserted, 2);

        let rows: Vec<DbNotification> = notifications::table
            .filter(notifications::user_id.eq(&ada.id))
            .load(&mut conn)
            .expect("load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "meeting_invite");
        assert_eq!(rows[0].resource_id.as_deref(), Some("m-1"));
        assert!(!rows[0].is_read);
    }

    #[test]
    fn test_notify_nobody_is_a_no_op() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let inserted = notify_users(&mut conn, &[], NotificationKind::TaskAssigned, "x", None)
            .expect("notify");
        assert_eq!(inserted, 0);
    }
}
