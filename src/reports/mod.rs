//! Task and leave summaries, plus the CSV task export.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::shared::enums::{LeaveStatus, TaskStatus};
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::leave_models::{calendar_days, working_days};
use crate::core::shared::models::{DbLeave, DbTask};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{validate_date_range, with_conn};
use crate::core::urls::ApiUrls;
use crate::leaves::{scoped_leaves_query, LeaveFilters};
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission};
use crate::security::visibility::Scope;
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};
use crate::tasks::{scoped_tasks_query, TaskFilters};

const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub office: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserTaskSummary {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub total: i64,
    pub completed: i64,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total: i64,
    pub total_duration_minutes: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
    pub by_user: Vec<UserTaskSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLeaveSummary {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub approved_days: i64,
    pub approved_working_days: i64,
    pub pending_requests: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveSummary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub users: Vec<UserLeaveSummary>,
}

type UserNames = HashMap<String, (String, String)>;

fn load_user_names(conn: &mut SqliteConnection, ids: &[String]) -> QueryResult<UserNames> {
    let rows = users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::username, users::full_name))
        .load::<(String, String, String)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(id, username, full_name)| (id, (username, full_name)))
        .collect())
}

fn names_for(names: &UserNames, user_id: &str) -> (String, String) {
    names
        .get(user_id)
        .cloned()
        .unwrap_or_else(|| (user_id.to_string(), String::new()))
}

fn distinct_user_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.cloned().collect();
    ids.sort();
    ids.dedup();
    ids
}

fn task_filters(query: &ReportQuery) -> TaskFilters {
    TaskFilters {
        office: query.office.clone(),
        from: query.from,
        to: query.to,
        ..TaskFilters::default()
    }
}

/// Aggregates `tasks`; every status appears in `by_status`, even at zero.
pub fn summarize_tasks(query: &ReportQuery, tasks: &[DbTask], names: &UserNames) -> TaskSummary {
    let mut by_status: BTreeMap<String, i64> = TaskStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_user: BTreeMap<&str, UserTaskSummary> = BTreeMap::new();
    let mut total_duration_minutes = 0;

    for task in tasks {
        let minutes = i64::from(task.duration_minutes.unwrap_or(0));
        total_duration_minutes += minutes;
        *by_status.entry(task.status.as_str().to_string()).or_default() += 1;
        *by_category
            .entry(task.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()))
            .or_default() += 1;

        let entry = by_user.entry(task.user_id.as_str()).or_insert_with(|| {
            let (username, full_name) = names_for(names, &task.user_id);
            UserTaskSummary {
                user_id: task.user_id.clone(),
                username,
                full_name,
                total: 0,
                completed: 0,
                duration_minutes: 0,
            }
        });
        entry.total += 1;
        entry.duration_minutes += minutes;
        if task.status == TaskStatus::Completed {
            entry.completed += 1;
        }
    }

    let mut by_user: Vec<UserTaskSummary> = by_user.into_values().collect();
    by_user.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.username.cmp(&b.username)));

    TaskSummary {
        from: query.from,
        to: query.to,
        total: tasks.len() as i64,
        total_duration_minutes,
        by_status,
        by_category,
        by_user,
    }
}

/// Per-user leave totals. Approved days are clipped to the `from`/`to` window.
pub fn summarize_leaves(query: &ReportQuery, leaves: &[DbLeave], names: &UserNames) -> LeaveSummary {
    let mut by_user: BTreeMap<&str, UserLeaveSummary> = BTreeMap::new();

    for leave in leaves {
        let entry = by_user.entry(leave.user_id.as_str()).or_insert_with(|| {
            let (username, full_name) = names_for(names, &leave.user_id);
            UserLeaveSummary {
                user_id: leave.user_id.clone(),
                username,
                full_name,
                approved_days: 0,
                approved_working_days: 0,
                pending_requests: 0,
            }
        });

        match leave.status {
            LeaveStatus::Approved => {
                let start = query.from.map_or(leave.start_date, |f| f.max(leave.start_date));
                let end = query.to.map_or(leave.end_date, |t| t.min(leave.end_date));
                entry.approved_days += calendar_days(start, end);
                entry.approved_working_days += working_days(start, end);
            }
            LeaveStatus::Pending => entry.pending_requests += 1,
            LeaveStatus::Rejected | LeaveStatus::Cancelled => {}
        }
    }

    let mut users: Vec<UserLeaveSummary> = by_user.into_values().collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));

    LeaveSummary {
        from: query.from,
        to: query.to,
        users,
    }
}

pub fn tasks_to_csv(tasks: &[DbTask], names: &UserNames) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let csv_err = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {e}"));

    writer
        .write_record([
            "Date",
            "User",
            "Office",
            "Source",
            "Category",
            "Sub-category",
            "Service",
            "Obligation",
            "Description",
            "Status",
            "Duration (minutes)",
            "Completed at",
        ])
        .map_err(csv_err)?;

    for task in tasks {
        let (username, _) = names_for(names, &task.user_id);
        writer
            .write_record([
                task.task_date.to_string(),
                username,
                task.office.clone().unwrap_or_default(),
                task.source.clone().unwrap_or_default(),
                task.category.clone().unwrap_or_default(),
                task.sub_category.clone().unwrap_or_default(),
                task.service.clone().unwrap_or_default(),
                task.obligation.clone().unwrap_or_default(),
                task.description.clone(),
                task.status.to_string(),
                task.duration_minutes.map(|d| d.to_string()).unwrap_or_default(),
                task.completed_at.map(|t| t.to_string()).unwrap_or_default(),
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {e}")))
}

pub async fn handle_task_summary(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<TaskSummary>> {
    require_permission(&user, Permission::ViewReports)?;
    validate_date_range(query.from, query.to)?;
    let scope = Scope::for_user(&user);

    let summary = with_conn(&state.conn, move |conn| {
        let tasks = scoped_tasks_query(&scope, &task_filters(&query)).load::<DbTask>(conn)?;
        let names = load_user_names(conn, &distinct_user_ids(tasks.iter().map(|t| &t.user_id)))?;
        Ok(summarize_tasks(&query, &tasks, &names))
    })
    .await?;

    Ok(Json(summary))
}

pub async fn handle_leave_summary(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<LeaveSummary>> {
    require_permission(&user, Permission::ViewReports)?;
    validate_date_range(query.from, query.to)?;
    let scope = Scope::for_user(&user);

    let summary = with_conn(&state.conn, move |conn| {
        let filters = LeaveFilters {
            from: query.from,
            to: query.to,
            ..LeaveFilters::default()
        };
        let mut leaves = scoped_leaves_query(&scope, &filters).load::<DbLeave>(conn)?;
        if let Some(office) = &query.office {
            leaves.retain(|l| l.office.as_deref() == Some(office.as_str()));
        }
        let names = load_user_names(conn, &distinct_user_ids(leaves.iter().map(|l| &l.user_id)))?;
        Ok(summarize_leaves(&query, &leaves, &names))
    })
    .await?;

    Ok(Json(summary))
}

pub async fn handle_task_export(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&user, Permission::ViewReports)?;
    validate_date_range(query.from, query.to)?;
    let scope = Scope::for_user(&user);
    let filename = format!(
        "tasks-{}-{}.csv",
        query.from.map(|d| d.to_string()).unwrap_or_else(|| "all".to_string()),
        query.to.map(|d| d.to_string()).unwrap_or_else(|| "all".to_string()),
    );

    let body = with_conn(&state.conn, move |conn| {
        let tasks = scoped_tasks_query(&scope, &task_filters(&query)).load::<DbTask>(conn)?;
        let names = load_user_names(conn, &distinct_user_ids(tasks.iter().map(|t| &t.user_id)))?;
        let body = tasks_to_csv(&tasks, &names)?;

        AuditLogEntry::new(AuditAction::Export, ResourceType::Report)
            .with_actor(&user)
            .with_description(format!("Exported {} task(s) as CSV", tasks.len()))
            .record(conn)?;
        Ok(body)
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

pub fn configure_report_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::REPORTS_TASKS_SUMMARY, get(handle_task_summary))
        .route(ApiUrls::REPORTS_TASKS_EXPORT, get(handle_task_export))
        .route(ApiUrls::REPORTS_LEAVES_SUMMARY, get(handle_leave_summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::LeaveType;
    use crate::core::shared::utils::now;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
    }

    fn task(user: &str, category: Option<&str>, status: TaskStatus, minutes: i32) -> DbTask {
        DbTask {
            id: format!("{user}-{minutes}"),
            user_id: user.into(),
            created_by: user.into(),
            office: Some("Lagos".into()),
            task_date: date(4),
            source: None,
            category: category.map(str::to_string),
            sub_category: None,
            service: None,
            obligation: None,
            description: "Reconciled, then \"filed\"".into(),
            status,
            duration_minutes: Some(minutes),
            created_at: now(),
            updated_at: now(),
            completed_at: None,
        }
    }

    fn names() -> UserNames {
        let mut names = HashMap::new();
        names.insert("u1".to_string(), ("ada".to_string(), "Ada O".to_string()));
        names.insert("u2".to_string(), ("bola".to_string(), "Bola A".to_string()));
        names
    }

    #[test]
    fn test_task_summary_counts() {
        let tasks = vec![
            task("u1", Some("Tax"), TaskStatus::Completed, 30),
            task("u1", Some("Tax"), TaskStatus::Pending, 15),
            task("u2", None, TaskStatus::Completed, 60),
        ];
        let summary = summarize_tasks(&ReportQuery::default(), &tasks, &names());

        assert_eq!(summary.total, 3);
        assert_eq!(summary.total_duration_minutes, 105);
        assert_eq!(summary.by_status["Completed"], 2);
        assert_eq!(summary.by_status["Cancelled"], 0);
        assert_eq!(summary.by_category["Tax"], 2);
        assert_eq!(summary.by_category[UNCATEGORIZED], 1);
        assert_eq!(summary.by_user[0].username, "ada");
        assert_eq!(summary.by_user[0].completed, 1);
        assert_eq!(summary.by_user[1].duration_minutes, 60);
    }

    #[test]
    fn test_leave_summary_clips_to_window() {
        let leave = |user: &str, start: u32, end: u32, status: LeaveStatus| DbLeave {
            id: format!("{user}-{start}"),
            user_id: user.into(),
            office: Some("Lagos".into()),
            leave_type: LeaveType::Annual,
            start_date: date(start),
            end_date: date(end),
            reason: None,
            status,
            reviewed_by: None,
            reviewed_at: None,
            review_comment: None,
            created_at: now(),
            updated_at: now(),
        };
        // 4 March 2024 is a Monday
        let leaves = vec![
            leave("u1", 4, 10, LeaveStatus::Approved),
            leave("u1", 20, 21, LeaveStatus::Pending),
            leave("u2", 1, 1, LeaveStatus::Rejected),
        ];
        let query = ReportQuery {
            from: Some(date(6)),
            to: Some(date(31)),
            office: None,
        };
        let summary = summarize_leaves(&query, &leaves, &names());

        assert_eq!(summary.users.len(), 2);
        let ada = &summary.users[0];
        assert_eq!(ada.approved_days, 5);
        assert_eq!(ada.approved_working_days, 3);
        assert_eq!(ada.pending_requests, 1);
        assert_eq!(summary.users[1].approved_days, 0);
    }

    #[test]
    fn test_csv_export_quotes_fields() {
        let tasks = vec![task("u1", Some("Tax"), TaskStatus::Completed, 30)];
        let body = tasks_to_csv(&tasks, &names()).expect("csv");
        let text = String::from_utf8(body).expect("utf8");
        let mut lines = text.lines();

        assert!(lines.next().expect("header").starts_with("Date,User,Office"));
        let row = lines.next().expect("row");
        assert!(row.starts_with("2024-03-04,ada,Lagos,,Tax"));
        assert!(row.contains("\"Reconciled, then \"\"filed\"\"\""));
        assert!(row.contains(",Completed,30,"));
    }
}
