use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::DbAuditLog;
use crate::core::shared::schema::audit_logs;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{
    clamp_limit, day_end_exclusive, day_start, new_id, now, validate_date_range, with_conn,
};
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    PasswordChange,
    RoleAssign,
    Deactivate,
    Approve,
    Reject,
    Cancel,
    Export,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::PasswordChange => "password_change",
            Self::RoleAssign => "role_assign",
            Self::Deactivate => "deactivate",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Session,
    Task,
    Leave,
    Meeting,
    Dropdown,
    Report,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Session => "session",
            Self::Task => "task",
            Self::Leave => "leave",
            Self::Meeting => "meeting",
            Self::Dropdown => "dropdown",
            Self::Report => "report",
        }
    }
}

/// Builder for one audit row; written with [`AuditLogEntry::record`] on the
/// connection that carries the audited change.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub actor_id: Option<String>,
    pub actor_office: Option<String>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub description: String,
}

impl AuditLogEntry {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            actor_id: None,
            actor_office: None,
            action,
            resource_type,
            resource_id: None,
            description: String::new(),
        }
    }

    pub fn with_actor(mut self, actor: &AuthenticatedUser) -> Self {
        self.actor_id = Some(actor.user_id.clone());
        self.actor_office = actor.office.clone();
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn record(self, conn: &mut SqliteConnection) -> QueryResult<DbAuditLog> {
        info!(
            "AUDIT: action={} resource={} id={} actor={} - {}",
            self.action.as_str(),
            self.resource_type.as_str(),
            self.resource_id.as_deref().unwrap_or("-"),
            self.actor_id.as_deref().unwrap_or("system"),
            self.description
        );

        let row = DbAuditLog {
            id: new_id(),
            actor_id: self.actor_id,
            actor_office: self.actor_office,
            action: self.action.as_str().to_string(),
            resource_type: self.resource_type.as_str().to_string(),
            resource_id: self.resource_id,
            description: self.description,
            created_at: now(),
        };

        diesel::insert_into(audit_logs::table)
            .values(&row)
            .execute(conn)?;
        Ok(row)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Loads audit rows matching `query`, newest first. `actor_office` pins the
/// rows to one office; `only_actor` pins them to one actor.
pub fn load_audit_entries(
    conn: &mut SqliteConnection,
    query: &AuditQuery,
    actor_office: Option<&str>,
    only_actor: Option<&str>,
) -> QueryResult<Vec<DbAuditLog>> {
    let mut q = audit_logs::table.into_boxed();

    if let Some(office) = actor_office {
        q = q.filter(audit_logs::actor_office.eq(office.to_string()));
    }
    if let Some(actor) = only_actor {
        q = q.filter(audit_logs::actor_id.eq(actor.to_string()));
    } else if let Some(actor) = &query.actor_id {
        q = q.filter(audit_logs::actor_id.eq(actor.clone()));
    }
    if let Some(action) = &query.action {
        q = q.filter(audit_logs::action.eq(action.clone()));
    }
    if let Some(resource_type) = &query.resource_type {
        q = q.filter(audit_logs::resource_type.eq(resource_type.clone()));
    }
    if let Some(from) = query.from {
        q = q.filter(audit_logs::created_at.ge(day_start(from)));
    }
    if let Some(to) = query.to {
        q = q.filter(audit_logs::created_at.lt(day_end_exclusive(to)));
    }

    q.order(audit_logs::created_at.desc())
        .limit(clamp_limit(query.limit, 100, 1000))
        .offset(query.offset.unwrap_or(0).max(0))
        .load(conn)
}

pub async fn handle_list_audit(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<DbAuditLog>>> {
    require_permission(&user, Permission::ViewAudit)?;
    validate_date_range(query.from, query.to)?;

    let entries = with_conn(&state.conn, move |conn| {
        let entries = match user.office.as_deref() {
            _ if user.sees_all_offices() => load_audit_entries(conn, &query, None, None)?,
            Some(office) => load_audit_entries(conn, &query, Some(office), None)?,
            None => load_audit_entries(conn, &query, None, Some(&user.user_id))?,
        };
        Ok::<_, ApiError>(entries)
    })
    .await?;

    Ok(Json(entries))
}

pub fn configure_audit_routes() -> Router<Arc<AppState>> {
    Router::new().route(ApiUrls::AUDIT, get(handle_list_audit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::TestDb;

    #[test]
    fn test_entry_builder() {
        let actor = AuthenticatedUser::new("u-1", "ada").with_office("Lagos");
        let entry = AuditLogEntry::new(AuditAction::Approve, ResourceType::Leave)
            .with_actor(&actor)
            .with_resource_id("l-1")
            .with_description("Approved leave");

        assert_eq!(entry.actor_id.as_deref(), Some("u-1"));
        assert_eq!(entry.actor_office.as_deref(), Some("Lagos"));
        assert_eq!(entry.action.as_str(), "approve");
        assert_eq!(entry.resource_type.as_str(), "leave");
    }

    #[test]
    fn test_record_and_filter_by_office() {
        let db = TestDb::new();
        let mut conn = db.conn();

        let lagos = AuthenticatedUser::new("u-1", "ada").with_office("Lagos");
        let abuja = AuthenticatedUser::new("u-2", "bola").with_office("Abuja");

        AuditLogEntry::new(AuditAction::Create, ResourceType::Task)
            .with_actor(&lagos)
            .record(&mut conn)
            .expect("record");
        AuditLogEntry::new(AuditAction::Delete, ResourceType::Task)
            .with_actor(&abuja)
            .record(&mut conn)
            .expect("record");

        let query = AuditQuery::default();
        let all = load_audit_entries(&mut conn, &query, None, None).expect("load");
        assert_eq!(all.len(), 2);

        let office_only = load_audit_entries(&mut conn, &query, Some("Lagos"), None).expect("load");
        assert_eq!(office_only.len(), 1);
        assert_eq!(office_only[0].actor_id.as_deref(), Some("u-1"));

        let deletes = AuditQuery {
            action: Some("delete".to_string()),
            ..AuditQuery::default()
        };
        let filtered = load_audit_entries(&mut conn, &deletes, None, None).expect("load");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].actor_id.as_deref(), Some("u-2"));
    }
}
