pub mod audit_log;
pub mod logs;
pub mod permissions;

use axum::Router;
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use audit_log::{AuditAction, AuditLogEntry, ResourceType};

pub fn configure_settings_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(audit_log::configure_audit_routes())
        .merge(logs::configure_log_routes())
        .merge(permissions::configure_permission_routes())
}
