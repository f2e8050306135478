use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{AuthenticatedUser, Permission, Role};
use crate::security::visibility::Scope;

#[derive(Debug, Serialize)]
pub struct RolePermissions {
    pub role: Role,
    pub level: u8,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize)]
pub struct MyPermissions {
    pub user_id: String,
    pub role: Role,
    pub office: Option<String>,
    pub scope: Scope,
    pub permissions: Vec<Permission>,
}

pub fn permission_matrix() -> Vec<RolePermissions> {
    Role::ALL
        .iter()
        .map(|role| {
            let mut permissions: Vec<Permission> = role.permissions().into_iter().collect();
            permissions.sort();
            RolePermissions {
                role: *role,
                level: role.hierarchy_level(),
                permissions,
            }
        })
        .collect()
}

pub async fn handle_permission_matrix(_user: AuthenticatedUser) -> Json<Vec<RolePermissions>> {
    Json(permission_matrix())
}

pub async fn handle_my_permissions(user: AuthenticatedUser) -> Json<MyPermissions> {
    Json(MyPermissions {
        scope: Scope::for_user(&user),
        permissions: user.permissions_sorted(),
        user_id: user.user_id,
        role: user.role,
        office: user.office,
    })
}

pub fn configure_permission_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::PERMISSIONS, get(handle_permission_matrix))
        .route(ApiUrls::PERMISSIONS_ME, get(handle_my_permissions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_covers_every_role() {
        let matrix = permission_matrix();
        assert_eq!(matrix.len(), 4);

        let agent = matrix.iter().find(|r| r.role == Role::Agent).expect("agent row");
        assert!(agent.permissions.contains(&Permission::RequestLeave));
        assert!(!agent.permissions.contains(&Permission::ReviewLeave));

        let root = matrix
            .iter()
            .find(|r| r.role == Role::SystemAdmin)
            .expect("system admin row");
        assert_eq!(root.permissions.len(), Permission::ALL.len());
    }

    #[tokio::test]
    async fn test_my_permissions_reports_scope() {
        let user = AuthenticatedUser::new("u-9", "sup")
            .with_role(Role::Supervisor)
            .with_office("Kano");
        let Json(mine) = handle_my_permissions(user).await;
        assert_eq!(mine.scope.office(), Some("Kano"));
        assert!(mine.permissions.contains(&Permission::ReviewLeave));
    }
}
