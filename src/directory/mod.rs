//! Accounts and sessions: login, token refresh, user management and first-run bootstrap.

pub mod auth_routes;
pub mod bootstrap;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use auth_routes::configure_auth_routes;
pub use bootstrap::check_and_bootstrap_admin;
pub use users::configure_user_routes;

pub fn configure_directory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(configure_auth_routes())
        .merge(configure_user_routes())
}
