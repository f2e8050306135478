//! Authentication and authorization for the API.
//!
//! Bearer JWTs are validated by [`auth_middleware`], which attaches an
//! [`AuthenticatedUser`] built from the current user row. Handlers take the
//! user as an extractor and check [`Permission`]s derived from its [`Role`].

pub mod config;
pub mod error;
pub mod middleware;
pub mod types;


pub use config::AuthConfig;
pub use error::AuthError;
pub use middleware::{auth_middleware, require_permission};
pub use types::{AuthenticatedUser, Permission, Role};
