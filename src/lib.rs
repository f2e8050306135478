pub mod core;
pub mod directory;
pub mod dropdowns;
pub mod leaves;
pub mod main_module;
pub mod meet;
pub mod notifications;
pub mod reports;
pub mod security;
pub mod settings;
pub mod tasks;

pub use crate::core::config::AppConfig;
pub use crate::core::shared::error::{ApiError, ApiResult};
pub use crate::core::shared::state::AppState;
pub use crate::main_module::build_router;
