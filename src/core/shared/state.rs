use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::security::auth_api::AuthConfig;
use crate::security::jwt::JwtManager;
use crate::security::password::PasswordService;

/// Shared handles passed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub auth_config: Arc<AuthConfig>,
    pub jwt_manager: Arc<JwtManager>,
    pub password_service: Arc<PasswordService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, conn: DbPool) -> Result<Self> {
        let jwt_manager = JwtManager::from_settings(&config.jwt)?;
        let password_service = PasswordService::from_settings(&config.password)?;
        Ok(Self::with_services(config, conn, jwt_manager, password_service))
    }

    pub fn with_services(
        config: AppConfig,
        conn: DbPool,
        jwt_manager: JwtManager,
        password_service: PasswordService,
    ) -> Self {
        Self {
            conn,
            config: Arc::new(config),
            auth_config: Arc::new(AuthConfig::default()),
            jwt_manager: Arc::new(jwt_manager),
            password_service: Arc::new(password_service),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
