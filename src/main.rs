use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;

use quodo::core::shared::utils::{create_conn, run_migrations};
use quodo::directory::check_and_bootstrap_admin;
use quodo::main_module::run_axum_server;
use quodo::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Starting quodo {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );

    let pool = create_conn(&config.database).context("Failed to create database pool")?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;

    let app_state = Arc::new(AppState::new(config, pool)?);

    let bootstrap_pool = app_state.conn.clone();
    let bootstrap_admin = app_state.config.bootstrap.clone();
    let passwords = Arc::clone(&app_state.password_service);
    let bootstrapped = tokio::task::spawn_blocking(move || {
        check_and_bootstrap_admin(&bootstrap_pool, bootstrap_admin.as_ref(), &passwords)
    })
    .await??;
    if let Some(admin) = bootstrapped {
        info!("Bootstrap SystemAdmin '{}' <{}> is ready", admin.username, admin.email);
    }

    let jwt = Arc::clone(&app_state.jwt_manager);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15 * 60));
        loop {
            interval.tick().await;
            let removed = jwt.cleanup_blacklist().await;
            if removed > 0 {
                info!("Pruned {removed} expired revoked token(s)");
            }
        }
    });

    if let Err(e) = run_axum_server(app_state).await {
        error!("Server error: {e}");
        return Err(e.into());
    }
    info!("Server stopped");
    Ok(())
}
