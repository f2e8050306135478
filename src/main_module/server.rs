//! HTTP server initialization and routing

use axum::{body::Body, http::Request, routing::get, Router};
use log::{error, info};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::directory::configure_directory_routes;
use crate::dropdowns::configure_dropdown_routes;
use crate::leaves::configure_leave_routes;
use crate::meet::configure_meeting_routes;
use crate::notifications::configure_notification_routes;
use crate::reports::configure_report_routes;
use crate::security::auth_api::auth_middleware;
use crate::security::cors::create_cors_layer;
use crate::settings::configure_settings_routes;
use crate::tasks::configure_task_routes;

use super::{health_check, shutdown_signal};

/// Every route behind the authentication middleware, CORS and request tracing.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(ApiUrls::HEALTH, get(health_check))
        .route(ApiUrls::API_HEALTH, get(health_check))
        .merge(configure_directory_routes())
        .merge(configure_task_routes())
        .merge(configure_leave_routes())
        .merge(configure_meeting_routes())
        .merge(configure_dropdown_routes())
        .merge(configure_report_routes())
        .merge(configure_settings_routes())
        .merge(configure_notification_routes());

    let cors = create_cors_layer(&app_state.config.cors);

    // Outermost first: trace, then CORS, then authentication
    let layers = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(cors)
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    api_router.layer(layers).with_state(app_state)
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
