use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::core::config::CorsSettings;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "Accept".to_string(),
                "Origin".to_string(),
            ],
            exposed_headers: vec!["Content-Disposition".to_string()],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn from_settings(settings: &CorsSettings) -> Self {
        let origins: Vec<String> = settings
            .allowed_origins
            .iter()
            .filter(|o| {
                let valid = is_valid_origin_format(o);
                if !valid {
                    warn!("Ignoring malformed CORS origin: {}", o);
                }
                valid
            })
            .cloned()
            .collect();

        info!("CORS configured with {} allowed origins", origins.len());
        Self::default().with_origins(origins)
    }

    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let headers: Vec<header::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        let exposed: Vec<header::HeaderName> = self
            .exposed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        let mut cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(self.allowed_methods)
            .allow_headers(headers)
            .expose_headers(exposed)
            .max_age(std::time::Duration::from_secs(self.max_age_secs));

        if self.allow_credentials {
            cors = cors.allow_credentials(true);
        }

        cors
    }
}

pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    CorsConfig::from_settings(settings).build()
}

fn is_valid_origin_format(origin: &str) -> bool {
    let rest = match origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
    {
        Some(rest) => rest,
        None => return false,
    };

    !rest.is_empty()
        && !rest.contains('/')
        && !rest.contains('<')
        && !rest.contains('>')
        && !rest.contains('%')
        && !rest.chars().any(char::is_whitespace)
}
