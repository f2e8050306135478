use axum::http::Method;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Paths reachable without a token for any method.
    pub allow_anonymous_paths: Vec<String>,
    /// Paths reachable without a token for POST only.
    pub anonymous_post_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_anonymous_paths: vec![
                "/health".to_string(),
                "/api/health".to_string(),
                "/api/auth/login".to_string(),
                "/api/auth/refresh".to_string(),
            ],
            anonymous_post_paths: vec!["/api/logs".to_string()],
        }
    }
}

impl AuthConfig {
    pub fn is_anonymous_allowed(&self, method: &Method, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        let path = if path.is_empty() { "/" } else { path };

        if self.allow_anonymous_paths.iter().any(|p| p == path) {
            return true;
        }
        *method == Method::POST && self.anonymous_post_paths.iter().any(|p| p == path)
    }
}
