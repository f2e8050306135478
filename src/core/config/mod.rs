use anyhow::{anyhow, Context, Result};
use log::warn;
use std::collections::HashMap;

pub const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production-minimum-32-chars";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub cors: CorsSettings,
    pub password: PasswordSettings,
    pub bootstrap: Option<BootstrapAdmin>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "quodo.db".to_string(),
            min_connections: 5,
            max_connections: 20,
            connect_retries: 5,
            retry_delay_ms: 1000,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

#[derive(Clone, Debug)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct PasswordSettings {
    pub argon2_memory_kib: u32,
    pub argon2_time_cost: u32,
}

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AppConfig {
    /// Loads configuration from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: get("DATABASE_URL").unwrap_or(defaults.url.as_str()).to_string(),
            min_connections: parse_or(get("DATABASE_MIN_CONNECTIONS"), defaults.min_connections)?,
            max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), defaults.max_connections)?,
            connect_retries: parse_or(get("DATABASE_CONNECT_RETRIES"), defaults.connect_retries)?,
            retry_delay_ms: parse_or(get("DATABASE_RETRY_DELAY_MS"), defaults.retry_delay_ms)?,
            connect_timeout_secs: parse_or(
                get("DATABASE_CONNECT_TIMEOUT_SECS"),
                defaults.connect_timeout_secs,
            )?,
        };
        if database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be at least 1"));
        }

        let production = get("APP_ENV").map(|e| e.eq_ignore_ascii_case("production")) == Some(true);
        let secret = match get("JWT_SECRET") {
            Some(secret) => secret.to_string(),
            None if production => return Err(anyhow!("JWT_SECRET is required in production")),
            None => {
                warn!("JWT_SECRET not set, using default development secret - DO NOT USE IN PRODUCTION");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt = JwtSettings {
            secret,
            issuer: get("JWT_ISSUER").unwrap_or("quodo").to_string(),
            audience: get("JWT_AUDIENCE").unwrap_or("quodo-api").to_string(),
            access_token_minutes: parse_or(get("JWT_ACCESS_MINUTES"), 60)?,
            refresh_token_days: parse_or(get("JWT_REFRESH_DAYS"), 7)?,
        };

        let cors = CorsSettings {
            allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(split_list)
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        };

        let password = PasswordSettings {
            argon2_memory_kib: parse_or(get("ARGON2_MEMORY_KIB"), 19456)?,
            argon2_time_cost: parse_or(get("ARGON2_TIME_COST"), 2)?,
        };

        let bootstrap = match (
            get("BOOTSTRAP_ADMIN_USERNAME"),
            get("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin {
                username: username.to_string(),
                email: get("BOOTSTRAP_ADMIN_EMAIL")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{username}@localhost")),
                password: password.to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or("0.0.0.0").to_string(),
                port: parse_or(get("SERVER_PORT"), 5000)?,
            },
            database,
            jwt,
            cors,
            password,
            bootstrap,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T>(value: Option<&str>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid configuration value: {raw}")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_map(&HashMap::new()).expect("config");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.jwt.secret, DEV_JWT_SECRET);
        assert_eq!(config.jwt.access_token_minutes, 60);
        assert!(config.bootstrap.is_none());
        assert_eq!(config.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_map(&vars(&[
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "sqlite://data/app.db"),
            ("DATABASE_MAX_CONNECTIONS", "8"),
            ("JWT_SECRET", "a-very-long-production-secret-value"),
            ("CORS_ALLOWED_ORIGINS", "https://app.example.com, https://admin.example.com"),
            ("BOOTSTRAP_ADMIN_USERNAME", "root"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "changeme123"),
        ]))
        .expect("config");

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.database.url, "sqlite://data/app.db");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://app.example.com", "https://admin.example.com"]
        );
        let bootstrap = config.bootstrap.expect("bootstrap admin");
        assert_eq!(bootstrap.email, "root@localhost");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = AppConfig::from_map(&vars(&[("SERVER_PORT", "eighty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_production_requires_secret() {
        let result = AppConfig::from_map(&vars(&[("APP_ENV", "production")]));
        assert!(result.is_err());
    }
}
