use crate::core::config::DatabaseConfig;
use crate::core::shared::error::ApiError;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use log::{info, warn};
use std::time::Duration;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub busy_timeout_ms: u32,
    pub enable_wal: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            enable_wal: true,
        }
    }
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        );
        if self.enable_wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Strips the `sqlite://` / `sqlite:` prefixes some tooling puts on database URLs.
pub fn normalize_sqlite_url(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let url = normalize_sqlite_url(&config.url).to_string();
    let attempts = config.connect_retries.max(1);
    let mut attempt = 1;

    loop {
        let manager = ConnectionManager::<SqliteConnection>::new(url.clone());
        let result = Pool::builder()
            .min_idle(Some(config.min_connections.min(config.max_connections)))
            .max_size(config.max_connections.max(1))
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connection_customizer(Box::new(ConnectionOptions::default()))
            .build(manager);

        match result {
            Ok(pool) => {
                info!(
                    "Database pool ready ({} max connections) after {} attempt(s)",
                    config.max_connections, attempt
                );
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                warn!("Database pool attempt {attempt}/{attempts} failed: {e}");
                std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS).map_err(
        |e| -> Box<dyn std::error::Error + Send + Sync> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Migration error: {}", e),
            ))
        },
    )?;
    info!("Applied {} pending migration(s)", applied.len());
    Ok(())
}

/// Runs blocking diesel work on the blocking thread pool with a pooled connection.
pub async fn with_conn<F, T>(pool: &DbPool, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        work(&mut *conn)
    })
    .await?
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Trims a string and treats empty results as absent.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

pub fn day_start(date: chrono::NaiveDate) -> chrono::NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// First instant after `date`, for half-open `[from, to]` timestamp filters.
pub fn day_end_exclusive(date: chrono::NaiveDate) -> chrono::NaiveDateTime {
    day_start(date) + chrono::Duration::days(1)
}

/// Rejects `from > to` ranges given as query parameters.
pub fn validate_date_range(
    from: Option<chrono::NaiveDate>,
    to: Option<chrono::NaiveDate>,
) -> Result<(), ApiError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ApiError::Validation(
            "'from' must not be after 'to'".to_string(),
        )),
        _ => Ok(()),
    }
}
