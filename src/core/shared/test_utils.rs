use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tempfile::TempDir;

use crate::core::config::DatabaseConfig;
use crate::core::shared::models::DbUser;
use crate::core::shared::schema::users;
use crate::core::shared::utils::{create_conn, new_id, now, run_migrations, DbPool};
use crate::security::auth_api::Role;

/// A migrated database in a temporary directory; dropped with the directory.
pub struct TestDb {
    pub pool: DbPool,
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = DatabaseConfig {
            url: dir.path().join("test.db").to_string_lossy().into_owned(),
            min_connections: 1,
            max_connections: 2,
            connect_retries: 1,
            ..DatabaseConfig::default()
        };
        let pool = create_conn(&config).expect("pool");
        run_migrations(&pool).expect("migrations");
        Self { pool, _dir: dir }
    }

    pub fn conn(&self) -> diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>> {
        self.pool.get().expect("connection")
    }
}

pub fn insert_user(
    conn: &mut SqliteConnection,
    username: &str,
    role: Role,
    office: Option<&str>,
) -> DbUser {
    let user = DbUser {
        id: new_id(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: "$argon2id$placeholder".to_string(),
        full_name: username.to_string(),
        role,
        office: office.map(str::to_string),
        phone: None,
        position: None,
        is_active: true,
        last_login_at: None,
        created_at: now(),
        updated_at: now(),
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)
        .expect("insert user");
    user
}
