use anyhow::{anyhow, Result};
use diesel::prelude::*;
use log::{info, warn};

use crate::core::config::BootstrapAdmin;
use crate::core::shared::models::DbUser;
use crate::core::shared::schema::users;
use crate::core::shared::utils::{new_id, now, DbPool};
use crate::security::auth_api::Role;
use crate::security::password::PasswordService;
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

use super::users::{validate_email, validate_username};

pub struct BootstrapResult {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

/// Creates the first SystemAdmin when the users table is empty. Returns
/// `None` when accounts already exist or no credentials are configured.
pub fn check_and_bootstrap_admin(
    pool: &DbPool,
    admin: Option<&BootstrapAdmin>,
    passwords: &PasswordService,
) -> Result<Option<BootstrapResult>> {
    let mut conn = pool.get()?;
    let existing: i64 = users::table.count().get_result(&mut conn)?;
    if existing > 0 {
        info!("{existing} account(s) present, skipping bootstrap");
        return Ok(None);
    }

    let Some(admin) = admin else {
        warn!("No users exist and BOOTSTRAP_ADMIN_USERNAME/BOOTSTRAP_ADMIN_PASSWORD are not set");
        return Ok(None);
    };

    let username = validate_username(&admin.username).map_err(|e| anyhow!("{e}"))?;
    let email = validate_email(&admin.email).map_err(|e| anyhow!("{e}"))?;
    if let Some(problem) = passwords.check_policy(&admin.password, Some(&username)) {
        return Err(anyhow!("Bootstrap admin password rejected: {problem}"));
    }

    let timestamp = now();
    let account = DbUser {
        id: new_id(),
        username,
        email,
        password_hash: passwords.hash(&admin.password)?,
        full_name: "System Administrator".to_string(),
        role: Role::SystemAdmin,
        office: None,
        phone: None,
        position: None,
        is_active: true,
        last_login_at: None,
        created_at: timestamp,
        updated_at: timestamp,
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(users::table).values(&account).execute(conn)?;
        AuditLogEntry::new(AuditAction::Create, ResourceType::User)
            .with_resource_id(&account.id)
            .with_description(format!("Bootstrapped SystemAdmin {}", account.username))
            .record(conn)?;
        Ok(())
    })?;

    info!("Created bootstrap SystemAdmin '{}'", account.username);
    Ok(Some(BootstrapResult {
        user_id: account.id,
        username: account.username,
        email: account.email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, TestDb};
    use crate::security::password::{Argon2Config, PasswordConfig};

    fn passwords() -> PasswordService {
        PasswordService::new(Argon2Config::low_memory(), PasswordConfig::default()).expect("service")
    }

    fn admin(password: &str) -> BootstrapAdmin {
        BootstrapAdmin {
            username: "root".into(),
            email: "root@quodo.example".into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_bootstrap_creates_system_admin_once() {
        let db = TestDb::new();
        let config = admin("firstrun2024");

        let created = check_and_bootstrap_admin(&db.pool, Some(&config), &passwords())
            .expect("bootstrap")
            .expect("created");
        assert_eq!(created.username, "root");

        let mut conn = db.conn();
        let stored: DbUser = users::table
            .find(&created.user_id)
            .first(&mut conn)
            .expect("stored");
        assert_eq!(stored.role, Role::SystemAdmin);
        assert!(passwords().verify("firstrun2024", &stored.password_hash).expect("verify"));
        drop(conn);

        let again = check_and_bootstrap_admin(&db.pool, Some(&config), &passwords()).expect("bootstrap");
        assert!(again.is_none());
    }

    #[test]
    fn test_bootstrap_skips_populated_database() {
        let db = TestDb::new();
        let mut conn = db.conn();
        insert_user(&mut conn, "ada", Role::Agent, None);
        drop(conn);

        let result = check_and_bootstrap_admin(&db.pool, Some(&admin("firstrun2024")), &passwords())
            .expect("bootstrap");
        assert!(result.is_none());
    }

    #[test]
    fn test_bootstrap_rejects_weak_password() {
        let db = TestDb::new();
        assert!(check_and_bootstrap_admin(&db.pool, Some(&admin("short")), &passwords()).is_err());
    }
}
