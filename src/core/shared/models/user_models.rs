use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::shared::schema::users;
use crate::security::auth_api::{AuthenticatedUser, Role};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct DbUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl DbUser {
    pub fn to_authenticated(&self) -> AuthenticatedUser {
        let mut user = AuthenticatedUser::new(&self.id, &self.username)
            .with_role(self.role)
            .with_email(&self.email)
            .with_full_name(&self.full_name);
        user.office = self.office.clone();
        user
    }
}

/// Public view of a user account; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<DbUser> for UserProfile {
    fn from(db: DbUser) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            full_name: db.full_name,
            role: db.role,
            office: db.office,
            phone: db.phone,
            position: db.position,
            is_active: db.is_active,
            last_login_at: db.last_login_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

pub fn find_user(conn: &mut SqliteConnection, user_id: &str) -> QueryResult<Option<DbUser>> {
    users::table
        .find(user_id)
        .select(DbUser::as_select())
        .first(conn)
        .optional()
}
