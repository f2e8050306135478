use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadTasks,
    WriteTasks,
    AssignTasks,
    RequestLeave,
    ReviewLeave,
    DeleteLeave,
    ScheduleMeetings,
    ManageMeetings,
    ManageUsers,
    ManageDropdowns,
    ViewReports,
    ViewAudit,
    ViewAllOffices,
    AssignAnyRole,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Self::ReadTasks,
        Self::WriteTasks,
        Self::AssignTasks,
        Self::RequestLeave,
        Self::ReviewLeave,
        Self::DeleteLeave,
        Self::ScheduleMeetings,
        Self::ManageMeetings,
        Self::ManageUsers,
        Self::ManageDropdowns,
        Self::ViewReports,
        Self::ViewAudit,
        Self::ViewAllOffices,
        Self::AssignAnyRole,
    ];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
pub enum Role {
    SystemAdmin,
    Admin,
    Supervisor,
    #[default]
    Agent,
}

impl Role {
    pub const ALL: [Role; 4] = [Self::SystemAdmin, Self::Admin, Self::Supervisor, Self::Agent];

    pub fn permissions(&self) -> HashSet<Permission> {
        match self {
            Self::Agent => {
                let mut perms = HashSet::new();
                perms.insert(Permission::ReadTasks);
                perms.insert(Permission::WriteTasks);
                perms.insert(Permission::RequestLeave);
                perms.insert(Permission::ScheduleMeetings);
                perms.insert(Permission::ViewReports);
                perms
            }
            Self::Supervisor => {
                let mut perms = Self::Agent.permissions();
                perms.insert(Permission::AssignTasks);
                perms.insert(Permission::ReviewLeave);
                perms
            }
            Self::Admin => {
                let mut perms = Self::Supervisor.permissions();
                perms.insert(Permission::DeleteLeave);
                perms.insert(Permission::ManageMeetings);
                perms.insert(Permission::ManageUsers);
                perms.insert(Permission::ManageDropdowns);
                perms.insert(Permission::ViewAudit);
                perms
            }
            Self::SystemAdmin => {
                let mut perms = Self::Admin.permissions();
                perms.insert(Permission::ViewAllOffices);
                perms.insert(Permission::AssignAnyRole);
                perms
            }
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions().contains(permission)
    }

    pub fn hierarchy_level(&self) -> u8 {
        match self {
            Self::Agent => 1,
            Self::Supervisor => 2,
            Self::Admin => 3,
            Self::SystemAdmin => 4,
        }
    }

    pub fn is_at_least(&self, other: &Role) -> bool {
        self.hierarchy_level() >= other.hierarchy_level()
    }

    /// Roles are scoped to an office unless they see every office.
    pub fn is_office_scoped(&self) -> bool {
        matches!(self, Self::Admin | Self::Supervisor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAdmin => "SystemAdmin",
            Self::Admin => "Admin",
            Self::Supervisor => "Supervisor",
            Self::Agent => "Agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "systemadmin" | "sysadmin" => Ok(Self::SystemAdmin),
            "admin" => Ok(Self::Admin),
            "supervisor" => Ok(Self::Supervisor),
            "agent" => Ok(Self::Agent),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// The caller of a request, resolved from a validated access token and the current user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub office: Option<String>,
    pub token_id: Option<String>,
    pub token_expires_at: Option<i64>,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: None,
            full_name: None,
            role: Role::Agent,
            office: None,
            token_id: None,
            token_expires_at: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_office(mut self, office: impl Into<String>) -> Self {
        self.office = Some(office.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_token(mut self, jti: impl Into<String>, expires_at: i64) -> Self {
        self.token_id = Some(jti.into());
        self.token_expires_at = Some(expires_at);
        self
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// Office boundaries do not apply to callers holding `ViewAllOffices`.
    pub fn sees_all_offices(&self) -> bool {
        self.has_permission(&Permission::ViewAllOffices)
    }

    pub fn same_office(&self, office: Option<&str>) -> bool {
        match (self.office.as_deref(), office) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }

    pub fn permissions_sorted(&self) -> Vec<Permission> {
        let mut perms: Vec<Permission> = self.role.permissions().into_iter().collect();
        perms.sort();
        perms
    }
}
