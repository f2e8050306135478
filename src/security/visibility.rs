//! Record visibility for every resource.
//!
//! A caller's [`Scope`] is resolved once from their role and office. List
//! handlers turn it into SQL filters; single-record handlers load the row and
//! ask [`Scope::permits`]. A record outside the scope is reported as missing.

use serde::Serialize;

use crate::core::shared::models::{DbLeave, DbMeeting, DbTask, DbUser};
use crate::security::auth_api::{AuthenticatedUser, Permission, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    All,
    Office { office: String, user_id: String },
    Own { user_id: String },
}

/// A record that belongs to a user and, through them, to an office.
pub trait Scoped {
    fn owner_id(&self) -> &str;
    fn office(&self) -> Option<&str>;
    fn participant_ids(&self) -> &[String] {
        &[]
    }
}

impl Scope {
    pub fn for_user(user: &AuthenticatedUser) -> Self {
        if user.sees_all_offices() {
            return Self::All;
        }
        match user.office.as_deref() {
            Some(office) if user.role.is_office_scoped() => Self::Office {
                office: office.to_string(),
                user_id: user.user_id.clone(),
            },
            _ => Self::Own {
                user_id: user.user_id.clone(),
            },
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Office { user_id, .. } | Self::Own { user_id } => Some(user_id),
        }
    }

    pub fn office(&self) -> Option<&str> {
        match self {
            Self::Office { office, .. } => Some(office),
            _ => None,
        }
    }

    pub fn permits<R: Scoped + ?Sized>(&self, record: &R) -> bool {
        match self {
            Self::All => true,
            Self::Office { office, user_id } => {
                record.office() == Some(office.as_str())
                    || record.owner_id() == user_id
                    || record.participant_ids().iter().any(|p| p == user_id)
            }
            Self::Own { user_id } => {
                record.owner_id() == user_id
                    || record.participant_ids().iter().any(|p| p == user_id)
            }
        }
    }
}

/// Account management needs `ManageUsers`. Without `ViewAllOffices` it is
/// limited to accounts below Admin in the caller's own office.
pub fn can_manage_user(caller: &AuthenticatedUser, target: &DbUser) -> bool {
    if !caller.has_permission(&Permission::ManageUsers) {
        return false;
    }
    caller.sees_all_offices()
        || (caller.same_office(target.office.as_deref()) && !target.role.is_at_least(&Role::Admin))
}

/// Whether the caller may give an account `role` in `office`. Any role needs
/// `AssignAnyRole`; account managers without it hand out roles below Admin in
/// their own office.
pub fn can_assign_role(caller: &AuthenticatedUser, role: Role, office: Option<&str>) -> bool {
    if caller.has_permission(&Permission::AssignAnyRole) {
        return true;
    }
    caller.has_permission(&Permission::ManageUsers)
        && !role.is_at_least(&Role::Admin)
        && caller.same_office(office)
}

impl Scoped for DbTask {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
    fn office(&self) -> Option<&str> {
        self.office.as_deref()
    }
}

impl Scoped for DbLeave {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
    fn office(&self) -> Option<&str> {
        self.office.as_deref()
    }
}

impl Scoped for DbUser {
    fn owner_id(&self) -> &str {
        &self.id
    }
    fn office(&self) -> Option<&str> {
        self.office.as_deref()
    }
}

/// A meeting together with the ids of everyone invited to it.
#[derive(Debug, Clone)]
pub struct MeetingRecord<'a> {
    pub meeting: &'a DbMeeting,
    pub participant_ids: &'a [String],
}

impl Scoped for MeetingRecord<'_> {
    fn owner_id(&self) -> &str {
        &self.meeting.organizer_id
    }
    fn office(&self) -> Option<&str> {
        self.meeting.office.as_deref()
    }
    fn participant_ids(&self) -> &[String] {
        self.participant_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::{MeetingPlatform, TaskStatus};
    use crate::core::shared::utils::now;
    use chrono::NaiveDate;

    fn caller(role: Role, office: Option<&str>) -> AuthenticatedUser {
        let user = AuthenticatedUser::new("caller", "caller").with_role(role);
        match office {
            Some(o) => user.with_office(o),
            None => user,
        }
    }

    fn task(owner: &str, office: Option<&str>) -> DbTask {
        DbTask {
            id: "t1".into(),
            user_id: owner.into(),
            created_by: owner.into(),
            office: office.map(str::to_string),
            task_date: NaiveDate::from_ymd_opt(2024, 5, 2).expect("date"),
            source: None,
            category: None,
            sub_category: None,
            service: None,
            obligation: None,
            description: "File returns".into(),
            status: TaskStatus::Pending,
            duration_minutes: None,
            created_at: now(),
            updated_at: now(),
            completed_at: None,
        }
    }

    fn account(role: Role, office: Option<&str>) -> DbUser {
        DbUser {
            id: "target".into(),
            username: "target".into(),
            email: "target@example.com".into(),
            password_hash: String::new(),
            full_name: "Target".into(),
            role,
            office: office.map(str::to_string),
            phone: None,
            position: None,
            is_active: true,
            last_login_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_scope_resolution() {
        assert_eq!(Scope::for_user(&caller(Role::SystemAdmin, None)), Scope::All);
        assert_eq!(
            Scope::for_user(&caller(Role::Supervisor, Some("Lagos"))).office(),
            Some("Lagos")
        );
        assert!(matches!(
            Scope::for_user(&caller(Role::Admin, None)),
            Scope::Own { .. }
        ));
        assert!(matches!(
            Scope::for_user(&caller(Role::Agent, Some("Lagos"))),
            Scope::Own { .. }
        ));
    }

    #[test]
    fn test_agent_sees_only_own_records() {
        let scope = Scope::for_user(&caller(Role::Agent, Some("Lagos")));
        assert!(scope.permits(&task("caller", Some("Lagos"))));
        assert!(!scope.permits(&task("someone-else", Some("Lagos"))));
    }

    #[test]
    fn test_office_scope() {
        let scope = Scope::for_user(&caller(Role::Supervisor, Some("Lagos")));
        assert!(scope.permits(&task("someone-else", Some("Lagos"))));
        assert!(!scope.permits(&task("someone-else", Some("Abuja"))));
    }

    #[test]
    fn test_participants_see_meetings() {
        let meeting = DbMeeting {
            id: "m1".into(),
            organizer_id: "organizer".into(),
            office: Some("Abuja".into()),
            subject: "Weekly sync".into(),
            description: None,
            platform: MeetingPlatform::Zoom,
            location: None,
            start_time: now(),
            end_time: now(),
            created_at: now(),
            updated_at: now(),
        };
        let invited = vec!["organizer".to_string(), "caller".to_string()];
        let not_invited = vec!["organizer".to_string()];

        let scope = Scope::for_user(&caller(Role::Supervisor, Some("Lagos")));
        assert!(scope.permits(&MeetingRecord {
            meeting: &meeting,
            participant_ids: &invited,
        }));
        assert!(!scope.permits(&MeetingRecord {
            meeting: &meeting,
            participant_ids: &not_invited,
        }));
    }

    #[test]
    fn test_user_management_rules() {
        let admin = caller(Role::Admin, Some("Lagos"));
        assert!(can_manage_user(&admin, &account(Role::Agent, Some("Lagos"))));
        assert!(can_manage_user(&admin, &account(Role::Supervisor, Some("Lagos"))));
        assert!(!can_manage_user(&admin, &account(Role::Admin, Some("Lagos"))));
        assert!(!can_manage_user(&admin, &account(Role::Agent, Some("Abuja"))));

        let supervisor = caller(Role::Supervisor, Some("Lagos"));
        assert!(!can_manage_user(&supervisor, &account(Role::Agent, Some("Lagos"))));

        let root = caller(Role::SystemAdmin, None);
        assert!(can_manage_user(&root, &account(Role::Admin, Some("Abuja"))));
    }

    #[test]
    fn test_role_assignment_rules() {
        let admin = caller(Role::Admin, Some("Lagos"));
        assert!(can_assign_role(&admin, Role::Agent, Some("Lagos")));
        assert!(!can_assign_role(&admin, Role::Admin, Some("Lagos")));
        assert!(!can_assign_role(&admin, Role::Agent, Some("Abuja")));
        assert!(can_assign_role(&caller(Role::SystemAdmin, None), Role::SystemAdmin, None));
        assert!(!can_assign_role(&caller(Role::Supervisor, Some("Lagos")), Role::Agent, Some("Lagos")));
    }

    #[test]
    fn test_scope_follows_role_permissions() {
        for role in Role::ALL {
            let scope = Scope::for_user(&caller(role, Some("Lagos")));
            let expected_all = role.has_permission(&Permission::ViewAllOffices);
            assert_eq!(scope == Scope::All, expected_all, "{role}");
            if !expected_all {
                assert_eq!(scope.office().is_some(), role.is_office_scoped(), "{role}");
            }
        }
    }
}
