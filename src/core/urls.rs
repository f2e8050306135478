#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Auth - JSON APIs
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_REFRESH: &'static str = "/api/auth/refresh";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_ME: &'static str = "/api/auth/me";

    // Users - JSON APIs
    pub const USERS: &'static str = "/api/users";
    pub const USER_BY_ID: &'static str = "/api/users/:id";
    pub const USER_PROFILE: &'static str = "/api/users/me/profile";
    pub const USER_PASSWORD: &'static str = "/api/users/me/password";

    // Tasks - JSON APIs
    pub const TASKS: &'static str = "/api/tasks";
    pub const TASK_BY_ID: &'static str = "/api/tasks/:id";

    // Leaves - JSON APIs
    pub const LEAVES: &'static str = "/api/leaves";
    pub const LEAVE_BY_ID: &'static str = "/api/leaves/:id";
    pub const LEAVE_APPROVE: &'static str = "/api/leaves/:id/approve";
    pub const LEAVE_REJECT: &'static str = "/api/leaves/:id/reject";
    pub const LEAVE_CANCEL: &'static str = "/api/leaves/:id/cancel";

    // Meetings - JSON APIs
    pub const MEETINGS: &'static str = "/api/meetings";
    pub const MEETING_BY_ID: &'static str = "/api/meetings/:id";
    pub const MEETING_ICS: &'static str = "/api/meetings/:id/ics";

    // Dropdowns - JSON APIs
    pub const DROPDOWNS: &'static str = "/api/dropdowns";
    pub const DROPDOWNS_GROUPED: &'static str = "/api/dropdowns/grouped";
    pub const DROPDOWN_BY_ID: &'static str = "/api/dropdowns/:id";

    // Reports - JSON/CSV APIs
    pub const REPORTS_TASKS_SUMMARY: &'static str = "/api/reports/tasks/summary";
    pub const REPORTS_TASKS_EXPORT: &'static str = "/api/reports/tasks/export";
    pub const REPORTS_LEAVES_SUMMARY: &'static str = "/api/reports/leaves/summary";

    // Audit and activity logs
    pub const AUDIT: &'static str = "/api/audit";
    pub const LOGS: &'static str = "/api/logs";

    // Permissions
    pub const PERMISSIONS: &'static str = "/api/permissions";
    pub const PERMISSIONS_ME: &'static str = "/api/permissions/me";

    // Notifications
    pub const NOTIFICATIONS: &'static str = "/api/notifications";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/api/notifications/read-all";
    pub const NOTIFICATION_READ: &'static str = "/api/notifications/:id/read";
    pub const NOTIFICATION_BY_ID: &'static str = "/api/notifications/:id";
}
