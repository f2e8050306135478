pub mod activity_models;
pub mod dropdown_models;
pub mod leave_models;
pub mod meeting_models;
pub mod task_models;
pub mod user_models;

pub use activity_models::{DbAuditLog, DbNotification};
pub use dropdown_models::DbDropdown;
pub use leave_models::DbLeave;
pub use meeting_models::{DbMeeting, DbMeetingParticipant};
pub use task_models::DbTask;
pub use user_models::{DbUser, UserProfile};
