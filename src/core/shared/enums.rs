//! Status and category enums stored as TEXT columns.
//!
//! Each enum serializes to the same string in JSON and in SQLite, so filters
//! like `tasks::status.eq(TaskStatus::Pending)` bind the value directly.

use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

use crate::security::auth_api::Role;

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: SqliteValue<'_, '_, '_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                raw.parse::<$ty>().map_err(Into::into)
            }
        }
    };
}

text_column!(Role);
text_column!(TaskStatus);
text_column!(LeaveStatus);
text_column!(LeaveType);
text_column!(MeetingPlatform);
text_column!(DropdownType);

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', '-', ' '], "")
}

// ============================================================================
// TASK STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Cancelled is terminal; Completed may only be reopened.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => matches!(next, Self::InProgress | Self::Completed | Self::Cancelled),
            Self::InProgress => matches!(next, Self::Completed | Self::Cancelled | Self::Pending),
            Self::Completed => next == Self::InProgress,
            Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

// ============================================================================
// LEAVE STATUS / TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum LeaveStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Statuses that block an overlapping request.
    pub const BLOCKING: [LeaveStatus; 2] = [Self::Pending, Self::Approved];
}

impl std::fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeaveStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown leave status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum LeaveType {
    Annual,
    Sick,
    Casual,
    Maternity,
    Paternity,
    Unpaid,
    Other,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "Annual",
            Self::Sick => "Sick",
            Self::Casual => "Casual",
            Self::Maternity => "Maternity",
            Self::Paternity => "Paternity",
            Self::Unpaid => "Unpaid",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for LeaveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeaveType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "annual" | "vacation" => Ok(Self::Annual),
            "sick" => Ok(Self::Sick),
            "casual" => Ok(Self::Casual),
            "maternity" => Ok(Self::Maternity),
            "paternity" => Ok(Self::Paternity),
            "unpaid" => Ok(Self::Unpaid),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown leave type: {}", s)),
        }
    }
}

// ============================================================================
// MEETING PLATFORM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum MeetingPlatform {
    #[default]
    InPerson,
    Zoom,
    Teams,
    GoogleMeet,
    Other,
}

impl MeetingPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InPerson => "InPerson",
            Self::Zoom => "Zoom",
            Self::Teams => "Teams",
            Self::GoogleMeet => "GoogleMeet",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for MeetingPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MeetingPlatform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "inperson" | "physical" | "office" => Ok(Self::InPerson),
            "zoom" => Ok(Self::Zoom),
            "teams" | "msteams" | "microsoftteams" => Ok(Self::Teams),
            "googlemeet" | "meet" => Ok(Self::GoogleMeet),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown meeting platform: {}", s)),
        }
    }
}

// ============================================================================
// DROPDOWN TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum DropdownType {
    Source,
    Category,
    SubCategory,
    Service,
    Office,
    Obligation,
}

impl DropdownType {
    pub const ALL: [DropdownType; 6] = [
        Self::Source,
        Self::Category,
        Self::SubCategory,
        Self::Service,
        Self::Office,
        Self::Obligation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Category => "Category",
            Self::SubCategory => "SubCategory",
            Self::Service => "Service",
            Self::Office => "Office",
            Self::Obligation => "Obligation",
        }
    }

    /// The type a parent entry must have, if this type takes one.
    pub fn parent_type(&self) -> Option<DropdownType> {
        match self {
            Self::SubCategory => Some(Self::Category),
            _ => None,
        }
    }
}

impl std::fmt::Display for DropdownType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DropdownType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "source" => Ok(Self::Source),
            "category" => Ok(Self::Category),
            "subcategory" => Ok(Self::SubCategory),
            "service" => Ok(Self::Service),
            "office" => Ok(Self::Office),
            "obligation" => Ok(Self::Obligation),
            _ => Err(format!("Unknown dropdown type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Cancelled.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_separators() {
        assert_eq!("in_progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!("Sub Category".parse::<DropdownType>(), Ok(DropdownType::SubCategory));
        assert_eq!("google-meet".parse::<MeetingPlatform>(), Ok(MeetingPlatform::GoogleMeet));
        assert!("holiday".parse::<LeaveType>().is_err());
    }

    #[test]
    fn test_display_matches_storage_form() {
        for status in TaskStatus::ALL {
            assert_eq!(status.to_string().parse::<TaskStatus>(), Ok(status));
        }
        assert_eq!(LeaveStatus::Approved.to_string(), "Approved");
    }

    #[test]
    fn test_blocking_leave_statuses() {
        assert!(LeaveStatus::BLOCKING.contains(&LeaveStatus::Pending));
        assert!(LeaveStatus::BLOCKING.contains(&LeaveStatus::Approved));
        assert!(!LeaveStatus::BLOCKING.contains(&LeaveStatus::Rejected));
        assert!(!LeaveStatus::BLOCKING.contains(&LeaveStatus::Cancelled));
    }

    #[test]
    fn test_subcategory_parent_type() {
        assert_eq!(DropdownType::SubCategory.parent_type(), Some(DropdownType::Category));
        assert_eq!(DropdownType::Service.parent_type(), None);
    }
}
