use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::MeetingPlatform;
use crate::core::shared::schema::{meeting_participants, meetings};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = meetings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct DbMeeting {
    pub id: String,
    pub organizer_id: String,
    pub office: Option<String>,
    pub subject: String,
    pub description: Option<String>,
    pub platform: MeetingPlatform,
    pub location: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = meeting_participants)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DbMeetingParticipant {
    pub meeting_id: String,
    pub user_id: String,
}
