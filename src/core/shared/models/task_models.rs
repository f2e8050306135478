use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::TaskStatus;
use crate::core::shared::schema::tasks;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct DbTask {
    pub id: String,
    pub user_id: String,
    pub created_by: String,
    pub office: Option<String>,
    pub task_date: NaiveDate,
    pub source: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub service: Option<String>,
    pub obligation: Option<String>,
    pub description: String,
    pub status: TaskStatus,
    pub duration_minutes: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}
