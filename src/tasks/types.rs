//! Types for the tasks module
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::TaskStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub user_id: Option<String>,
    pub task_date: Option<NaiveDate>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub service: Option<String>,
    pub obligation: Option<String>,
    pub description: String,
    pub status: Option<TaskStatus>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub user_id: Option<String>,
    pub task_date: Option<NaiveDate>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub service: Option<String>,
    pub obligation: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub user_id: Option<String>,
    pub office: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The dropdown-backed fields of a task, checked together.
#[derive(Debug, Clone, Default)]
pub struct TaskClassification<'a> {
    pub source: Option<&'a str>,
    pub category: Option<&'a str>,
    pub sub_category: Option<&'a str>,
    pub service: Option<&'a str>,
    pub obligation: Option<&'a str>,
}
