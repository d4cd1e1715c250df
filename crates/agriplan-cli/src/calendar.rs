//! Calendar view of schedule tasks: tasks grouped by due date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use agriplan_db::models::{ScheduleTask, TaskKind, TaskStatus};

#[derive(Debug, Serialize)]
pub struct CalendarItem {
    pub task_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    pub status: TaskStatus,
}

impl From<&ScheduleTask> for CalendarItem {
    fn from(task: &ScheduleTask) -> Self {
        Self {
            task_id: task.id,
            kind: task.kind,
            title: task.title.clone(),
            qty: task.quantity,
            unit: task.unit.clone(),
            notes: task.notes.clone(),
            status: task.status,
        }
    }
}

/// Group tasks by due date. Dates are ascending; tasks keep input order
/// within a date. Serializes as `{"YYYY-MM-DD": [...]}`.
pub fn group_by_date(tasks: &[ScheduleTask]) -> BTreeMap<NaiveDate, Vec<CalendarItem>> {
    let mut calendar: BTreeMap<NaiveDate, Vec<CalendarItem>> = BTreeMap::new();
    for task in tasks {
        calendar.entry(task.due_date).or_default().push(task.into());
    }
    calendar
}
