//! Transient plan types shared by the stage engine, expander and planner.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use agriplan_db::models::TaskKind;

/// One entry of a stage timeline, stored as JSON inside a plan row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    pub stage: String,
    pub start_date: NaiveDate,
    /// Exclusive: the next stage starts on this date.
    pub end_date: NaiveDate,
    pub water_mm_day: f64,
    #[serde(default)]
    pub notes: String,
}

impl StagePlan {
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// A dated unit of work that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOperation {
    pub date: NaiveDate,
    pub kind: TaskKind,
    pub title: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub notes: String,
}

/// Serialize a timeline for the `plans.stages` column.
pub fn timeline_to_json(stages: &[StagePlan]) -> serde_json::Value {
    serde_json::to_value(stages).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

/// Parse a timeline from the `plans.stages` column.
pub fn timeline_from_json(value: &serde_json::Value) -> serde_json::Result<Vec<StagePlan>> {
    Vec::<StagePlan>::deserialize(value)
}
