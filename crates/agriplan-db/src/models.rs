use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of a planned operation or schedule task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Observe,
    Irrigation,
    Fertilizer,
    Pesticide,
    Inspect,
    Advisory,
    Other,
}

impl TaskKind {
    /// Normalize a free-form action type from a recommendation source.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unrecognized or empty values map to [`TaskKind::Advisory`].
    pub fn from_action_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "irrigation" => Self::Irrigation,
            "fertilizer" => Self::Fertilizer,
            "pesticide" => Self::Pesticide,
            "inspect" => Self::Inspect,
            "other" => Self::Other,
            _ => Self::Advisory,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Observe => "observe",
            Self::Irrigation => "irrigation",
            Self::Fertilizer => "fertilizer",
            Self::Pesticide => "pesticide",
            Self::Inspect => "inspect",
            Self::Advisory => "advisory",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskKind {
    type Err = TaskKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observe" => Ok(Self::Observe),
            "irrigation" => Ok(Self::Irrigation),
            "fertilizer" => Ok(Self::Fertilizer),
            "pesticide" => Ok(Self::Pesticide),
            "inspect" => Ok(Self::Inspect),
            "advisory" => Ok(Self::Advisory),
            "other" => Ok(Self::Other),
            other => Err(TaskKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskKind`] string.
#[derive(Debug, Clone)]
pub struct TaskKindParseError(pub String);

impl fmt::Display for TaskKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task kind: {:?}", self.0)
    }
}

impl std::error::Error for TaskKindParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle status of a schedule task.
///
/// Tasks start as `todo` and only move to `done` or `skipped` through an
/// explicit status update; the planner never changes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Done,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Todo => "todo",
            Self::Done => "done",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" | "pending" => Ok(Self::Todo),
            "done" => Ok(Self::Done),
            "skipped" => Ok(Self::Skipped),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Categorical soil moisture reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MoistureState {
    Dry,
    Ok,
    Wet,
}

impl fmt::Display for MoistureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dry => "dry",
            Self::Ok => "ok",
            Self::Wet => "wet",
        };
        f.write_str(s)
    }
}

impl FromStr for MoistureState {
    type Err = MoistureStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry" => Ok(Self::Dry),
            "ok" => Ok(Self::Ok),
            "wet" => Ok(Self::Wet),
            other => Err(MoistureStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MoistureState`] string.
#[derive(Debug, Clone)]
pub struct MoistureStateParseError(pub String);

impl fmt::Display for MoistureStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid moisture state: {:?}", self.0)
    }
}

impl std::error::Error for MoistureStateParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A field -- static attributes of one planting cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Field {
    pub id: Uuid,
    pub owner_id: String,
    pub variety: String,
    /// `new_plant` or `ratoon`; other values use an adjustment factor of 1.0.
    pub crop_type: String,
    pub area_rai: f64,
    pub province: String,
    pub district: String,
    /// `sand`, `loam`, or `clay`.
    pub soil_texture: String,
    pub irrigation_source: String,
    pub pump_m3h: Option<f64>,
    pub planting_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A plan version for a field.
///
/// `stages` holds the serialized stage timeline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub field_id: Uuid,
    pub version: i32,
    pub summary_md: String,
    pub stages: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted, actionable operation tied to a plan version.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleTask {
    pub id: Uuid,
    pub field_id: Uuid,
    pub plan_id: Uuid,
    pub due_date: NaiveDate,
    pub kind: TaskKind,
    pub title: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub notes: String,
    /// Quantity actually applied, recorded alongside a status update.
    pub actual_quantity: Option<f64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A timestamped field observation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Measurement {
    pub id: Uuid,
    pub field_id: Uuid,
    pub measured_at: DateTime<Utc>,
    pub cane_height_cm: Option<f64>,
    pub soil_moisture_pct: Option<f64>,
    pub moisture_state: Option<MoistureState>,
    pub rainfall_mm: Option<f64>,
    pub pest_severity: Option<i32>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record of one replanning event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReplanLog {
    pub id: Uuid,
    pub field_id: Uuid,
    pub plan_id: Uuid,
    pub reason: String,
    pub delta_md: String,
    pub problems: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// A knowledge-base document (the unit of citation).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KbDocument {
    pub id: Uuid,
    pub title: String,
    pub source_url: Option<String>,
    pub tags: String,
    pub created_at: DateTime<Utc>,
}

/// An ordered text segment of a document (the unit of retrieval).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KbChunk {
    pub id: Uuid,
    pub doc_id: Uuid,
    pub ord: i32,
    pub text: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Insert payloads
// ---------------------------------------------------------------------------

/// Attributes required to create a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewField {
    pub owner_id: String,
    pub variety: String,
    pub crop_type: String,
    pub area_rai: f64,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub district: String,
    pub soil_texture: String,
    #[serde(default = "default_irrigation_source")]
    pub irrigation_source: String,
    #[serde(default)]
    pub pump_m3h: Option<f64>,
    pub planting_date: NaiveDate,
}

fn default_irrigation_source() -> String {
    "none".to_owned()
}

impl NewField {
    /// Reject attributes that would produce a meaningless plan.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("owner_id", &self.owner_id),
            ("variety", &self.variety),
            ("crop_type", &self.crop_type),
            ("soil_texture", &self.soil_texture),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{name} must not be empty"));
            }
        }
        if !(self.area_rai.is_finite() && self.area_rai > 0.0) {
            return Err(format!("area_rai must be positive, got {}", self.area_rai));
        }
        if let Some(pump) = self.pump_m3h {
            if !(pump.is_finite() && pump >= 0.0) {
                return Err(format!("pump_m3h must not be negative, got {pump}"));
            }
        }
        Ok(())
    }
}

/// A schedule task that has not been persisted yet. Status starts as `todo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduleTask {
    pub field_id: Uuid,
    pub plan_id: Uuid,
    pub due_date: NaiveDate,
    pub kind: TaskKind,
    pub title: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub notes: String,
}

/// A measurement submitted by data entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMeasurement {
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cane_height_cm: Option<f64>,
    #[serde(default)]
    pub soil_moisture_pct: Option<f64>,
    #[serde(default)]
    pub moisture_state: Option<MoistureState>,
    #[serde(default)]
    pub rainfall_mm: Option<f64>,
    #[serde(default)]
    pub pest_severity: Option<i32>,
    #[serde(default)]
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_display_round_trips() {
        for kind in [
            TaskKind::Observe,
            TaskKind::Irrigation,
            TaskKind::Fertilizer,
            TaskKind::Pesticide,
            TaskKind::Inspect,
            TaskKind::Advisory,
            TaskKind::Other,
        ] {
            assert_eq!(kind.to_string().parse::<TaskKind>().unwrap(), kind);
        }
    }

    #[test]
    fn action_type_normalization() {
        assert_eq!(TaskKind::from_action_type(" Irrigation "), TaskKind::Irrigation);
        assert_eq!(TaskKind::from_action_type("INSPECT"), TaskKind::Inspect);
        assert_eq!(TaskKind::from_action_type("pesticide"), TaskKind::Pesticide);
        assert_eq!(TaskKind::from_action_type(""), TaskKind::Advisory);
        assert_eq!(TaskKind::from_action_type("drainage"), TaskKind::Advisory);
        assert_eq!(TaskKind::from_action_type("Other"), TaskKind::Other);
        assert_eq!(TaskKind::from_action_type("advisory"), TaskKind::Advisory);
    }

    #[test]
    fn task_status_accepts_pending_alias() {
        assert_eq!("pending".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!("skipped".parse::<TaskStatus>().unwrap(), TaskStatus::Skipped);
        assert!("finished".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn moisture_state_serde() {
        let json = serde_json::to_string(&MoistureState::Dry).unwrap();
        assert_eq!(json, "\"dry\"");
        let parsed: MoistureState = serde_json::from_str("\"wet\"").unwrap();
        assert_eq!(parsed, MoistureState::Wet);
    }

    fn new_field() -> NewField {
        serde_json::from_value(serde_json::json!({
            "owner_id": "farmer-1",
            "variety": "KK3",
            "crop_type": "ratoon",
            "area_rai": 4.5,
            "soil_texture": "sand",
            "planting_date": "2025-02-01"
        }))
        .unwrap()
    }

    #[test]
    fn new_field_defaults_and_validation() {
        let field = new_field();
        assert_eq!(field.irrigation_source, "none");
        assert!(field.province.is_empty());
        assert!(field.validate().is_ok());

        let mut bad = new_field();
        bad.area_rai = 0.0;
        assert!(bad.validate().unwrap_err().contains("area_rai"));

        let mut bad = new_field();
        bad.soil_texture = "  ".to_owned();
        assert_eq!(bad.validate().unwrap_err(), "soil_texture must not be empty");

        let mut bad = new_field();
        bad.pump_m3h = Some(-1.0);
        assert!(bad.validate().is_err());
    }
}
