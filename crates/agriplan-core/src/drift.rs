//! Drift evaluation: decides from recent measurements whether the current
//! plan is stale.
//!
//! The checks are fixed heuristic thresholds, evaluated in order with the
//! first match winning:
//!
//! 1. no measurements: no drift;
//! 2. latest cane height below 85% of a linear 1.2 cm/day expectation;
//! 3. three or more consecutive `dry` readings at the end of the window
//!    (at most five readings examined).

use chrono::NaiveDate;
use serde::Serialize;

use agriplan_db::models::{Field, Measurement, MoistureState};

use crate::plan::StagePlan;

/// Expected growth rate in centimetres per day since planting.
pub const GROWTH_CM_PER_DAY: f64 = 1.2;

/// Fraction of the expected height below which the plan has drifted.
pub const HEIGHT_TOLERANCE: f64 = 0.85;

/// Consecutive dry readings that count as drift.
pub const DRY_STREAK: usize = 3;

/// Readings examined by the dry-streak scan.
pub const DRY_SCAN_LIMIT: usize = 5;

pub const DRY_REASON: &str = "soil moisture low 3+ days";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftVerdict {
    pub drifted: bool,
    pub reason: Option<String>,
}

impl DriftVerdict {
    pub fn none() -> Self {
        Self {
            drifted: false,
            reason: None,
        }
    }

    fn drift(reason: String) -> Self {
        Self {
            drifted: true,
            reason: Some(reason),
        }
    }
}

/// Evaluate drift for `field` as of `today`.
///
/// `measurements` must be ordered oldest first. The prior timeline is not
/// consulted by the current checks.
pub fn evaluate_drift(
    field: &Field,
    measurements: &[Measurement],
    _stages: &[StagePlan],
    today: NaiveDate,
) -> DriftVerdict {
    let Some(latest) = measurements.last() else {
        return DriftVerdict::none();
    };

    let days = (today - field.planting_date).num_days();
    let expected = GROWTH_CM_PER_DAY * days as f64;
    if let Some(height) = latest.cane_height_cm {
        if height < HEIGHT_TOLERANCE * expected {
            return DriftVerdict::drift(format!(
                "height drift: got {height:.1} vs {expected:.1}"
            ));
        }
    }

    let dry = measurements
        .iter()
        .rev()
        .take(DRY_SCAN_LIMIT)
        .take_while(|m| m.moisture_state == Some(MoistureState::Dry))
        .count();
    if dry >= DRY_STREAK {
        return DriftVerdict::drift(DRY_REASON.to_owned());
    }

    DriftVerdict::none()
}
