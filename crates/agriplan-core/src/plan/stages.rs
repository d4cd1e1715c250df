//! Stage engine: field attributes and the rule table to a dated timeline.

use chrono::Duration;

use agriplan_db::models::Field;

use super::types::StagePlan;
use crate::error::PlanningError;
use crate::rules::RuleTable;

/// Build the stage timeline for a field.
///
/// Each stage lasts `days * crop_factor` days rounded to the nearest whole
/// day. Stages chain from the planting date with no gaps, so every stage
/// starts on the previous stage's end date.
pub fn build_stages(field: &Field, rules: &RuleTable) -> Result<Vec<StagePlan>, PlanningError> {
    if rules.stages().is_empty() {
        return Err(PlanningError::Configuration(
            "stage table is empty".to_owned(),
        ));
    }

    let factor = rules.crop_factor(&field.crop_type);
    let mut cursor = field.planting_date;
    let mut timeline = Vec::with_capacity(rules.stages().len());

    for def in rules.stages() {
        let days = (f64::from(def.days) * factor).round() as i64;
        let end = Duration::try_days(days)
            .and_then(|d| cursor.checked_add_signed(d))
            .ok_or_else(|| {
                PlanningError::Configuration(format!(
                    "stage {} ends outside the supported date range",
                    def.name
                ))
            })?;
        timeline.push(StagePlan {
            stage: def.name.clone(),
            start_date: cursor,
            end_date: end,
            water_mm_day: def.water_mm_per_day,
            notes: def.notes.clone(),
        });
        cursor = end;
    }

    Ok(timeline)
}
