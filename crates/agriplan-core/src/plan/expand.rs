//! Daily operation expander.

use chrono::Duration;

use agriplan_db::models::{Field, TaskKind};

use super::types::{PlanOperation, StagePlan};
use crate::rules::{DEFAULT_IRRIGATION_INTERVAL, RuleTable};

/// Square metres per rai.
pub const SQ_METRES_PER_RAI: f64 = 1600.0;

/// Placeholder fertilizer rate in kg per rai.
pub const FERTILIZER_KG_PER_RAI: f64 = 30.0;

/// Stages that start with a fertilizer application.
const FERTILIZER_STAGES: &[&str] = &["tillering", "elongation"];

pub const OBSERVE_TITLE: &str = "Measure cane height and soil moisture";

/// Expand a timeline into dated operations.
///
/// For every day of every stage (end date exclusive), with `offset` the
/// number of days since the stage started:
///
/// - an observation when `offset` is even,
/// - an irrigation when `offset` is a multiple of the soil interval, sized
///   as `water_mm_day * interval` millimetres over the field's area,
/// - a fertilizer application on the first day of Tillering and Elongation.
///
/// The result is stable-sorted by date.
pub fn expand_daily(field: &Field, stages: &[StagePlan], rules: &RuleTable) -> Vec<PlanOperation> {
    let mut interval = i64::from(rules.soil_interval(&field.soil_texture));
    if interval <= 0 {
        interval = i64::from(DEFAULT_IRRIGATION_INTERVAL);
    }

    let mut ops = Vec::new();

    for stage in stages {
        let fertilize = FERTILIZER_STAGES
            .iter()
            .any(|name| stage.stage.eq_ignore_ascii_case(name));

        for offset in 0..stage.duration_days() {
            let date = stage.start_date + Duration::days(offset);

            if offset % 2 == 0 {
                ops.push(PlanOperation {
                    date,
                    kind: TaskKind::Observe,
                    title: OBSERVE_TITLE.to_owned(),
                    quantity: None,
                    unit: None,
                    notes: "Record readings so the plan can adjust".to_owned(),
                });
            }

            if offset % interval == 0 {
                let mm = stage.water_mm_day * interval as f64;
                let volume_m3 = mm * 0.001 * SQ_METRES_PER_RAI * field.area_rai;
                ops.push(PlanOperation {
                    date,
                    kind: TaskKind::Irrigation,
                    title: "Scheduled irrigation".to_owned(),
                    quantity: Some(volume_m3),
                    unit: Some("m3".to_owned()),
                    notes: format!("{mm:.1} mm over {interval} days"),
                });
            }

            if offset == 0 && fertilize {
                ops.push(PlanOperation {
                    date,
                    kind: TaskKind::Fertilizer,
                    title: "Apply 15-15-15 fertilizer".to_owned(),
                    quantity: Some(FERTILIZER_KG_PER_RAI * field.area_rai),
                    unit: Some("kg".to_owned()),
                    notes: "Placeholder rate; adjust to budget and soil test".to_owned(),
                });
            }
        }
    }

    ops.sort_by_key(|op| op.date);
    ops
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::plan::stages::build_stages;
    use crate::plan::stages::tests::{field, jan1};

    fn stage(name: &str, start: NaiveDate, days: i64, water: f64) -> StagePlan {
        StagePlan {
            stage: name.to_owned(),
            start_date: start,
            end_date: start + Duration::days(days),
            water_mm_day: water,
            notes: String::new(),
        }
    }

    fn of_kind(ops: &[PlanOperation], kind: TaskKind) -> Vec<&PlanOperation> {
        ops.iter().filter(|op| op.kind == kind).collect()
    }

    #[test]
    fn clay_irrigates_every_fourth_day_with_expected_volume() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("new_plant", "clay", 2.5, jan1());
        let ops = expand_daily(&f, &[stage("Ripening", jan1(), 12, 5.0)], &rules);

        let irrigation = of_kind(&ops, TaskKind::Irrigation);
        let offsets: Vec<i64> = irrigation
            .iter()
            .map(|op| (op.date - jan1()).num_days())
            .collect();
        assert_eq!(offsets, [0, 4, 8]);

        let expected = 5.0 * 4.0 * 0.001 * 1600.0 * 2.5;
        for op in irrigation {
            assert!((op.quantity.unwrap() - expected).abs() < 1e-9);
            assert_eq!(op.unit.as_deref(), Some("m3"));
            assert_eq!(op.notes, "20.0 mm over 4 days");
        }
    }

    #[test]
    fn observations_every_other_day_restarting_each_stage() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("new_plant", "loam", 1.0, jan1());
        let second_start = jan1() + Duration::days(5);
        let ops = expand_daily(
            &f,
            &[
                stage("A", jan1(), 5, 1.0),
                stage("B", second_start, 3, 1.0),
            ],
            &rules,
        );

        let observe_offsets: Vec<i64> = of_kind(&ops, TaskKind::Observe)
            .iter()
            .map(|op| (op.date - jan1()).num_days())
            .collect();
        // Stage A: 0, 2, 4. Stage B restarts at day 5: 5, 7.
        assert_eq!(observe_offsets, [0, 2, 4, 5, 7]);

        let irrigation_offsets: Vec<i64> = of_kind(&ops, TaskKind::Irrigation)
            .iter()
            .map(|op| (op.date - jan1()).num_days())
            .collect();
        assert_eq!(irrigation_offsets, [0, 3, 5]);
    }

    #[test]
    fn fertilizer_only_on_first_day_of_named_stages() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("new_plant", "loam", 4.0, jan1());
        let ops = expand_daily(
            &f,
            &[
                stage("Germination", jan1(), 3, 1.0),
                stage("TILLERING", jan1() + Duration::days(3), 3, 1.0),
                stage("Late Tillering", jan1() + Duration::days(6), 3, 1.0),
                stage("Elongation", jan1() + Duration::days(9), 3, 1.0),
            ],
            &rules,
        );

        let fert = of_kind(&ops, TaskKind::Fertilizer);
        assert_eq!(fert.len(), 2);
        assert_eq!(fert[0].date, jan1() + Duration::days(3));
        assert_eq!(fert[1].date, jan1() + Duration::days(9));
        assert_eq!(fert[0].quantity, Some(120.0));
        assert_eq!(fert[0].unit.as_deref(), Some("kg"));
    }

    #[test]
    fn same_day_order_is_observe_irrigation_fertilizer() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("new_plant", "sand", 1.0, jan1());
        let ops = expand_daily(&f, &[stage("Tillering", jan1(), 1, 4.0)], &rules);

        let kinds: Vec<TaskKind> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            [TaskKind::Observe, TaskKind::Irrigation, TaskKind::Fertilizer]
        );
    }

    #[test]
    fn output_is_sorted_by_date_for_full_timeline() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("ratoon", "sand", 3.0, jan1());
        let stages = build_stages(&f, &rules).unwrap();
        let ops = expand_daily(&f, &stages, &rules);

        assert!(ops.windows(2).all(|w| w[0].date <= w[1].date));
        assert_eq!(ops.first().unwrap().date, jan1());
        assert!(ops.last().unwrap().date < stages.last().unwrap().end_date);
    }

    #[test]
    fn empty_stage_yields_no_operations() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("new_plant", "loam", 1.0, jan1());
        assert!(expand_daily(&f, &[stage("Empty", jan1(), 0, 3.0)], &rules).is_empty());
        assert!(expand_daily(&f, &[], &rules).is_empty());
    }
}
