//! Schedule materializer: operations to insertable schedule tasks.

use uuid::Uuid;

use agriplan_db::models::{Field, NewScheduleTask};

use super::types::PlanOperation;

/// Project operations onto schedule tasks for `plan_id`, one per operation,
/// in input order. Tasks start as `todo` when inserted.
pub fn to_schedule(field: &Field, plan_id: Uuid, ops: &[PlanOperation]) -> Vec<NewScheduleTask> {
    ops.iter()
        .map(|op| NewScheduleTask {
            field_id: field.id,
            plan_id,
            due_date: op.date,
            kind: op.kind,
            title: op.title.clone(),
            quantity: op.quantity,
            unit: op.unit.clone(),
            notes: op.notes.clone(),
        })
        .collect()
}
