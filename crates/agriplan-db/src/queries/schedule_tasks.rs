//! Database query functions for the `schedule_tasks` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{NewScheduleTask, ScheduleTask, TaskStatus};

/// Rows per multi-row INSERT. Eight binds per row keeps each statement far
/// below the PostgreSQL bind-parameter limit.
const INSERT_BATCH: usize = 1000;

/// Bulk-insert tasks, preserving input order.
///
/// Runs on a connection so it can join the plan-version transaction.
pub async fn insert_tasks(
    conn: &mut PgConnection,
    tasks: &[NewScheduleTask],
) -> Result<Vec<ScheduleTask>> {
    let mut inserted = Vec::with_capacity(tasks.len());

    for batch in tasks.chunks(INSERT_BATCH) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO schedule_tasks \
             (field_id, plan_id, due_date, kind, title, quantity, unit, notes) ",
        );
        builder.push_values(batch, |mut row, task| {
            row.push_bind(task.field_id)
                .push_bind(task.plan_id)
                .push_bind(task.due_date)
                .push_bind(task.kind)
                .push_bind(&task.title)
                .push_bind(task.quantity)
                .push_bind(&task.unit)
                .push_bind(&task.notes);
        });
        builder.push(" RETURNING *");

        let rows = builder
            .build_query_as::<ScheduleTask>()
            .fetch_all(&mut *conn)
            .await
            .context("failed to insert schedule tasks")?;
        inserted.extend(rows);
    }

    Ok(inserted)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<ScheduleTask>> {
    let task = sqlx::query_as::<_, ScheduleTask>("SELECT * FROM schedule_tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch schedule task")?;

    Ok(task)
}

/// List a field's tasks with due dates inside the inclusive `[from, to]`
/// range. Either bound may be omitted.
pub async fn list_tasks_for_field(
    pool: &PgPool,
    field_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ScheduleTask>> {
    let tasks = sqlx::query_as::<_, ScheduleTask>(
        "SELECT * FROM schedule_tasks \
         WHERE field_id = $1 \
           AND ($2::date IS NULL OR due_date >= $2) \
           AND ($3::date IS NULL OR due_date <= $3) \
         ORDER BY due_date ASC, created_at ASC",
    )
    .bind(field_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("failed to list schedule tasks for field")?;

    Ok(tasks)
}

/// List all tasks attached to one plan version, ordered by due date.
pub async fn list_tasks_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<ScheduleTask>> {
    let tasks = sqlx::query_as::<_, ScheduleTask>(
        "SELECT * FROM schedule_tasks WHERE plan_id = $1 ORDER BY due_date ASC, created_at ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list schedule tasks for plan")?;

    Ok(tasks)
}

/// Set a task's status, optionally recording the quantity actually applied.
///
/// Returns `None` when no task has the given ID. An omitted
/// `actual_quantity` leaves any previously recorded value in place.
pub async fn update_task_status(
    pool: &PgPool,
    id: Uuid,
    status: TaskStatus,
    actual_quantity: Option<f64>,
) -> Result<Option<ScheduleTask>> {
    let task = sqlx::query_as::<_, ScheduleTask>(
        "UPDATE schedule_tasks \
         SET status = $1, \
             actual_quantity = COALESCE($2, actual_quantity), \
             updated_at = now() \
         WHERE id = $3 \
         RETURNING *",
    )
    .bind(status)
    .bind(actual_quantity)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update schedule task status")?;

    Ok(task)
}
