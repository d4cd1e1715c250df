//! Database query functions for the `replan_logs` table.

use anyhow::{Context, Result};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::ReplanLog;

/// Record a replanning event. Runs on a connection so the log commits with
/// the plan version it describes.
pub async fn insert_replan_log(
    conn: &mut PgConnection,
    field_id: Uuid,
    plan_id: Uuid,
    reason: &str,
    delta_md: &str,
    problems: &[String],
) -> Result<ReplanLog> {
    let log = sqlx::query_as::<_, ReplanLog>(
        "INSERT INTO replan_logs (field_id, plan_id, reason, delta_md, problems) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(field_id)
    .bind(plan_id)
    .bind(reason)
    .bind(delta_md)
    .bind(Json(problems))
    .fetch_one(conn)
    .await
    .context("failed to insert replan log")?;

    Ok(log)
}

/// List the replan history of a field, newest first.
pub async fn list_replan_logs(pool: &PgPool, field_id: Uuid) -> Result<Vec<ReplanLog>> {
    let logs = sqlx::query_as::<_, ReplanLog>(
        "SELECT * FROM replan_logs WHERE field_id = $1 ORDER BY created_at DESC",
    )
    .bind(field_id)
    .fetch_all(pool)
    .await
    .context("failed to list replan logs")?;

    Ok(logs)
}
