//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::Plan;

/// Insert the next plan version for a field.
///
/// The version is computed in the same statement as `latest + 1` (1 for a
/// field without plans). Callers hold the field row lock (see
/// [`crate::queries::fields::lock_field`]) so concurrent inserts cannot
/// compute the same number; the `(field_id, version)` unique constraint
/// rejects any that slip through.
pub async fn insert_next_plan(
    conn: &mut PgConnection,
    field_id: Uuid,
    summary_md: &str,
    stages: &serde_json::Value,
) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (field_id, version, summary_md, stages) \
         SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3 \
         FROM plans WHERE field_id = $1 \
         RETURNING *",
    )
    .bind(field_id)
    .bind(summary_md)
    .bind(stages)
    .fetch_one(conn)
    .await
    .context("failed to insert plan version")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Fetch the current (highest version) plan for a field.
pub async fn latest_plan(pool: &PgPool, field_id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE field_id = $1 ORDER BY version DESC LIMIT 1",
    )
    .bind(field_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest plan")?;

    Ok(plan)
}

/// List every plan version of a field, newest first.
pub async fn list_plans_for_field(pool: &PgPool, field_id: Uuid) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE field_id = $1 ORDER BY version DESC",
    )
    .bind(field_id)
    .fetch_all(pool)
    .await
    .context("failed to list plans for field")?;

    Ok(plans)
}
