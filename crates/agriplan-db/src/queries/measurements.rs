//! Database query functions for the `measurements` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Measurement, NewMeasurement};

/// Append a measurement. A missing `measured_at` defaults to the insert time.
pub async fn insert_measurement(
    pool: &PgPool,
    field_id: Uuid,
    new: &NewMeasurement,
) -> Result<Measurement> {
    let measurement = sqlx::query_as::<_, Measurement>(
        "INSERT INTO measurements \
         (field_id, measured_at, cane_height_cm, soil_moisture_pct, moisture_state, \
          rainfall_mm, pest_severity, note) \
         VALUES ($1, COALESCE($2, now()), $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(field_id)
    .bind(new.measured_at)
    .bind(new.cane_height_cm)
    .bind(new.soil_moisture_pct)
    .bind(new.moisture_state)
    .bind(new.rainfall_mm)
    .bind(new.pest_severity)
    .bind(&new.note)
    .fetch_one(pool)
    .await
    .context("failed to insert measurement")?;

    Ok(measurement)
}

/// Measurements of a field taken at or after `since`, oldest first.
pub async fn recent_measurements(
    pool: &PgPool,
    field_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Measurement>> {
    let rows = sqlx::query_as::<_, Measurement>(
        "SELECT * FROM measurements \
         WHERE field_id = $1 AND measured_at >= $2 \
         ORDER BY measured_at ASC",
    )
    .bind(field_id)
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to fetch recent measurements")?;

    Ok(rows)
}
