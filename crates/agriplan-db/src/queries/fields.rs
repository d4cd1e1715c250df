//! Database query functions for the `fields` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{Field, NewField};

/// Insert a new field row. Returns the inserted field with server-generated
/// defaults (id, created_at, updated_at).
pub async fn insert_field(pool: &PgPool, new: &NewField) -> Result<Field> {
    let field = sqlx::query_as::<_, Field>(
        "INSERT INTO fields \
         (owner_id, variety, crop_type, area_rai, province, district, \
          soil_texture, irrigation_source, pump_m3h, planting_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING *",
    )
    .bind(&new.owner_id)
    .bind(&new.variety)
    .bind(&new.crop_type)
    .bind(new.area_rai)
    .bind(&new.province)
    .bind(&new.district)
    .bind(&new.soil_texture)
    .bind(&new.irrigation_source)
    .bind(new.pump_m3h)
    .bind(new.planting_date)
    .fetch_one(pool)
    .await
    .context("failed to insert field")?;

    Ok(field)
}

/// Fetch a field by its ID.
pub async fn get_field(pool: &PgPool, id: Uuid) -> Result<Option<Field>> {
    let field = sqlx::query_as::<_, Field>("SELECT * FROM fields WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch field")?;

    Ok(field)
}

/// List fields, optionally restricted to one owner, newest first.
pub async fn list_fields(pool: &PgPool, owner_id: Option<&str>) -> Result<Vec<Field>> {
    let fields = sqlx::query_as::<_, Field>(
        "SELECT * FROM fields \
         WHERE ($1::text IS NULL OR owner_id = $1) \
         ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("failed to list fields")?;

    Ok(fields)
}

/// Lock a field row for the rest of the enclosing transaction.
///
/// Plan-version creation for a field holds this lock, so two concurrent
/// commits for the same field are applied one after the other.
pub async fn lock_field(conn: &mut PgConnection, id: Uuid) -> Result<Option<Field>> {
    let field = sqlx::query_as::<_, Field>("SELECT * FROM fields WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("failed to lock field")?;

    Ok(field)
}

/// Overwrite a field's planting date.
pub async fn update_planting_date(
    conn: &mut PgConnection,
    id: Uuid,
    planting_date: NaiveDate,
) -> Result<()> {
    let result =
        sqlx::query("UPDATE fields SET planting_date = $1, updated_at = now() WHERE id = $2")
            .bind(planting_date)
            .bind(id)
            .execute(conn)
            .await
            .context("failed to update planting date")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("field {id} not found");
    }

    Ok(())
}
