//! CLI handlers for `agriplan field` subcommands.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use agriplan_db::models::{Field, NewField};
use agriplan_db::queries::fields as field_queries;

use crate::FieldCommands;

/// Dispatch a `FieldCommands` variant to the appropriate handler.
pub async fn run_field_command(command: FieldCommands, pool: &PgPool) -> Result<()> {
    match command {
        FieldCommands::Add {
            owner,
            variety,
            crop_type,
            area,
            province,
            district,
            soil,
            irrigation,
            pump,
            planted,
        } => {
            let new = NewField {
                owner_id: owner,
                variety,
                crop_type,
                area_rai: area,
                province,
                district,
                soil_texture: soil,
                irrigation_source: irrigation,
                pump_m3h: pump,
                planting_date: planted,
            };
            cmd_add(pool, &new).await
        }
        FieldCommands::List { owner } => cmd_list(pool, owner.as_deref()).await,
        FieldCommands::Show { field_id } => cmd_show(pool, field_id).await,
    }
}

async fn cmd_add(pool: &PgPool, new: &NewField) -> Result<()> {
    new.validate().map_err(anyhow::Error::msg)?;
    let field = field_queries::insert_field(pool, new).await?;

    println!("Field registered.");
    println!();
    print_field(&field);
    println!();
    println!(
        "Next: run `agriplan plan generate {}` to build its first plan.",
        field.id
    );
    Ok(())
}

async fn cmd_list(pool: &PgPool, owner: Option<&str>) -> Result<()> {
    let fields = field_queries::list_fields(pool, owner).await?;

    if fields.is_empty() {
        println!("No fields found. Use `agriplan field add` to register one.");
        return Ok(());
    }

    let owner_w = fields.iter().map(|f| f.owner_id.len()).max().unwrap_or(5).max(5);
    let variety_w = fields.iter().map(|f| f.variety.len()).max().unwrap_or(7).max(7);

    println!(
        "{:<36}  {:<owner_w$}  {:<variety_w$}  {:<9}  {:>8}  PLANTED",
        "ID", "OWNER", "VARIETY", "CROP", "RAI",
    );
    for field in &fields {
        println!(
            "{:<36}  {:<owner_w$}  {:<variety_w$}  {:<9}  {:>8.2}  {}",
            field.id,
            field.owner_id,
            field.variety,
            field.crop_type,
            field.area_rai,
            field.planting_date,
        );
    }

    Ok(())
}

async fn cmd_show(pool: &PgPool, field_id: Uuid) -> Result<()> {
    let field = field_queries::get_field(pool, field_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("field {field_id} not found"))?;
    print_field(&field);
    Ok(())
}

pub(crate) fn print_field(field: &Field) {
    println!("  Field ID:    {}", field.id);
    println!("  Owner:       {}", field.owner_id);
    println!("  Variety:     {} ({})", field.variety, field.crop_type);
    println!("  Area:        {:.2} rai", field.area_rai);
    if !field.province.is_empty() || !field.district.is_empty() {
        println!("  Location:    {} {}", field.district, field.province);
    }
    println!("  Soil:        {}", field.soil_texture);
    match field.pump_m3h {
        Some(pump) => println!("  Irrigation:  {} ({pump} m3/h)", field.irrigation_source),
        None => println!("  Irrigation:  {}", field.irrigation_source),
    }
    println!("  Planted:     {}", field.planting_date);
}
