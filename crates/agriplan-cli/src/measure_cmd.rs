//! CLI handler for `agriplan measure add`.

use anyhow::Result;
use sqlx::PgPool;

use agriplan_db::models::NewMeasurement;
use agriplan_db::queries::{fields as field_queries, measurements as measurement_queries};

use crate::MeasureCommands;

pub async fn run_measure_command(command: MeasureCommands, pool: &PgPool) -> Result<()> {
    match command {
        MeasureCommands::Add {
            field_id,
            height,
            moisture,
            state,
            rain,
            pest,
            note,
            at,
        } => {
            if field_queries::get_field(pool, field_id).await?.is_none() {
                anyhow::bail!("field {field_id} not found");
            }

            let new = NewMeasurement {
                measured_at: at,
                cane_height_cm: height,
                soil_moisture_pct: moisture,
                moisture_state: state,
                rainfall_mm: rain,
                pest_severity: pest,
                note,
            };
            let m = measurement_queries::insert_measurement(pool, field_id, &new).await?;

            println!("Measurement recorded.");
            println!("  ID:        {}", m.id);
            println!(
                "  Measured:  {}",
                m.measured_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(h) = m.cane_height_cm {
                println!("  Height:    {h:.1} cm");
            }
            if let Some(pct) = m.soil_moisture_pct {
                println!("  Moisture:  {pct:.1}%");
            }
            if let Some(state) = m.moisture_state {
                println!("  State:     {state}");
            }
            if let Some(rain) = m.rainfall_mm {
                println!("  Rainfall:  {rain:.1} mm");
            }
            if let Some(pest) = m.pest_severity {
                println!("  Pests:     {pest}");
            }
            Ok(())
        }
    }
}
