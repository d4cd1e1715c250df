//! CLI handlers for `agriplan plan` subcommands.
//!
//! Implements:
//! - `agriplan plan generate <field-id>`  -- build and store a new plan version
//! - `agriplan plan replan <field-id>`    -- react to drift and reported problems
//! - `agriplan plan show <field-id>`      -- latest plan, or every version with `--history`

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use agriplan_core::kb::ArticleRef;
use agriplan_core::plan::timeline_from_json;
use agriplan_core::planner::{Planner, ReplanOptions};
use agriplan_db::models::Plan;
use agriplan_db::queries::{
    fields as field_queries, plans as plan_queries, replan_logs as log_queries,
    schedule_tasks as task_queries,
};

use crate::PlanCommands;
use crate::config::AgriplanConfig;
use crate::schedule_cmds::{print_calendar, print_task_table};
use crate::services;

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    config: &AgriplanConfig,
    pool: &PgPool,
) -> Result<()> {
    match command {
        PlanCommands::Generate { field_id, calendar } => {
            let planner = planner(config, pool)?;
            cmd_generate(&planner, field_id, calendar).await
        }
        PlanCommands::Replan {
            field_id,
            reason,
            problems,
        } => {
            let planner = planner(config, pool)?;
            cmd_replan(&planner, field_id, ReplanOptions { reason, problems }).await
        }
        PlanCommands::Show { field_id, history } => {
            if history {
                cmd_history(pool, field_id).await
            } else {
                cmd_show(pool, field_id).await
            }
        }
    }
}

fn planner(config: &AgriplanConfig, pool: &PgPool) -> Result<Planner> {
    let kb = services::build_knowledge_base(config, pool)?;
    services::build_planner(config, pool, kb)
}

// -----------------------------------------------------------------------
// agriplan plan generate <field-id>
// -----------------------------------------------------------------------

async fn cmd_generate(planner: &Planner, field_id: Uuid, as_calendar: bool) -> Result<()> {
    let generated = planner.generate_first_plan(field_id).await?;

    println!("Plan generated.");
    println!();
    print_plan_header(&generated.plan);
    println!("  Tasks:      {}", generated.tasks.len());
    println!();
    println!("{}", generated.plan.summary_md.trim());
    print_citations(&generated.citations);

    if as_calendar && !generated.tasks.is_empty() {
        println!();
        print_calendar(&generated.tasks);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// agriplan plan replan <field-id>
// -----------------------------------------------------------------------

async fn cmd_replan(planner: &Planner, field_id: Uuid, options: ReplanOptions) -> Result<()> {
    let outcome = planner.replan(field_id, options).await?;

    let Some(log) = &outcome.log else {
        println!(
            "No drift detected and no problems reported. Plan v{} unchanged.",
            outcome.plan.version
        );
        return Ok(());
    };

    println!("Replan recorded.");
    println!();
    print_plan_header(&outcome.plan);
    println!("  Reason:     {}", log.reason);
    if !log.problems.is_empty() {
        println!("  Problems:   {}", log.problems.join(", "));
    }
    println!("  New tasks:  {}", outcome.tasks.len());
    println!();
    println!("{}", log.delta_md.trim());
    print_citations(&outcome.citations);

    if !outcome.tasks.is_empty() {
        println!();
        print_task_table(&outcome.tasks);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// agriplan plan show <field-id>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, field_id: Uuid) -> Result<()> {
    ensure_field(pool, field_id).await?;
    let Some(plan) = plan_queries::latest_plan(pool, field_id).await? else {
        println!("Field has no plan yet. Use `agriplan plan generate {field_id}`.");
        return Ok(());
    };
    let tasks = task_queries::list_tasks_for_plan(pool, plan.id).await?;

    print_plan_header(&plan);
    println!("  Tasks:      {}", tasks.len());
    println!();
    println!("{}", plan.summary_md.trim());

    match timeline_from_json(&plan.stages) {
        Ok(stages) if !stages.is_empty() => {
            println!();
            println!("Stages:");
            for stage in &stages {
                println!(
                    "  {:<14} {} .. {}  {:.1} mm/day",
                    stage.stage, stage.start_date, stage.end_date, stage.water_mm_day
                );
            }
        }
        Ok(_) => {}
        Err(e) => println!("(stored timeline unreadable: {e})"),
    }
    Ok(())
}

async fn cmd_history(pool: &PgPool, field_id: Uuid) -> Result<()> {
    ensure_field(pool, field_id).await?;
    let plans = plan_queries::list_plans_for_field(pool, field_id).await?;
    if plans.is_empty() {
        println!("Field has no plan yet. Use `agriplan plan generate {field_id}`.");
        return Ok(());
    }

    println!("{:>7}  {:<36}  CREATED", "VERSION", "PLAN ID");
    for plan in &plans {
        println!(
            "{:>7}  {:<36}  {}",
            plan.version,
            plan.id,
            plan.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    let logs = log_queries::list_replan_logs(pool, field_id).await?;
    if !logs.is_empty() {
        println!();
        println!("Replans:");
        for log in &logs {
            let version = plans
                .iter()
                .find(|p| p.id == log.plan_id)
                .map(|p| p.version.to_string())
                .unwrap_or_else(|| "?".to_owned());
            println!(
                "  {}  v{}  {}",
                log.created_at.format("%Y-%m-%d %H:%M"),
                version,
                log.reason
            );
        }
    }
    Ok(())
}

async fn ensure_field(pool: &PgPool, field_id: Uuid) -> Result<()> {
    if field_queries::get_field(pool, field_id).await?.is_none() {
        anyhow::bail!("field {field_id} not found");
    }
    Ok(())
}

fn print_plan_header(plan: &Plan) {
    println!("  Field ID:   {}", plan.field_id);
    println!("  Plan ID:    {}", plan.id);
    println!("  Version:    {}", plan.version);
    println!(
        "  Created:    {}",
        plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn print_citations(citations: &[ArticleRef]) {
    if citations.is_empty() {
        return;
    }
    println!();
    println!("References:");
    for c in citations {
        match &c.url {
            Some(url) => println!("  - {} <{url}>", c.title),
            None => println!("  - {}", c.title),
        }
    }
}
