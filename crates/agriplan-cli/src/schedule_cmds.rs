//! CLI handlers for `agriplan schedule` subcommands.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use agriplan_db::models::{ScheduleTask, TaskStatus};
use agriplan_db::queries::{fields as field_queries, schedule_tasks as task_queries};

use crate::ScheduleCommands;
use crate::calendar;

pub async fn run_schedule_command(command: ScheduleCommands, pool: &PgPool) -> Result<()> {
    match command {
        ScheduleCommands::List {
            field_id,
            from,
            to,
            calendar,
        } => cmd_list(pool, field_id, from, to, calendar).await,
        ScheduleCommands::SetStatus {
            task_id,
            status,
            actual,
        } => cmd_set_status(pool, task_id, status, actual).await,
    }
}

async fn cmd_list(
    pool: &PgPool,
    field_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    as_calendar: bool,
) -> Result<()> {
    if field_queries::get_field(pool, field_id).await?.is_none() {
        anyhow::bail!("field {field_id} not found");
    }

    let tasks = task_queries::list_tasks_for_field(pool, field_id, from, to).await?;
    if tasks.is_empty() {
        println!("No tasks in range.");
        return Ok(());
    }

    if as_calendar {
        print_calendar(&tasks);
    } else {
        print_task_table(&tasks);
    }
    Ok(())
}

async fn cmd_set_status(
    pool: &PgPool,
    task_id: Uuid,
    status: TaskStatus,
    actual: Option<f64>,
) -> Result<()> {
    let task = task_queries::update_task_status(pool, task_id, status, actual)
        .await?
        .ok_or_else(|| anyhow::anyhow!("task {task_id} not found"))?;

    println!("Task updated.");
    println!("  Task ID:  {}", task.id);
    println!("  Title:    {}", task.title);
    println!("  Due:      {}", task.due_date);
    println!("  Status:   {}", task.status);
    if let Some(actual) = task.actual_quantity {
        println!(
            "  Applied:  {actual} {}",
            task.unit.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

pub(crate) fn print_task_table(tasks: &[ScheduleTask]) {
    let title_w = tasks.iter().map(|t| t.title.len()).max().unwrap_or(5).max(5);

    println!(
        "{:<10}  {:<10}  {:<title_w$}  {:>12}  {:<7}  ID",
        "DUE", "KIND", "TITLE", "QTY", "STATUS",
    );
    for task in tasks {
        let qty = match (task.quantity, task.unit.as_deref()) {
            (Some(q), Some(u)) => format!("{q} {u}"),
            (Some(q), None) => q.to_string(),
            _ => String::new(),
        };
        println!(
            "{:<10}  {:<10}  {:<title_w$}  {:>12}  {:<7}  {}",
            task.due_date.to_string(),
            task.kind.to_string(),
            task.title,
            qty,
            task.status.to_string(),
            task.id,
        );
    }
}

pub(crate) fn print_calendar(tasks: &[ScheduleTask]) {
    for (date, items) in calendar::group_by_date(tasks) {
        println!("{date}");
        for item in items {
            let qty = match (item.qty, item.unit.as_deref()) {
                (Some(q), Some(u)) => format!(" ({q} {u})"),
                (Some(q), None) => format!(" ({q})"),
                _ => String::new(),
            };
            println!("  [{}] {}: {}{qty}", item.status, item.kind, item.title);
        }
    }
}
