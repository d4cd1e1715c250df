//! Query functions, one module per table group.

pub mod fields;
pub mod kb;
pub mod measurements;
pub mod plans;
pub mod replan_logs;
pub mod schedule_tasks;
