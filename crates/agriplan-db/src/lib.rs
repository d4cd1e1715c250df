//! Storage layer for agriplan: PostgreSQL models, embedded migrations, and
//! query functions for fields, plans, schedule tasks, measurements, replan
//! logs, and the knowledge base.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
