pub mod advisor;
pub mod drift;
pub mod error;
pub mod kb;
pub mod plan;
pub mod planner;
pub mod rules;
