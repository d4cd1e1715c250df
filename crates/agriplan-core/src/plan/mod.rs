//! Plan synthesis: stage timeline, daily operations, schedule projection.

pub mod expand;
pub mod materialize;
pub mod stages;
pub mod types;

pub use expand::expand_daily;
pub use materialize::to_schedule;
pub use stages::build_stages;
pub use types::{PlanOperation, StagePlan, timeline_from_json, timeline_to_json};
