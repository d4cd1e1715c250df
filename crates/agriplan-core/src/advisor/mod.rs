//! Recommendation providers: plan summaries and supplementary actions.
//!
//! [`ChatAdvisor`] talks to an OpenAI-compatible chat-completions endpoint;
//! [`OfflineAdvisor`] is deterministic and needs no network. Callers treat
//! every [`ProviderError`] as a degradation and fall back to
//! [`fallback_summary`] or [`fallback::fallback_actions`].

pub mod chat;
pub mod fallback;
pub mod offline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use agriplan_db::models::Field;

use crate::error::ProviderError;
use crate::plan::{PlanOperation, StagePlan};

pub use chat::ChatAdvisor;
pub use fallback::{DISEASE_VOCABULARY, fallback_actions, mentions_disease};
pub use offline::OfflineAdvisor;

/// Everything a provider sees about the plan being built.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub field: &'a Field,
    pub stages: &'a [StagePlan],
    pub operations: &'a [PlanOperation],
    /// Retrieved knowledge-base text; may be empty.
    pub kb_context: &'a str,
}

/// An action proposed in response to reported problems.
///
/// `action_type` is free-form as returned by the provider; the planner
/// normalizes it to a task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "qty")]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    /// Identifier for logs.
    fn name(&self) -> &str;

    /// Markdown summary of the plan.
    async fn summarize_plan(&self, ctx: &PlanContext<'_>) -> Result<String, ProviderError>;

    /// Supplementary actions for the reported problems, in priority order.
    async fn propose_actions(
        &self,
        ctx: &PlanContext<'_>,
        problems: &[String],
    ) -> Result<Vec<ProposedAction>, ProviderError>;
}

// Compile-time assertion: Advisor must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Advisor) {}
};

/// Deterministic summary used when no provider summary is available.
pub fn fallback_summary(ctx: &PlanContext<'_>) -> String {
    let field = ctx.field;
    let mut out = String::from("**Preliminary plan summary**\n\n");
    out.push_str(&format!(
        "- Field: {} ({}), {:.2} rai, {} soil\n",
        field.variety, field.crop_type, field.area_rai, field.soil_texture
    ));
    match (ctx.stages.first(), ctx.stages.last()) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "- Stages: {} growth stages from {} to {}\n",
            ctx.stages.len(),
            first.start_date,
            last.end_date
        )),
        _ => out.push_str("- Stages: 0 growth stages\n"),
    }
    out.push_str(&format!(
        "- Follow the generated calendar of {} operations (irrigation, fertilizer, scouting) \
         and adjust to actual weather\n",
        ctx.operations.len()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::stages::tests::{field, jan1};
    use crate::plan::build_stages;
    use crate::rules::RuleTable;

    #[test]
    fn fallback_summary_mentions_area_and_stage_count() {
        let rules = RuleTable::builtin().unwrap();
        let f = field("ratoon", "clay", 12.5, jan1());
        let stages = build_stages(&f, &rules).unwrap();
        let ctx = PlanContext {
            field: &f,
            stages: &stages,
            operations: &[],
            kb_context: "",
        };

        let summary = fallback_summary(&ctx);
        assert!(summary.contains("12.50 rai"));
        assert!(summary.contains("10 growth stages"));
        assert!(summary.contains("2025-01-01"));
    }

    #[test]
    fn proposed_action_accepts_qty_alias_and_missing_fields() {
        let action: ProposedAction =
            serde_json::from_str(r#"{"type":"irrigation","title":"Water","qty":15}"#).unwrap();
        assert_eq!(action.action_type, "irrigation");
        assert_eq!(action.quantity, Some(15.0));
        assert!(action.unit.is_none());
        assert!(action.notes.is_empty());

        let bare: ProposedAction = serde_json::from_str("{}").unwrap();
        assert!(bare.action_type.is_empty());
    }
}
