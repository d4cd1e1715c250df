use async_trait::async_trait;

use super::{Advisor, PlanContext, ProposedAction, fallback_actions, fallback_summary};
use crate::error::ProviderError;

/// Deterministic advisor: template summary and rule-based actions.
#[derive(Debug, Default, Clone)]
pub struct OfflineAdvisor;

#[async_trait]
impl Advisor for OfflineAdvisor {
    fn name(&self) -> &str {
        "offline"
    }

    async fn summarize_plan(&self, ctx: &PlanContext<'_>) -> Result<String, ProviderError> {
        Ok(fallback_summary(ctx))
    }

    async fn propose_actions(
        &self,
        _ctx: &PlanContext<'_>,
        problems: &[String],
    ) -> Result<Vec<ProposedAction>, ProviderError> {
        Ok(fallback_actions(problems))
    }
}
