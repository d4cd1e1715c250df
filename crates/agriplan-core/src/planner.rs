//! Plan generation and replanning.
//!
//! [`Planner`] composes the rule table, stage engine, expander, drift
//! evaluator, knowledge base and advisor, and persists the outcome through
//! `agriplan-db`. Every write for one generation or replan commits in a
//! single transaction that holds the field row lock, so plan versions for a
//! field are created one at a time.
//!
//! Provider and retrieval failures never abort a request: they are logged
//! and replaced by the deterministic fallbacks. Only storage failures and
//! missing rows surface as [`PlanningError`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agriplan_db::models::{Field, KbChunk, KbDocument, Plan, ReplanLog, ScheduleTask, TaskKind};
use agriplan_db::queries::{
    fields as field_queries, measurements as measurement_queries, plans as plan_queries,
    replan_logs as log_queries, schedule_tasks as task_queries,
};

use crate::advisor::{
    Advisor, PlanContext, ProposedAction, fallback_actions, fallback_summary, mentions_disease,
};
use crate::drift::{DriftVerdict, evaluate_drift};
use crate::error::PlanningError;
use crate::kb::{ArticleRef, DEFAULT_PREFERRED_DOMAIN, KnowledgeBase, rank_citations, unique_doc_ids};
use crate::plan::{
    PlanOperation, build_stages, expand_daily, timeline_from_json, timeline_to_json, to_schedule,
};
use crate::rules::RuleTable;

/// Measurement window examined by drift evaluation.
pub const MEASUREMENT_LOOKBACK_DAYS: i64 = 14;

/// Days the planting date moves back on a drift replan.
pub const PLANTING_SHIFT_DAYS: i64 = 3;

/// Chunks retrieved for the field-attribute query.
pub const FIELD_CONTEXT_K: usize = 6;

/// Chunks retrieved for a problem query.
pub const PROBLEM_CONTEXT_K: usize = 12;

/// Soft cap on retrieved context passed to the advisor.
pub const CONTEXT_BYTE_LIMIT: usize = 6000;

pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Citations attached to a generated plan or replan.
pub const CITATION_LIMIT: usize = 5;

/// Lead time before the first supplementary task is due.
pub const SUPPLEMENTARY_LEAD_HOURS: i64 = 48;

const DISEASE_SCOUT_TITLE: &str = "Seasonal disease scouting";
const DISEASE_SCOUT_NOTES: &str = "Look for white leaf, grassy shoot, smut or ring spot symptoms";

/// Result of generating a plan from scratch.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPlan {
    pub plan: Plan,
    pub tasks: Vec<ScheduleTask>,
    pub citations: Vec<ArticleRef>,
}

/// Caller input to [`Planner::replan`].
#[derive(Debug, Clone, Default)]
pub struct ReplanOptions {
    /// Free-text reason recorded in the replan log.
    pub reason: Option<String>,
    /// Problem tags reported from the field.
    pub problems: Vec<String>,
}

/// Result of a replan.
///
/// Without drift and without problems this is the latest plan with no tasks
/// and no log.
#[derive(Debug, Clone, Serialize)]
pub struct ReplanOutcome {
    pub plan: Plan,
    /// Baseline tasks of a new version followed by supplementary tasks.
    pub tasks: Vec<ScheduleTask>,
    pub log: Option<ReplanLog>,
    pub citations: Vec<ArticleRef>,
    pub drift: DriftVerdict,
}

/// Retrieved context plus the chunks it came from.
#[derive(Debug, Default)]
struct Retrieval {
    context: String,
    chunks: Vec<KbChunk>,
    docs: HashMap<Uuid, KbDocument>,
}

pub struct Planner {
    pool: PgPool,
    rules: Arc<RuleTable>,
    kb: Option<Arc<KnowledgeBase>>,
    advisor: Arc<dyn Advisor>,
    preferred_domain: String,
}

impl Planner {
    pub fn new(pool: PgPool, rules: Arc<RuleTable>, advisor: Arc<dyn Advisor>) -> Self {
        Self {
            pool,
            rules,
            kb: None,
            advisor,
            preferred_domain: DEFAULT_PREFERRED_DOMAIN.to_owned(),
        }
    }

    pub fn with_knowledge_base(mut self, kb: Arc<KnowledgeBase>) -> Self {
        self.kb = Some(kb);
        self
    }

    pub fn with_preferred_domain(mut self, domain: impl Into<String>) -> Self {
        self.preferred_domain = domain.into();
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn advisor_name(&self) -> &str {
        self.advisor.name()
    }

    /// Build and store a plan for a field from its current attributes.
    ///
    /// The new plan gets version `latest + 1`, or 1 for a field without
    /// plans; its tasks are inserted in the same transaction.
    pub async fn generate_first_plan(&self, field_id: Uuid) -> Result<GeneratedPlan, PlanningError> {
        let field = self.load_field(field_id).await?;
        let stages = build_stages(&field, &self.rules)?;
        let operations = expand_daily(&field, &stages, &self.rules);

        let retrieval = self.retrieve(&field_query(&field), FIELD_CONTEXT_K, false).await;
        let ctx = PlanContext {
            field: &field,
            stages: &stages,
            operations: &operations,
            kb_context: &retrieval.context,
        };
        let summary = self.summarize(&ctx).await;
        let citations = self.citations(&retrieval);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        field_queries::lock_field(&mut tx, field_id)
            .await?
            .ok_or(PlanningError::FieldNotFound(field_id))?;
        let plan =
            plan_queries::insert_next_plan(&mut tx, field_id, &summary, &timeline_to_json(&stages))
                .await?;
        let tasks =
            task_queries::insert_tasks(&mut tx, &to_schedule(&field, plan.id, &operations)).await?;
        tx.commit().await.context("failed to commit plan")?;

        info!(
            field_id = %field_id,
            plan_id = %plan.id,
            version = plan.version,
            tasks = tasks.len(),
            advisor = self.advisor.name(),
            "plan generated"
        );

        Ok(GeneratedPlan {
            plan,
            tasks,
            citations,
        })
    }

    /// Re-evaluate a field's plan as of now.
    pub async fn replan(
        &self,
        field_id: Uuid,
        options: ReplanOptions,
    ) -> Result<ReplanOutcome, PlanningError> {
        self.replan_at(field_id, options, Utc::now()).await
    }

    /// Re-evaluate a field's plan as of `now`.
    ///
    /// Drift produces a new plan version built from a planting date shifted
    /// [`PLANTING_SHIFT_DAYS`] earlier, persisted with the shift. Reported
    /// problems add supplementary tasks, to the new version on drift or to
    /// the latest plan otherwise. All writes commit together.
    pub async fn replan_at(
        &self,
        field_id: Uuid,
        options: ReplanOptions,
        now: DateTime<Utc>,
    ) -> Result<ReplanOutcome, PlanningError> {
        let field = self.load_field(field_id).await?;
        let latest = plan_queries::latest_plan(&self.pool, field_id)
            .await?
            .ok_or(PlanningError::NoPlan(field_id))?;

        let since = now - Duration::days(MEASUREMENT_LOOKBACK_DAYS);
        let measurements = measurement_queries::recent_measurements(&self.pool, field_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(field_id = %field_id, error = %e, "failed to load measurements, assuming none");
                Vec::new()
            });

        let prior = timeline_from_json(&latest.stages).unwrap_or_else(|e| {
            warn!(plan_id = %latest.id, error = %e, "stored timeline is malformed, treating as empty");
            Vec::new()
        });
        let verdict = evaluate_drift(&field, &measurements, &prior, now.date_naive());

        let problems: Vec<String> = options
            .problems
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();

        if !verdict.drifted && problems.is_empty() {
            debug!(field_id = %field_id, version = latest.version, "no drift and no problems, plan unchanged");
            return Ok(ReplanOutcome {
                plan: latest,
                tasks: Vec::new(),
                log: None,
                citations: Vec::new(),
                drift: verdict,
            });
        }

        // Baseline: a rebuilt timeline on drift, otherwise the stored one.
        let mut target = field.clone();
        let (stages, operations, summary, baseline_retrieval) = if verdict.drifted {
            target.planting_date = field.planting_date - Duration::days(PLANTING_SHIFT_DAYS);
            let stages = build_stages(&target, &self.rules)?;
            let operations = expand_daily(&target, &stages, &self.rules);
            let retrieval = self.retrieve(&field_query(&target), FIELD_CONTEXT_K, false).await;
            let ctx = PlanContext {
                field: &target,
                stages: &stages,
                operations: &operations,
                kb_context: &retrieval.context,
            };
            let summary = self.summarize(&ctx).await;
            (stages, operations, Some(summary), retrieval)
        } else {
            (prior, Vec::new(), None, Retrieval::default())
        };

        let mut citations = self.citations(&baseline_retrieval);
        let mut supplementary = Vec::new();
        if !problems.is_empty() {
            let retrieval = self
                .retrieve(&problems.join(" "), PROBLEM_CONTEXT_K, true)
                .await;
            citations = self.citations(&retrieval);
            let ctx = PlanContext {
                field: &target,
                stages: &stages,
                operations: &operations,
                kb_context: &retrieval.context,
            };
            let actions = self.propose(&ctx, &problems).await;
            let start = (now + Duration::hours(SUPPLEMENTARY_LEAD_HOURS)).date_naive();
            supplementary = build_supplementary_ops(&actions, &problems, start);
        }

        let reason = replan_reason(&verdict, options.reason.as_deref(), &problems);
        let delta_md = format!("replanned at {} due to {}", now.to_rfc3339(), reason);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        field_queries::lock_field(&mut tx, field_id)
            .await?
            .ok_or(PlanningError::FieldNotFound(field_id))?;

        let mut tasks = Vec::new();
        let plan = match summary {
            Some(summary) => {
                field_queries::update_planting_date(&mut tx, field_id, target.planting_date).await?;
                let plan = plan_queries::insert_next_plan(
                    &mut tx,
                    field_id,
                    &summary,
                    &timeline_to_json(&stages),
                )
                .await?;
                tasks = task_queries::insert_tasks(
                    &mut tx,
                    &to_schedule(&target, plan.id, &operations),
                )
                .await?;
                plan
            }
            None => latest,
        };

        if !supplementary.is_empty() {
            let extra =
                task_queries::insert_tasks(&mut tx, &to_schedule(&target, plan.id, &supplementary))
                    .await?;
            tasks.extend(extra);
        }

        let log = log_queries::insert_replan_log(
            &mut tx,
            field_id,
            plan.id,
            &reason,
            &delta_md,
            &problems,
        )
        .await?;
        tx.commit().await.context("failed to commit replan")?;

        info!(
            field_id = %field_id,
            plan_id = %plan.id,
            version = plan.version,
            drifted = verdict.drifted,
            supplementary = supplementary.len(),
            tasks = tasks.len(),
            reason = %reason,
            "replan committed"
        );

        Ok(ReplanOutcome {
            plan,
            tasks,
            log: Some(log),
            citations,
            drift: verdict,
        })
    }

    async fn load_field(&self, field_id: Uuid) -> Result<Field, PlanningError> {
        field_queries::get_field(&self.pool, field_id)
            .await?
            .ok_or(PlanningError::FieldNotFound(field_id))
    }

    /// Search the knowledge base and assemble advisor context.
    ///
    /// With `titled`, each chunk is preceded by its document title. Any
    /// failure yields an empty retrieval.
    async fn retrieve(&self, query: &str, k: usize, titled: bool) -> Retrieval {
        let Some(kb) = self.kb.as_ref() else {
            return Retrieval::default();
        };

        let chunks: Vec<KbChunk> = match kb.search(query, k).await {
            Ok(scored) => scored.into_iter().map(|s| s.chunk).collect(),
            Err(e) => {
                warn!(error = %e, "knowledge search failed, continuing without context");
                return Retrieval::default();
            }
        };
        if chunks.is_empty() {
            return Retrieval::default();
        }

        let docs = kb
            .docs_meta(&unique_doc_ids(&chunks))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to load document metadata");
                HashMap::new()
            });

        let pieces: Vec<String> = chunks
            .iter()
            .map(|c| match docs.get(&c.doc_id) {
                Some(doc) if titled && !doc.title.trim().is_empty() => {
                    format!("{}\n{}", doc.title.trim(), c.text)
                }
                _ => c.text.clone(),
            })
            .collect();
        let context = join_context(pieces.iter().map(String::as_str), CONTEXT_BYTE_LIMIT);
        debug!(query, chunks = chunks.len(), context_bytes = context.len(), "context retrieved");

        Retrieval {
            context,
            chunks,
            docs,
        }
    }

    fn citations(&self, retrieval: &Retrieval) -> Vec<ArticleRef> {
        rank_citations(
            &retrieval.chunks,
            &retrieval.docs,
            &self.preferred_domain,
            CITATION_LIMIT,
        )
    }

    async fn summarize(&self, ctx: &PlanContext<'_>) -> String {
        match self.advisor.summarize_plan(ctx).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                warn!(advisor = self.advisor.name(), "advisor returned an empty summary, using template");
                fallback_summary(ctx)
            }
            Err(e) => {
                warn!(advisor = self.advisor.name(), error = %e, "plan summary failed, using template");
                fallback_summary(ctx)
            }
        }
    }

    async fn propose(&self, ctx: &PlanContext<'_>, problems: &[String]) -> Vec<ProposedAction> {
        match self.advisor.propose_actions(ctx, problems).await {
            Ok(actions) if !actions.is_empty() => actions,
            Ok(_) => {
                warn!(advisor = self.advisor.name(), "advisor proposed no actions, using fallback rules");
                fallback_actions(problems)
            }
            Err(e) => {
                warn!(advisor = self.advisor.name(), error = %e, "action proposal failed, using fallback rules");
                fallback_actions(problems)
            }
        }
    }
}

/// Knowledge query built from a field's attributes.
pub fn field_query(field: &Field) -> String {
    format!(
        "{} sugarcane {} {} {} irrigation fertilizer pest Thailand",
        field.variety, field.soil_texture, field.province, field.district
    )
}

/// Join retrieved texts with [`CONTEXT_SEPARATOR`], stopping before the
/// result would exceed `limit` bytes. The first piece is always kept.
pub fn join_context<'a>(pieces: impl IntoIterator<Item = &'a str>, limit: usize) -> String {
    let mut out = String::new();
    for piece in pieces {
        if !out.is_empty() {
            if out.len() + CONTEXT_SEPARATOR.len() + piece.len() > limit {
                break;
            }
            out.push_str(CONTEXT_SEPARATOR);
        }
        out.push_str(piece);
    }
    out
}

/// Turn proposed actions into dated operations starting at `start`, one day
/// apart, in proposal order.
///
/// Irrigation keeps its quantity and defaults the unit to `mm`; fertilizer
/// and pesticide keep quantity and unit as given; other kinds carry none.
/// When a problem names a known disease and no action is an inspection, a
/// scouting inspection is appended on the next free day.
pub fn build_supplementary_ops(
    actions: &[ProposedAction],
    problems: &[String],
    start: NaiveDate,
) -> Vec<PlanOperation> {
    let mut ops: Vec<PlanOperation> = actions
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let kind = TaskKind::from_action_type(&action.action_type);
            let (quantity, unit) = match kind {
                TaskKind::Irrigation => (
                    action.quantity,
                    Some(action.unit.clone().unwrap_or_else(|| "mm".to_owned())),
                ),
                TaskKind::Fertilizer | TaskKind::Pesticide => (action.quantity, action.unit.clone()),
                _ => (None, None),
            };
            let title = match action.title.trim() {
                "" => kind.to_string(),
                t => t.to_owned(),
            };
            PlanOperation {
                date: start + Duration::days(i as i64),
                kind,
                title,
                quantity,
                unit,
                notes: action.notes.clone(),
            }
        })
        .collect();

    if mentions_disease(problems) && !ops.iter().any(|op| op.kind == TaskKind::Inspect) {
        ops.push(PlanOperation {
            date: start + Duration::days(ops.len() as i64),
            kind: TaskKind::Inspect,
            title: DISEASE_SCOUT_TITLE.to_owned(),
            quantity: None,
            unit: None,
            notes: DISEASE_SCOUT_NOTES.to_owned(),
        });
    }

    ops
}

fn replan_reason(verdict: &DriftVerdict, caller: Option<&str>, problems: &[String]) -> String {
    let caller = caller.map(str::trim).filter(|r| !r.is_empty());
    match (verdict.reason.as_deref(), caller) {
        (Some(drift), Some(caller)) => format!("{drift}; {caller}"),
        (Some(drift), None) => drift.to_owned(),
        (None, Some(caller)) => caller.to_owned(),
        (None, None) => format!("reported problems: {}", problems.join(", ")),
    }
}
