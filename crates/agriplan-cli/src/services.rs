//! Builds the planning services from resolved configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use agriplan_core::advisor::{Advisor, ChatAdvisor, OfflineAdvisor};
use agriplan_core::kb::{Embedder, HashingEmbedder, HttpEmbedder, KnowledgeBase};
use agriplan_core::planner::Planner;
use agriplan_core::rules::RuleTable;

use crate::config::{AgriplanConfig, EmbeddingConfig};

/// The rule table from the configured file, or the built-in table.
pub fn load_rules(config: &AgriplanConfig) -> Result<Arc<RuleTable>> {
    let rules = match &config.rules_path {
        Some(path) => RuleTable::load(path)?,
        None => RuleTable::builtin()?,
    };
    Ok(Arc::new(rules))
}

pub fn build_advisor(config: &AgriplanConfig) -> Result<Arc<dyn Advisor>> {
    match &config.llm {
        Some(llm) => {
            let advisor = ChatAdvisor::new(&llm.endpoint, &llm.api_key, &llm.model)
                .context("failed to build chat advisor")?;
            info!(model = %llm.model, "using chat advisor");
            Ok(Arc::new(advisor))
        }
        None => {
            info!("no LLM configured, using offline advisor");
            Ok(Arc::new(OfflineAdvisor))
        }
    }
}

pub fn build_knowledge_base(config: &AgriplanConfig, pool: &PgPool) -> Result<Arc<KnowledgeBase>> {
    Ok(Arc::new(KnowledgeBase::new(pool.clone(), build_embedder(config)?)))
}

/// The configured embedder; `None` means keyword search only.
pub fn build_embedder(config: &AgriplanConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match &config.embedding {
        Some(EmbeddingConfig::Http(emb)) => {
            let embedder = HttpEmbedder::new(&emb.endpoint, &emb.api_key, &emb.model)
                .context("failed to build embedding client")?;
            info!(model = %emb.model, "using http embeddings");
            Ok(Some(Arc::new(embedder)))
        }
        Some(EmbeddingConfig::Offline) => {
            info!("using offline hashing embeddings");
            Ok(Some(Arc::new(HashingEmbedder::default())))
        }
        None => {
            info!("no embeddings configured, using keyword search");
            Ok(None)
        }
    }
}

pub fn build_planner(
    config: &AgriplanConfig,
    pool: &PgPool,
    kb: Arc<KnowledgeBase>,
) -> Result<Planner> {
    let planner = Planner::new(pool.clone(), load_rules(config)?, build_advisor(config)?)
        .with_knowledge_base(kb)
        .with_preferred_domain(config.preferred_domain.clone());
    Ok(planner)
}
