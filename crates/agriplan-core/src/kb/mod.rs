//! Knowledge-base retrieval and ingestion.
//!
//! Search embeds the query and ranks stored chunk vectors by cosine
//! similarity. Without an embedder, when embedding fails, or when no stored
//! vector is comparable with the query, it falls back to case-insensitive
//! keyword containment.

pub mod chunking;
pub mod citations;
pub mod embedding;
pub mod similarity;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agriplan_db::models::{KbChunk, KbDocument};
use agriplan_db::queries::kb as kb_queries;

pub use chunking::{CHUNK_RUNES, chunk_text};
pub use citations::{ArticleRef, DEFAULT_PREFERRED_DOMAIN, rank_citations, unique_doc_ids};
pub use embedding::{Embedder, HashingEmbedder, HttpEmbedder};
pub use similarity::{ScoredChunk, cosine, rank_by_embedding, rank_by_keyword};

/// Result of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub document: KbDocument,
    pub chunks: usize,
    pub embedded: bool,
}

pub struct KnowledgeBase {
    pool: PgPool,
    embedder: Option<Arc<dyn Embedder>>,
}

impl KnowledgeBase {
    pub fn new(pool: PgPool, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { pool, embedder }
    }

    pub fn embedder_name(&self) -> Option<&str> {
        self.embedder.as_deref().map(|e| e.name())
    }

    /// Return up to `k` chunks ranked by relevance to `query`.
    ///
    /// A blank query or `k == 0` returns nothing. Only loading the stored
    /// chunks can fail; embedding problems degrade to keyword search.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(query).await;
        let chunks = kb_queries::all_chunks(&self.pool).await?;
        let results = rank(query, query_vector.as_deref(), chunks, k);

        debug!(query, k, results = results.len(), "knowledge search");
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[query.to_owned()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.swap_remove(0)),
            Ok(_) => {
                warn!(embedder = embedder.name(), "embedder returned no query vector");
                None
            }
            Err(e) => {
                warn!(embedder = embedder.name(), error = %e, "query embedding failed, using keyword search");
                None
            }
        }
    }

    /// Resolve document ids to documents for citation.
    pub async fn docs_meta(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, KbDocument>> {
        let docs = kb_queries::documents_by_ids(&self.pool, ids).await?;
        Ok(docs.into_iter().map(|d| (d.id, d)).collect())
    }

    /// Store a document and its chunks.
    ///
    /// Chunks are embedded when an embedder is configured; if embedding
    /// fails or returns the wrong number of vectors the chunks are stored
    /// without embeddings. The document and chunks commit together.
    pub async fn upsert_document(
        &self,
        title: &str,
        tags: &str,
        text: &str,
        source_url: Option<&str>,
    ) -> Result<IngestedDocument> {
        let pieces = chunk_text(text, CHUNK_RUNES);
        let vectors = self.embed_chunks(&pieces).await;
        let embedded = vectors.is_some();

        let new_chunks: Vec<kb_queries::NewChunk> = match vectors {
            Some(vectors) => pieces
                .into_iter()
                .zip(vectors)
                .map(|(text, v)| kb_queries::NewChunk {
                    text,
                    embedding: Some(v),
                })
                .collect(),
            None => pieces
                .into_iter()
                .map(|text| kb_queries::NewChunk {
                    text,
                    embedding: None,
                })
                .collect(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        let document = kb_queries::insert_document(&mut tx, title, source_url, tags).await?;
        kb_queries::insert_chunks(&mut tx, document.id, &new_chunks).await?;
        tx.commit()
            .await
            .context("failed to commit knowledge document")?;

        info!(
            doc_id = %document.id,
            title = %document.title,
            chunks = new_chunks.len(),
            embedded,
            "knowledge document stored"
        );

        Ok(IngestedDocument {
            document,
            chunks: new_chunks.len(),
            embedded,
        })
    }

    async fn embed_chunks(&self, pieces: &[String]) -> Option<Vec<Vec<f32>>> {
        let embedder = self.embedder.as_ref()?;
        if pieces.is_empty() {
            return None;
        }
        match embedder.embed(pieces).await {
            Ok(vectors) if vectors.len() == pieces.len() => Some(vectors),
            Ok(vectors) => {
                warn!(
                    embedder = embedder.name(),
                    expected = pieces.len(),
                    got = vectors.len(),
                    "embedding count mismatch, storing chunks without embeddings"
                );
                None
            }
            Err(e) => {
                warn!(embedder = embedder.name(), error = %e, "chunk embedding failed, storing chunks without embeddings");
                None
            }
        }
    }
}

/// Pick the ranking strategy for a query.
///
/// Vector ranking applies when a query vector exists and at least one
/// stored chunk can be compared with it; otherwise keyword ranking.
pub fn rank(
    query: &str,
    query_vector: Option<&[f32]>,
    chunks: Vec<KbChunk>,
    k: usize,
) -> Vec<ScoredChunk> {
    if let Some(vector) = query_vector {
        let comparable = chunks.iter().any(|c| {
            c.embedding
                .as_deref()
                .is_some_and(|e| cosine(vector, e).is_some())
        });
        if comparable {
            return rank_by_embedding(vector, chunks, k);
        }
        debug!("no stored vector matches the query embedding, using keyword search");
    }
    rank_by_keyword(query, chunks, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::similarity::tests::chunk;

    #[test]
    fn vector_ranking_when_comparable() {
        let chunks = vec![
            chunk("far", Some(vec![0.0, 1.0])),
            chunk("near", Some(vec![1.0, 0.1])),
        ];
        let ranked = rank("anything", Some(&[1.0, 0.0]), chunks, 5);
        assert_eq!(ranked[0].chunk.text, "near");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn mismatched_dimensions_fall_back_to_keywords() {
        let chunks = vec![
            chunk("nothing", Some(vec![1.0, 0.0, 0.0])),
            chunk("storm drainage", Some(vec![0.0, 1.0, 0.0])),
        ];
        let ranked = rank("storm", Some(&[1.0, 0.0]), chunks, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.text, "storm drainage");
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn no_query_vector_uses_keywords() {
        let chunks = vec![chunk("a", None), chunk("Drought stress", None)];
        let ranked = rank("drought", None, chunks, 2);
        assert_eq!(ranked[0].chunk.text, "Drought stress");
    }
}
