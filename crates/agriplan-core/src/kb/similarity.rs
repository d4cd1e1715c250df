//! Relevance scoring for knowledge chunks.

use std::cmp::Ordering;

use agriplan_db::models::KbChunk;

/// A chunk with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KbChunk,
    pub score: f32,
}

/// Cosine similarity. `None` when either vector is empty, the lengths
/// differ, or either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((dot / (na.sqrt() * nb.sqrt())) as f32)
}

/// Descending by score; NaN sorts last. Stable, so equal scores keep input
/// order.
fn sort_descending(scored: &mut [ScoredChunk]) {
    scored.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
    });
}

/// Rank chunks by cosine similarity to `query`, keeping the top `k`.
///
/// Chunks without an embedding, or whose embedding cannot be compared with
/// the query, are skipped.
pub fn rank_by_embedding(query: &[f32], chunks: Vec<KbChunk>, k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let score = cosine(query, chunk.embedding.as_deref()?)?;
            Some(ScoredChunk { chunk, score })
        })
        .collect();
    sort_descending(&mut scored);
    scored.truncate(k);
    scored
}

/// Rank chunks by case-insensitive containment of the whole query.
///
/// Matches score 1.0 and everything else 0.0; ties keep input order.
pub fn rank_by_keyword(query: &str, chunks: Vec<KbChunk>, k: usize) -> Vec<ScoredChunk> {
    let needle = query.trim().to_lowercase();
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = if chunk.text.to_lowercase().contains(&needle) {
                1.0
            } else {
                0.0
            };
            ScoredChunk { chunk, score }
        })
        .collect();
    sort_descending(&mut scored);
    scored.truncate(k);
    scored
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    pub(crate) fn chunk(text: &str, embedding: Option<Vec<f32>>) -> KbChunk {
        KbChunk {
            id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
            ord: 0,
            text: text.to_owned(),
            embedding,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert!(cosine(&[1.0], &[1.0, 0.0]).is_none());
        assert!(cosine(&[], &[]).is_none());
        assert!(cosine(&[0.0, 0.0], &[1.0, 0.0]).is_none());
    }

    #[test]
    fn embedding_rank_is_non_increasing_and_skips_unusable() {
        let chunks = vec![
            chunk("orthogonal", Some(vec![0.0, 1.0])),
            chunk("missing", None),
            chunk("exact", Some(vec![1.0, 0.0])),
            chunk("wrong dims", Some(vec![1.0, 0.0, 0.0])),
            chunk("zero", Some(vec![0.0, 0.0])),
            chunk("close", Some(vec![0.9, 0.1])),
        ];
        let ranked = rank_by_embedding(&[1.0, 0.0], chunks, 10);

        let texts: Vec<&str> = ranked.iter().map(|s| s.chunk.text.as_str()).collect();
        assert_eq!(texts, ["exact", "close", "orthogonal"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn embedding_rank_truncates_to_k() {
        let chunks = (0..5)
            .map(|i| chunk(&i.to_string(), Some(vec![1.0, i as f32])))
            .collect();
        assert_eq!(rank_by_embedding(&[1.0, 0.0], chunks, 2).len(), 2);
    }

    #[test]
    fn keyword_rank_matches_case_insensitively_and_keeps_order() {
        let chunks = vec![
            chunk("nothing here", None),
            chunk("White Leaf spreads by leafhoppers", None),
            chunk("unrelated", None),
            chunk("control white leaf with clean setts", None),
        ];
        let ranked = rank_by_keyword("white leaf", chunks, 3);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk.text, "White Leaf spreads by leafhoppers");
        assert_eq!(ranked[1].chunk.text, "control white leaf with clean setts");
        assert_eq!(ranked[0].score, 1.0);
        assert_eq!(ranked[2].score, 0.0);
        assert_eq!(ranked[2].chunk.text, "nothing here");
    }

    #[test]
    fn keyword_rank_never_exceeds_k() {
        let chunks = (0..10).map(|_| chunk("drought", None)).collect();
        assert_eq!(rank_by_keyword("drought", chunks, 4).len(), 4);
    }
}
