//! Citation ranking for retrieved chunks.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agriplan_db::models::{KbChunk, KbDocument};

/// Source domain ranked ahead of all others unless configured otherwise.
pub const DEFAULT_PREFERRED_DOMAIN: &str = "mitrpholmodernfarm.com";

/// A cited knowledge document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub title: String,
    pub url: Option<String>,
}

impl ArticleRef {
    pub fn from_document(doc: &KbDocument) -> Self {
        Self {
            title: doc.title.clone(),
            url: doc.source_url.clone(),
        }
    }

    fn is_from(&self, domain: &str) -> bool {
        !domain.is_empty()
            && self
                .url
                .as_deref()
                .is_some_and(|u| u.to_lowercase().contains(&domain.to_lowercase()))
    }
}

/// Document ids of `chunks` in first-seen order, without repeats.
pub fn unique_doc_ids(chunks: &[KbChunk]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.doc_id))
        .map(|c| c.doc_id)
        .collect()
}

/// Turn ranked chunks into at most `limit` citations.
///
/// One citation per document, in the order its first chunk appears.
/// Documents whose source URL contains `preferred_domain` come first; each
/// group keeps its relative order. Chunks whose document is missing from
/// `docs` are ignored.
pub fn rank_citations(
    chunks: &[KbChunk],
    docs: &HashMap<Uuid, KbDocument>,
    preferred_domain: &str,
    limit: usize,
) -> Vec<ArticleRef> {
    let refs: Vec<ArticleRef> = unique_doc_ids(chunks)
        .iter()
        .filter_map(|id| docs.get(id))
        .map(ArticleRef::from_document)
        .collect();

    let (mut ranked, rest): (Vec<_>, Vec<_>) =
        refs.into_iter().partition(|r| r.is_from(preferred_domain));
    ranked.extend(rest);
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::kb::similarity::tests::chunk;

    fn doc(title: &str, url: Option<&str>) -> KbDocument {
        KbDocument {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            source_url: url.map(str::to_owned),
            tags: String::new(),
            created_at: Utc::now(),
        }
    }

    fn chunk_of(doc: &KbDocument) -> KbChunk {
        let mut c = chunk("text", None);
        c.doc_id = doc.id;
        c
    }

    #[test]
    fn preferred_domain_first_and_stable() {
        let a = doc("A", Some("https://example.org/a"));
        let b = doc("B", Some("https://www.MitrPholModernFarm.com/b"));
        let c = doc("C", None);
        let d = doc("D", Some("https://mitrpholmodernfarm.com/d"));
        let chunks = [chunk_of(&a), chunk_of(&b), chunk_of(&c), chunk_of(&d)];
        let docs: HashMap<Uuid, KbDocument> =
            [&a, &b, &c, &d].into_iter().map(|d| (d.id, d.clone())).collect();

        let refs = rank_citations(&chunks, &docs, DEFAULT_PREFERRED_DOMAIN, 10);
        let titles: Vec<&str> = refs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["B", "D", "A", "C"]);
    }

    #[test]
    fn deduplicates_by_document_and_truncates() {
        let a = doc("A", None);
        let b = doc("B", None);
        let c = doc("C", None);
        let chunks = [
            chunk_of(&a),
            chunk_of(&a),
            chunk_of(&b),
            chunk_of(&a),
            chunk_of(&c),
        ];
        let docs: HashMap<Uuid, KbDocument> =
            [&a, &b, &c].into_iter().map(|d| (d.id, d.clone())).collect();

        let refs = rank_citations(&chunks, &docs, DEFAULT_PREFERRED_DOMAIN, 2);
        let titles: Vec<&str> = refs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[test]
    fn unknown_documents_are_skipped() {
        let a = doc("A", None);
        let orphan = chunk("orphan", None);
        let docs = HashMap::from([(a.id, a.clone())]);
        let refs = rank_citations(&[orphan, chunk_of(&a)], &docs, "", 5);
        assert_eq!(refs, [ArticleRef::from_document(&a)]);
    }

    #[test]
    fn unique_doc_ids_keeps_first_seen_order() {
        let a = doc("A", None);
        let b = doc("B", None);
        let ids = unique_doc_ids(&[chunk_of(&b), chunk_of(&a), chunk_of(&b)]);
        assert_eq!(ids, [b.id, a.id]);
    }
}
