//! Database query functions for the `kb_documents` and `kb_chunks` tables.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{KbChunk, KbDocument};

/// Chunk text and optional embedding to persist. The ordinal is the
/// position in the slice passed to [`insert_chunks`].
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

const INSERT_BATCH: usize = 1000;

/// Insert a knowledge document.
pub async fn insert_document(
    conn: &mut PgConnection,
    title: &str,
    source_url: Option<&str>,
    tags: &str,
) -> Result<KbDocument> {
    let doc = sqlx::query_as::<_, KbDocument>(
        "INSERT INTO kb_documents (title, source_url, tags) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(title)
    .bind(source_url)
    .bind(tags)
    .fetch_one(conn)
    .await
    .context("failed to insert knowledge document")?;

    Ok(doc)
}

/// Bulk-insert the chunks of a document with ordinals `0..chunks.len()`.
///
/// Returns the number of rows inserted.
pub async fn insert_chunks(
    conn: &mut PgConnection,
    doc_id: Uuid,
    chunks: &[NewChunk],
) -> Result<u64> {
    let mut total = 0;

    for (batch_no, batch) in chunks.chunks(INSERT_BATCH).enumerate() {
        let base = batch_no * INSERT_BATCH;
        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO kb_chunks (doc_id, ord, text, embedding) ");
        builder.push_values(batch.iter().enumerate(), |mut row, (i, chunk)| {
            let ord = i32::try_from(base + i).unwrap_or(i32::MAX);
            row.push_bind(doc_id)
                .push_bind(ord)
                .push_bind(&chunk.text)
                .push_bind(&chunk.embedding);
        });

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .context("failed to insert knowledge chunks")?;
        total += result.rows_affected();
    }

    Ok(total)
}

/// Every stored chunk, ordered by document creation time then ordinal.
pub async fn all_chunks(pool: &PgPool) -> Result<Vec<KbChunk>> {
    let chunks = sqlx::query_as::<_, KbChunk>(
        "SELECT c.* FROM kb_chunks c \
         JOIN kb_documents d ON d.id = c.doc_id \
         ORDER BY d.created_at ASC, d.id ASC, c.ord ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to load knowledge chunks")?;

    Ok(chunks)
}

/// Fetch the documents whose IDs appear in `ids`.
pub async fn documents_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<KbDocument>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let docs = sqlx::query_as::<_, KbDocument>("SELECT * FROM kb_documents WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .context("failed to fetch knowledge documents")?;

    Ok(docs)
}

/// List all documents, newest first.
pub async fn list_documents(pool: &PgPool) -> Result<Vec<KbDocument>> {
    let docs =
        sqlx::query_as::<_, KbDocument>("SELECT * FROM kb_documents ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
            .context("failed to list knowledge documents")?;

    Ok(docs)
}
