//! CLI handlers for `agriplan kb` subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;

use agriplan_core::kb::KnowledgeBase;

use crate::KbCommands;
use crate::config::AgriplanConfig;
use crate::services;

/// Characters of chunk text shown per search hit.
const PREVIEW_CHARS: usize = 160;

pub async fn run_kb_command(
    command: KbCommands,
    config: &AgriplanConfig,
    pool: &PgPool,
) -> Result<()> {
    let kb = services::build_knowledge_base(config, pool)?;
    match command {
        KbCommands::Ingest {
            file,
            title,
            tags,
            url,
        } => cmd_ingest(&kb, &file, title, &tags, url.as_deref()).await,
        KbCommands::Search { query, k } => cmd_search(&kb, &query, k).await,
    }
}

async fn cmd_ingest(
    kb: &KnowledgeBase,
    file: &Path,
    title: Option<String>,
    tags: &str,
    url: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read document: {}", file.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("document {} is empty", file.display());
    }

    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string())
    });

    let ingested = kb.upsert_document(&title, tags, &text, url).await?;

    println!("Document ingested.");
    println!("  Doc ID:    {}", ingested.document.id);
    println!("  Title:     {}", ingested.document.title);
    println!("  Chunks:    {}", ingested.chunks);
    println!(
        "  Embedded:  {}",
        if ingested.embedded { "yes" } else { "no (keyword search only)" }
    );
    Ok(())
}

async fn cmd_search(kb: &KnowledgeBase, query: &str, k: usize) -> Result<()> {
    let hits = kb.search(query, k).await?;
    if hits.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    let doc_ids: Vec<_> = hits.iter().map(|h| h.chunk.doc_id).collect();
    let docs = kb.docs_meta(&doc_ids).await?;

    for (i, hit) in hits.iter().enumerate() {
        let title = docs
            .get(&hit.chunk.doc_id)
            .map(|d| d.title.as_str())
            .unwrap_or("(unknown document)");
        println!("{}. [{:.3}] {} #{}", i + 1, hit.score, title, hit.chunk.ord);
        println!("   {}", preview(&hit.chunk.text));
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_whitespace() {
        assert_eq!(preview("a\n\n  b\tc"), "a b c");
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let text = "อ้อย".repeat(100);
        let out = preview(&text);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), PREVIEW_CHARS + 3);
    }
}
