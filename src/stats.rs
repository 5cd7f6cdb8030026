//! `ekb stats`: corpus and cache statistics.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use editkb_core::models::DocumentKind;

use crate::cache::{DOCUMENTS_FILE, EMBEDDINGS_FILE, MANIFEST_FILE};
use crate::repository::KnowledgeRepository;

#[derive(Default)]
struct KindStats {
    docs: usize,
    sections: usize,
    chunks: usize,
}

pub async fn run_stats(repo: &KnowledgeRepository) -> Result<()> {
    let state = repo.state().await?;
    let config = repo.config();

    let cache_size: u64 = [DOCUMENTS_FILE, EMBEDDINGS_FILE, MANIFEST_FILE]
        .iter()
        .filter_map(|name| std::fs::metadata(config.cache.dir.join(name)).ok())
        .map(|m| m.len())
        .sum();

    let mut by_kind: BTreeMap<DocumentKind, KindStats> = BTreeMap::new();
    let kinds: BTreeMap<&str, DocumentKind> = state
        .documents
        .iter()
        .map(|d| (d.id.as_str(), d.kind))
        .collect();
    for doc in &state.documents {
        let entry = by_kind.entry(doc.kind).or_default();
        entry.docs += 1;
        entry.sections += doc.sections.len();
    }
    for chunk in state.index.chunks() {
        if let Some(kind) = kinds.get(chunk.document_id.as_str()) {
            by_kind.entry(*kind).or_default().chunks += 1;
        }
    }

    let manifest = &state.manifest;
    println!("editkb Knowledge Stats");
    println!("=====================");
    println!();
    println!("  Corpus:      {}", config.corpus.root.display());
    println!("  Cache:       {}", config.cache.dir.display());
    println!("  Size:        {}", format_bytes(cache_size));
    println!("  Synced:      {}", format_relative(manifest.synced_at));
    println!();
    println!("  Documents:   {}", state.documents.len());
    println!("  Chunks:      {}", state.index.len());
    println!(
        "  Encoder:     {} ({} dims, {} tokens/chunk, h{} sections)",
        manifest.encoder, manifest.dims, manifest.max_tokens, manifest.section_level
    );
    println!(
        "  Schema:      {}",
        match &state.schema {
            Ok(_) => "loaded".to_string(),
            Err(reason) => format!("unavailable ({})", reason),
        }
    );
    println!(
        "  Catalogs:    {} b-roll, {} sfx, {} motion rules, {} context rules",
        state.catalogs.broll.len(),
        state.catalogs.sfx.len(),
        state.catalogs.motion_rules.len(),
        state.catalogs.context_rules.len()
    );

    if !by_kind.is_empty() {
        println!();
        println!("  By kind:");
        println!(
            "  {:<12} {:>6} {:>9} {:>8}",
            "KIND", "DOCS", "SECTIONS", "CHUNKS"
        );
        println!("  {}", "-".repeat(38));
        for (kind, s) in &by_kind {
            println!(
                "  {:<12} {:>6} {:>9} {:>8}",
                kind, s.docs, s.sections, s.chunks
            );
        }
    }

    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();
    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M UTC").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M UTC").to_string()
    }
}
