//! `ekb sync`: bring the cache in line with the corpus and report.

use anyhow::Result;

use crate::ingest::{SyncMode, SyncReport};
use crate::repository::KnowledgeRepository;

pub async fn run_sync(repo: &KnowledgeRepository, full: bool) -> Result<()> {
    let mode = if full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };

    match repo.sync(mode).await? {
        Some(report) => print_report(&report),
        None => println!(
            "Corpus root {} not found; loaded existing cache without syncing.",
            repo.config().corpus.root.display()
        ),
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("sync knowledge");
    println!("  scanned:  {}", report.scanned);
    println!("  parsed:   {}", report.parsed);
    println!("  reused:   {}", report.reused);
    println!("  removed:  {}", report.removed);
    println!("  chunks:   {} embedded", report.chunks_embedded);
    println!("  failed:   {}", report.failures.len());
    for failure in &report.failures {
        println!("    {}: {}", failure.id, failure.error);
    }
    if report.has_changes() {
        println!("ok");
    } else {
        println!("ok (cache up to date)");
    }
}
