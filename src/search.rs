//! `ekb search`: ranked chunk retrieval over the loaded corpus.

use anyhow::Result;

use crate::repository::KnowledgeRepository;

/// Run a query and print hits, best first.
///
/// With `summary`, prints the prompt-ready `"{heading}: {text}"` lines
/// instead of the attributed listing.
pub async fn run_search(
    repo: &KnowledgeRepository,
    query: &str,
    top_k: Option<usize>,
    summary: bool,
) -> Result<()> {
    let top_k = top_k.unwrap_or(repo.config().retrieval.top_k);

    if summary {
        let lines = repo.summaries(query, top_k).await?;
        if lines.is_empty() {
            println!("No results.");
        }
        for line in lines {
            println!("- {}", line.replace('\n', " ").trim());
        }
        return Ok(());
    }

    let hits = repo.search(query, top_k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            hit.score,
            hit.kind,
            hit.title
        );
        println!("    document: {}", hit.document_id);
        if !hit.heading.is_empty() {
            println!("    section: {}", hit.heading);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
        println!("    id: {}", hit.chunk_id);
        println!();
    }

    Ok(())
}

/// Single-line excerpt of at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
