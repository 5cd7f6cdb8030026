//! `ekb docs` and `ekb graph`: inspect what was loaded.

use std::collections::BTreeMap;

use anyhow::Result;
use editkb_core::models::{DocumentKind, KnowledgeDocument};

use crate::repository::KnowledgeRepository;

/// List documents grouped by kind, optionally a single kind.
pub async fn run_docs(repo: &KnowledgeRepository, kind: Option<DocumentKind>) -> Result<()> {
    let grouped: BTreeMap<DocumentKind, Vec<KnowledgeDocument>> = match kind {
        Some(kind) => {
            let docs = repo.documents_of_kind(kind).await?;
            if docs.is_empty() {
                BTreeMap::new()
            } else {
                [(kind, docs)].into_iter().collect()
            }
        }
        None => repo.documents().await?,
    };

    if grouped.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for (kind, docs) in &grouped {
        println!("{} ({})", kind, docs.len());
        for doc in docs {
            println!(
                "  {:<40} {} [{} section{}]",
                doc.id,
                doc.title(),
                doc.sections.len(),
                if doc.sections.len() == 1 { "" } else { "s" }
            );
        }
        println!();
    }
    Ok(())
}

/// Print the reference graph as JSON.
pub async fn run_graph(repo: &KnowledgeRepository) -> Result<()> {
    let graph = repo.knowledge_graph().await?;
    println!("{}", serde_json::to_string_pretty(&graph.to_json())?);
    Ok(())
}
