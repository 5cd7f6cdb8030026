use std::fs;
use std::path::Path;
use std::sync::Arc;

use editkb::config::Config;
use editkb::ingest::SyncMode;
use editkb::repository::KnowledgeRepository;
use editkb_core::embedding::HashingEncoder;
use editkb_core::models::DocumentKind;
use editkb_core::CoreError;
use serde_json::json;
use tempfile::TempDir;

fn write_corpus(root: &Path) {
    let kb = root.join("kb");
    fs::create_dir_all(kb.join("examples")).unwrap();
    fs::write(
        kb.join("planning.md"),
        "Every plan starts with a hook.\n\n## Zoom\n\nZoom in on statistics and key numbers.\n",
    )
    .unwrap();
    fs::write(
        kb.join("glossary.md"),
        "## B-roll\n\nCutaway footage shown over narration.\n",
    )
    .unwrap();
    fs::write(
        kb.join("examples/intro.md"),
        "## Cold open\n\nStart on a question, then a whoosh into the title card.\n",
    )
    .unwrap();
}

fn repository(root: &Path) -> KnowledgeRepository {
    let mut config = Config::for_paths(root.join("kb"), root.join("out"));
    config.catalogs.dir = root.join("assets");
    KnowledgeRepository::new(Arc::new(config), Arc::new(HashingEncoder::new(128)))
}

#[tokio::test]
async fn test_documents_grouped_by_kind() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());

    let grouped = repo.documents().await.unwrap();
    assert_eq!(grouped[&DocumentKind::Guideline].len(), 1);
    assert_eq!(grouped[&DocumentKind::Glossary].len(), 1);
    assert_eq!(grouped[&DocumentKind::Example][0].id, "examples/intro.md");
    assert!(!grouped.contains_key(&DocumentKind::Schema));

    let guidelines = repo.documents_of_kind(DocumentKind::Guideline).await.unwrap();
    assert_eq!(guidelines.len(), 1);
    assert_eq!(guidelines[0].title(), "Planning");
}

#[tokio::test]
async fn test_search_attributes_hits() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());

    let hits = repo.search("zoom in on key numbers", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_id, "planning.md");
    assert_eq!(hits[0].heading, "Zoom");
    assert_eq!(hits[0].kind, DocumentKind::Guideline);
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn test_search_edge_cases() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());

    assert!(repo.search("   ", 3).await.unwrap().is_empty());
    assert!(repo.search("on the and of", 3).await.unwrap().is_empty());

    let all = repo.search("footage", 100).await.unwrap();
    assert_eq!(all.len(), 4);

    let err = repo.search("zoom", 0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::InvalidTopK(0))
    ));
}

#[tokio::test]
async fn test_summaries_default_heading() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());

    let lines = repo.summaries("every plan starts with a hook", 1).await.unwrap();
    assert_eq!(lines, vec!["General: Every plan starts with a hook."]);
}

#[tokio::test]
async fn test_validate_without_schema_reports_missing() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());

    let report = repo
        .validate(&json!({"elements": [{"type": "zoom", "layer": "main", "timestamp": 0}]}))
        .await
        .unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].code, "schema.missing");
}

#[tokio::test]
async fn test_validate_uses_corpus_schema_and_catalogs() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    fs::write(
        tmp.path().join("kb/element_schema.json"),
        r#"{"type": "object", "required": ["layer", "timestamp"],
            "properties": {"layer": {"type": "string"}, "timestamp": {"type": "number"}}}"#,
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("assets")).unwrap();
    fs::write(
        tmp.path().join("assets/broll_catalog.json"),
        r#"[{"id": "city", "tags": ["urban"]}]"#,
    )
    .unwrap();
    let repo = repository(tmp.path());

    let report = repo
        .validate(&json!([
            {"layer": "broll", "timestamp": 0, "broll": "city"},
            {"layer": "broll", "timestamp": 2, "brollId": "forest"},
            {"timestamp": 4}
        ]))
        .await
        .unwrap();

    let codes: Vec<(&str, &str)> = report
        .issues
        .iter()
        .map(|i| (i.code.as_str(), i.path.as_str()))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("schema.required", "elements[2].layer"),
            ("rule.catalog.missing_broll", "elements[1].brollId"),
        ]
    );
    assert_eq!(report.error_count(), 2);
    assert!(!report.is_valid);
}

#[tokio::test]
async fn test_reload_picks_up_new_documents() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());
    assert!(repo.search("whoosh", 5).await.unwrap().len() >= 1);
    assert_eq!(repo.documents_of_kind(DocumentKind::Definition).await.unwrap().len(), 0);

    fs::write(
        tmp.path().join("kb/element_definitions.md"),
        "## Sound\n\nA sound element plays one effect.\n",
    )
    .unwrap();
    // State is cached until an explicit reload.
    assert_eq!(repo.documents_of_kind(DocumentKind::Definition).await.unwrap().len(), 0);

    let report = repo.reload().await.unwrap().unwrap();
    assert_eq!(report.parsed, 1);
    assert_eq!(report.reused, 3);
    assert_eq!(repo.documents_of_kind(DocumentKind::Definition).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_readers_share_one_build() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = Arc::new(repository(tmp.path()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move { repo.state().await.unwrap() }));
    }
    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.unwrap());
    }
    for state in &states[1..] {
        assert!(Arc::ptr_eq(&states[0], state));
    }
    assert_eq!(states[0].documents.len(), 3);
}

#[tokio::test]
async fn test_full_sync_rebuilds_state() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let repo = repository(tmp.path());
    let before = repo.state().await.unwrap();

    let report = repo.sync(SyncMode::Full).await.unwrap().unwrap();
    assert_eq!(report.parsed, 3);
    let after = repo.state().await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.index.len(), before.index.len());
}

#[tokio::test]
async fn test_graph_over_loaded_documents() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    fs::write(
        tmp.path().join("kb/pacing.md"),
        "## Rhythm\n\nSee [[glossary.md#B-roll]] before cutting away.\n",
    )
    .unwrap();
    let repo = repository(tmp.path());

    let graph = repo.knowledge_graph().await.unwrap();
    let rhythm = graph.find("pacing.md::Rhythm").unwrap();
    let targets: Vec<&str> = graph
        .neighbors(rhythm.id, editkb_core::graph::EdgeKind::References)
        .map(|n| n.key.as_str())
        .collect();
    assert_eq!(targets, vec!["glossary.md::B-roll"]);
}
