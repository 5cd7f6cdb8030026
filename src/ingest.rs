//! Change-detection ingestion.
//!
//! Coordinates the full sync flow: scan → fingerprint → parse → chunk →
//! embed → persist. A file whose SHA-256 matches the previous manifest is
//! reused verbatim from the cache, so the cost of a re-sync is
//! proportional to the number of changed files.
//!
//! Per-file work runs on blocking worker threads collected in a
//! [`JoinSet`]; results are re-sorted by id and the cache commit happens
//! once, in the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use editkb_core::chunk::sha256_hex;
use editkb_core::document::{parse_document, vectorise};
use editkb_core::embedding::Encoder;
use editkb_core::models::{KnowledgeDocument, VectorisedChunk};
use editkb_core::CoreError;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::cache::{self, CacheSnapshot, Manifest};
use crate::config::Config;
use crate::connector_fs::{scan_corpus, CorpusScan, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Reuse cached documents whose fingerprint is unchanged.
    Incremental,
    /// Ignore the cache and rebuild everything from source.
    Full,
}

/// A file that could not be read or parsed. It is left out of the corpus
/// and the manifest, so the next sync retries it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub reused: usize,
    pub parsed: usize,
    pub removed: usize,
    pub chunks_embedded: usize,
    pub failures: Vec<IngestFailure>,
    /// True when the cache was (re)written by this sync.
    pub persisted: bool,
}

impl SyncReport {
    pub fn has_changes(&self) -> bool {
        self.persisted
    }
}

/// Settings that, when changed, invalidate every cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    section_level: u8,
    max_tokens: usize,
}

enum FileOutcome {
    Unchanged {
        id: String,
    },
    Parsed {
        document: KnowledgeDocument,
        chunks: Vec<VectorisedChunk>,
    },
    Failed(IngestFailure),
}

impl FileOutcome {
    fn id(&self) -> &str {
        match self {
            FileOutcome::Unchanged { id } => id,
            FileOutcome::Parsed { document, .. } => &document.id,
            FileOutcome::Failed(f) => &f.id,
        }
    }
}

pub struct Ingestor {
    config: Arc<Config>,
    encoder: Arc<dyn Encoder>,
}

impl Ingestor {
    pub fn new(config: Arc<Config>, encoder: Arc<dyn Encoder>) -> Self {
        Self { config, encoder }
    }

    fn settings(&self) -> Settings {
        Settings {
            section_level: self.config.markdown.section_level,
            max_tokens: self.config.chunking.max_tokens,
        }
    }

    /// Bring the cache in line with the corpus on disk.
    ///
    /// # Errors
    ///
    /// Fails when the corpus cannot be scanned, when the cache was built
    /// with a different embedding dimensionality (incremental mode only),
    /// or when the cache cannot be written. Per-file problems are
    /// reported in [`SyncReport::failures`] instead.
    #[instrument(skip(self), fields(root = %self.config.corpus.root.display()))]
    pub async fn sync(&self, mode: SyncMode) -> Result<(CacheSnapshot, SyncReport)> {
        let cache_dir = &self.config.cache.dir;
        let previous = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental => self.load_previous()?,
        };

        let settings = self.settings();
        let reusable: Arc<BTreeMap<String, String>> = Arc::new(match &previous {
            Some(prev) if self.is_compatible(&prev.manifest) => {
                // reuse only when the cached body carries the manifest hash
                let cached: BTreeMap<&str, &str> = prev
                    .documents
                    .iter()
                    .map(|d| (d.id.as_str(), d.content_hash.as_str()))
                    .collect();
                prev.manifest
                    .files
                    .iter()
                    .filter(|(id, hash)| cached.get(id.as_str()) == Some(&hash.as_str()))
                    .map(|(id, hash)| (id.clone(), hash.clone()))
                    .collect()
            }
            Some(_) => {
                info!("encoder or chunking settings changed; re-vectorising every document");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        });

        let CorpusScan { files, unreadable } = scan_corpus(&self.config.corpus)?;
        let scanned = files.len() + unreadable.len();

        let mut workers = JoinSet::new();
        for file in files {
            let reusable = Arc::clone(&reusable);
            let encoder = Arc::clone(&self.encoder);
            workers.spawn_blocking(move || {
                let known = reusable.get(&file.id).map(String::as_str);
                ingest_file(&file, known, settings, encoder.as_ref())
            });
        }

        let mut outcomes = Vec::with_capacity(scanned);
        while let Some(joined) = workers.join_next().await {
            outcomes.push(joined.context("ingest worker panicked")?);
        }
        outcomes.extend(unreadable.into_iter().map(|entry| {
            FileOutcome::Failed(IngestFailure {
                id: entry.id,
                error: entry.error,
            })
        }));
        outcomes.sort_by(|a, b| a.id().cmp(b.id()));

        let mut report = SyncReport {
            scanned,
            ..SyncReport::default()
        };
        let previous_docs: BTreeMap<&str, &KnowledgeDocument> = previous
            .iter()
            .flat_map(|p| p.documents.iter())
            .map(|d| (d.id.as_str(), d))
            .collect();
        let previous_chunks = previous
            .as_ref()
            .map(CacheSnapshot::chunks_by_document)
            .unwrap_or_default();

        let mut documents = Vec::new();
        let mut chunks = Vec::new();
        let mut files_manifest = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Unchanged { id } => {
                    let Some(doc) = previous_docs.get(id.as_str()) else {
                        continue;
                    };
                    debug!(id = %id, "reused cached document");
                    files_manifest.insert(id.clone(), doc.content_hash.clone());
                    documents.push((*doc).clone());
                    if let Some(cached) = previous_chunks.get(id.as_str()) {
                        chunks.extend(cached.iter().map(|c| (*c).clone()));
                    }
                    report.reused += 1;
                }
                FileOutcome::Parsed {
                    document,
                    chunks: fresh,
                } => {
                    debug!(id = %document.id, chunks = fresh.len(), "parsed document");
                    files_manifest.insert(document.id.clone(), document.content_hash.clone());
                    report.chunks_embedded += fresh.len();
                    report.parsed += 1;
                    documents.push(document);
                    chunks.extend(fresh);
                }
                FileOutcome::Failed(failure) => {
                    warn!(id = %failure.id, error = %failure.error, "skipping file");
                    report.failures.push(failure);
                }
            }
        }

        if let Some(prev) = &previous {
            report.removed = prev
                .manifest
                .files
                .keys()
                .filter(|id| !files_manifest.contains_key(*id))
                .count();
        }

        let unchanged = previous.as_ref().is_some_and(|prev| {
            prev.manifest.files == files_manifest && self.is_compatible(&prev.manifest)
        });

        let snapshot = match previous {
            Some(prev) if unchanged && cache::exists(cache_dir) => prev,
            _ => {
                let snapshot = CacheSnapshot {
                    documents,
                    chunks,
                    manifest: Manifest {
                        files: files_manifest,
                        encoder: self.encoder.model_name().to_string(),
                        dims: self.encoder.dims(),
                        max_tokens: settings.max_tokens,
                        section_level: settings.section_level,
                        synced_at: Utc::now(),
                    },
                };
                cache::persist(cache_dir, &snapshot).with_context(|| {
                    format!("Failed to write cache to {}", cache_dir.display())
                })?;
                report.persisted = true;
                snapshot
            }
        };

        info!(
            scanned = report.scanned,
            reused = report.reused,
            parsed = report.parsed,
            removed = report.removed,
            failed = report.failures.len(),
            chunks_embedded = report.chunks_embedded,
            persisted = report.persisted,
            "sync complete"
        );
        Ok((snapshot, report))
    }

    /// Load the previous snapshot for incremental reuse.
    ///
    /// A corrupt cache is logged and treated as absent. A cache built with
    /// a different vector size is a hard error.
    fn load_previous(&self) -> Result<Option<CacheSnapshot>> {
        let previous = match cache::load(&self.config.cache.dir) {
            Ok(previous) => previous,
            Err(err @ CoreError::CacheCorruption { .. }) => {
                warn!(error = %err, "cache is corrupt; rebuilding from source");
                None
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(prev) = &previous {
            if prev.manifest.dims != self.encoder.dims() {
                return Err(anyhow::Error::new(CoreError::DimensionMismatch {
                    expected: self.encoder.dims(),
                    actual: prev.manifest.dims,
                })
                .context("cache was built with a different embedding size; run `ekb sync --full`"));
            }
        }
        Ok(previous)
    }

    fn is_compatible(&self, manifest: &Manifest) -> bool {
        let settings = self.settings();
        manifest.encoder == self.encoder.model_name()
            && manifest.dims == self.encoder.dims()
            && manifest.max_tokens == settings.max_tokens
            && manifest.section_level == settings.section_level
    }
}

/// Read, fingerprint, and (unless unchanged) parse and embed one file.
fn ingest_file(
    file: &SourceFile,
    known_hash: Option<&str>,
    settings: Settings,
    encoder: &dyn Encoder,
) -> FileOutcome {
    let bytes = match std::fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return FileOutcome::Failed(IngestFailure {
                id: file.id.clone(),
                error: CoreError::io(&file.path, e).to_string(),
            })
        }
    };

    if known_hash == Some(sha256_hex(&bytes).as_str()) {
        return FileOutcome::Unchanged {
            id: file.id.clone(),
        };
    }

    match parse_document(&file.id, &bytes, settings.section_level) {
        Ok(document) => {
            let chunks = vectorise(&document, settings.max_tokens, encoder);
            FileOutcome::Parsed { document, chunks }
        }
        Err(e) => FileOutcome::Failed(IngestFailure {
            id: file.id.clone(),
            error: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editkb_core::embedding::HashingEncoder;
    use std::fs;
    use std::path::Path;

    fn setup(root: &Path) -> Ingestor {
        fs::create_dir_all(root.join("kb/guides")).unwrap();
        fs::write(
            root.join("kb/guides/zoom.md"),
            "## Zoom\nZoom in on key numbers.",
        )
        .unwrap();
        fs::write(
            root.join("kb/guides/sound.md"),
            "## Sound\nDuck music under speech.",
        )
        .unwrap();
        let config = Config::for_paths(root.join("kb"), root.join("out"));
        Ingestor::new(Arc::new(config), Arc::new(HashingEncoder::new(64)))
    }

    #[tokio::test]
    async fn test_first_sync_parses_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.reused, 0);
        assert!(report.persisted);
        let ids: Vec<_> = snapshot.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["guides/sound.md", "guides/zoom.md"]);
        assert_eq!(snapshot.chunks.len(), 2);
        assert!(cache::exists(&tmp.path().join("out")));
    }

    #[tokio::test]
    async fn test_resync_without_changes_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        let (first, _) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        let manifest_path = tmp.path().join("out").join(cache::MANIFEST_FILE);
        let before = fs::read(&manifest_path).unwrap();

        let (second, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.reused, 2);
        assert_eq!(report.parsed, 0);
        assert!(!report.has_changes());
        assert_eq!(first, second);
        assert_eq!(fs::read(&manifest_path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_only_changed_file_is_reparsed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();

        fs::write(
            tmp.path().join("kb/guides/zoom.md"),
            "## Zoom\nZoom in on key numbers.\n## Punch\nPunch in on jokes.",
        )
        .unwrap();
        fs::remove_file(tmp.path().join("kb/guides/sound.md")).unwrap();
        fs::write(tmp.path().join("kb/glossary.md"), "B-roll: cutaway footage.").unwrap();

        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(report.reused, 0);
        assert_eq!(report.removed, 1);
        assert!(report.has_changes());
        assert_eq!(snapshot.documents.len(), 2);
        assert_eq!(snapshot.chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_file_is_reported_and_excluded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        fs::write(tmp.path().join("kb/broken.json"), "{ nope").unwrap();

        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "broken.json");
        assert!(!snapshot.manifest.files.contains_key("broken.json"));
        assert_eq!(snapshot.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_cache_triggers_rebuild() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();
        fs::write(tmp.path().join("out").join(cache::EMBEDDINGS_FILE), "garbage").unwrap();

        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.parsed, 2);
        assert!(report.persisted);
        assert_eq!(snapshot.chunks.len(), 2);
        assert!(cache::load(&tmp.path().join("out")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dimension_change_requires_full_sync() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();

        let config = Config::for_paths(tmp.path().join("kb"), tmp.path().join("out"));
        let wider = Ingestor::new(Arc::new(config), Arc::new(HashingEncoder::new(128)));
        let err = wider.sync(SyncMode::Incremental).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
        ));

        let (snapshot, report) = wider.sync(SyncMode::Full).await.unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(snapshot.manifest.dims, 128);
    }

    #[tokio::test]
    async fn test_max_tokens_change_revectorises() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();

        let mut config = Config::for_paths(tmp.path().join("kb"), tmp.path().join("out"));
        config.chunking.max_tokens = 50;
        let rechunked = Ingestor::new(Arc::new(config), Arc::new(HashingEncoder::new(64)));
        let (snapshot, report) = rechunked.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(snapshot.manifest.max_tokens, 50);
    }

    /// Cache entries for `id`, read back from the raw JSON artifact.
    fn cached_entries(
        dir: &Path,
        file: &str,
        list: &str,
        key: &str,
        id: &str,
    ) -> Vec<serde_json::Value> {
        let raw = fs::read_to_string(dir.join(file)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let items = if list.is_empty() { &value } else { &value[list] };
        items
            .as_array()
            .unwrap()
            .iter()
            .filter(|item| item[key] == id)
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_untouched_documents_are_byte_identical_after_resync() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();
        let out = tmp.path().join("out");
        let docs_before = cached_entries(&out, cache::DOCUMENTS_FILE, "", "id", "guides/sound.md");
        let chunks_before =
            cached_entries(&out, cache::EMBEDDINGS_FILE, "chunks", "document_id", "guides/sound.md");
        assert_eq!(docs_before.len(), 1);
        assert_eq!(chunks_before.len(), 1);

        fs::write(
            tmp.path().join("kb/guides/zoom.md"),
            "## Zoom\nZoom in on key numbers only once per scene.",
        )
        .unwrap();
        let (_, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.parsed, 1);
        assert_eq!(report.reused, 1);

        assert_eq!(
            cached_entries(&out, cache::DOCUMENTS_FILE, "", "id", "guides/sound.md"),
            docs_before
        );
        assert_eq!(
            cached_entries(&out, cache::EMBEDDINGS_FILE, "chunks", "document_id", "guides/sound.md"),
            chunks_before
        );
        let zoom = cached_entries(&out, cache::DOCUMENTS_FILE, "", "id", "guides/zoom.md");
        assert!(zoom[0]["sections"][0]["body"]
            .as_str()
            .unwrap()
            .contains("once per scene"));
    }

    #[tokio::test]
    async fn test_cached_body_with_stale_hash_is_reparsed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ingestor = setup(tmp.path());
        ingestor.sync(SyncMode::Incremental).await.unwrap();

        // Documents written by a newer sync, manifest left from the older one.
        let out = tmp.path().join("out");
        let mut snapshot = cache::load(&out).unwrap().unwrap();
        let zoom = snapshot
            .documents
            .iter_mut()
            .find(|d| d.id == "guides/zoom.md")
            .unwrap();
        zoom.sections[0].body = "Stale body.".to_string();
        zoom.content_hash = sha256_hex(b"stale");
        cache::persist(&out, &snapshot).unwrap();

        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.reused, 1);
        assert_eq!(report.parsed, 1);
        let zoom = snapshot
            .documents
            .iter()
            .find(|d| d.id == "guides/zoom.md")
            .unwrap();
        assert_ne!(zoom.sections[0].body, "Stale body.");
        let source = fs::read(tmp.path().join("kb/guides/zoom.md")).unwrap();
        assert_eq!(zoom.content_hash, sha256_hex(&source));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwalkable_entry_is_a_failure_not_an_abort() {
        let tmp = tempfile::TempDir::new().unwrap();
        setup(tmp.path());
        std::os::unix::fs::symlink(
            tmp.path().join("kb/nowhere.md"),
            tmp.path().join("kb/dangling.md"),
        )
        .unwrap();
        let mut config = Config::for_paths(tmp.path().join("kb"), tmp.path().join("out"));
        config.corpus.follow_symlinks = true;
        let ingestor = Ingestor::new(Arc::new(config), Arc::new(HashingEncoder::new(64)));

        let (snapshot, report) = ingestor.sync(SyncMode::Incremental).await.unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "dangling.md");
        assert_eq!(snapshot.documents.len(), 2);
        assert!(!snapshot.manifest.files.contains_key("dangling.md"));
    }
}
