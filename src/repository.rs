//! The knowledge repository: one explicit handle over the loaded corpus.
//!
//! A [`KnowledgeRepository`] owns the in-memory projection of the cache
//! (documents, vector index, catalogs, element schema). The projection is
//! built on first use and rebuilt only by [`KnowledgeRepository::reload`]
//! or [`KnowledgeRepository::sync`].
//!
//! State sits behind a `tokio::sync::RwLock<Option<Arc<KnowledgeState>>>`.
//! Readers clone the `Arc` and release the lock; a rebuild holds the write
//! guard for its whole duration, so a reader that arrives mid-build waits
//! for the new state instead of seeing a partial one.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use editkb_core::catalog::Catalogs;
use editkb_core::embedding::Encoder;
use editkb_core::graph::KnowledgeGraph;
use editkb_core::index::VectorIndex;
use editkb_core::models::{
    DocumentKind, KnowledgeDocument, Metadata, ValidationIssue, ValidationReport,
};
use editkb_core::rules::validate_rules;
use editkb_core::schema::{validate_schema, ElementSchema};
use editkb_core::CoreError;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::cache::{self, CacheSnapshot, Manifest};
use crate::catalogs::load_catalogs;
use crate::config::Config;
use crate::ingest::{Ingestor, SyncMode, SyncReport};

/// A single search result with its attribution.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub kind: DocumentKind,
    pub title: String,
    pub heading: String,
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Loaded, immutable corpus state. Replaced wholesale on rebuild.
#[derive(Debug)]
pub struct KnowledgeState {
    pub documents: Vec<KnowledgeDocument>,
    pub index: VectorIndex,
    pub catalogs: Catalogs,
    pub manifest: Manifest,
    /// The element schema, or why none could be used.
    pub schema: std::result::Result<ElementSchema, String>,
    by_id: BTreeMap<String, usize>,
}

impl KnowledgeState {
    fn new(
        snapshot: CacheSnapshot,
        catalogs: Catalogs,
        schema_document: Option<&str>,
    ) -> Result<Self> {
        let CacheSnapshot {
            documents,
            chunks,
            manifest,
        } = snapshot;
        let index = VectorIndex::build(manifest.dims, chunks)?;
        let by_id = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        let schema = resolve_schema(&documents, schema_document);
        if let Err(reason) = &schema {
            warn!(reason = %reason, "no usable element schema");
        }
        Ok(Self {
            documents,
            index,
            catalogs,
            manifest,
            schema,
            by_id,
        })
    }

    pub fn document(&self, id: &str) -> Option<&KnowledgeDocument> {
        self.by_id.get(id).map(|&i| &self.documents[i])
    }
}

pub struct KnowledgeRepository {
    config: Arc<Config>,
    encoder: Arc<dyn Encoder>,
    state: RwLock<Option<Arc<KnowledgeState>>>,
}

impl KnowledgeRepository {
    pub fn new(config: Arc<Config>, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            config,
            encoder,
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The loaded state, building it on first use.
    pub async fn state(&self) -> Result<Arc<KnowledgeState>> {
        if let Some(state) = self.state.read().await.as_ref() {
            return Ok(Arc::clone(state));
        }

        let mut guard = self.state.write().await;
        // Another caller may have finished the build while we waited.
        if let Some(state) = guard.as_ref() {
            return Ok(Arc::clone(state));
        }
        let (state, _) = self.rebuild(SyncMode::Incremental).await?;
        let state = Arc::new(state);
        *guard = Some(Arc::clone(&state));
        Ok(state)
    }

    /// Resync the cache against the corpus and swap in fresh state.
    pub async fn reload(&self) -> Result<Option<SyncReport>> {
        self.sync(SyncMode::Incremental).await
    }

    /// Run ingestion in `mode` and swap in the resulting state.
    ///
    /// Returns `None` when the corpus root is absent and the cache was
    /// loaded as-is.
    pub async fn sync(&self, mode: SyncMode) -> Result<Option<SyncReport>> {
        let mut guard = self.state.write().await;
        let (state, report) = self.rebuild(mode).await?;
        *guard = Some(Arc::new(state));
        Ok(report)
    }

    #[instrument(skip(self), fields(cache = %self.config.cache.dir.display()))]
    async fn rebuild(&self, mode: SyncMode) -> Result<(KnowledgeState, Option<SyncReport>)> {
        let (snapshot, report) = if self.config.corpus.root.exists() {
            let ingestor = Ingestor::new(Arc::clone(&self.config), Arc::clone(&self.encoder));
            let (snapshot, report) = ingestor.sync(mode).await?;
            (snapshot, Some(report))
        } else {
            (self.load_cache_as_is()?, None)
        };

        let catalogs = load_catalogs(&self.config.catalogs)?;
        let state = KnowledgeState::new(
            snapshot,
            catalogs,
            self.config.validation.schema_document.as_deref(),
        )?;
        info!(
            documents = state.documents.len(),
            chunks = state.index.len(),
            "knowledge state ready"
        );
        Ok((state, report))
    }

    fn load_cache_as_is(&self) -> Result<CacheSnapshot> {
        let dir = &self.config.cache.dir;
        warn!(
            root = %self.config.corpus.root.display(),
            "corpus root missing; serving cached knowledge as-is"
        );
        let Some(snapshot) = cache::load(dir)
            .with_context(|| format!("Failed to load cache from {}", dir.display()))?
        else {
            bail!(
                "Corpus root {} does not exist and no cache was found in {}",
                self.config.corpus.root.display(),
                dir.display()
            );
        };
        if snapshot.manifest.dims != self.encoder.dims() {
            return Err(anyhow::Error::new(CoreError::DimensionMismatch {
                expected: self.encoder.dims(),
                actual: snapshot.manifest.dims,
            })
            .context("cached embeddings do not match the configured encoder"));
        }
        Ok(snapshot)
    }

    /// Every loaded document, grouped by kind.
    pub async fn documents(&self) -> Result<BTreeMap<DocumentKind, Vec<KnowledgeDocument>>> {
        let state = self.state().await?;
        let mut grouped: BTreeMap<DocumentKind, Vec<KnowledgeDocument>> = BTreeMap::new();
        for doc in &state.documents {
            grouped.entry(doc.kind).or_default().push(doc.clone());
        }
        Ok(grouped)
    }

    pub async fn documents_of_kind(&self, kind: DocumentKind) -> Result<Vec<KnowledgeDocument>> {
        let state = self.state().await?;
        Ok(state
            .documents
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect())
    }

    /// Top-k chunks for `query`. A query with no indexable terms (blank or
    /// only stopwords) returns no hits.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTopK`] when `top_k` is zero.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(CoreError::InvalidTopK(top_k).into());
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.encoder.encode(query);
        if vector.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }

        let state = self.state().await?;
        let scored = state.index.search(&vector, top_k)?;

        Ok(scored
            .into_iter()
            .filter_map(|hit| {
                let chunk = hit.chunk;
                let doc = state.document(&chunk.document_id)?;
                Some(SearchHit {
                    document_id: doc.id.clone(),
                    kind: doc.kind,
                    title: doc.title(),
                    heading: chunk.heading.clone(),
                    chunk_id: chunk.chunk_id.clone(),
                    text: chunk.text.clone(),
                    score: hit.score,
                    metadata: doc.metadata.clone(),
                })
            })
            .collect())
    }

    /// Prompt-ready `"{heading}: {text}"` lines for the top hits.
    pub async fn summaries(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let hits = self.search(query, top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let heading = if hit.heading.trim().is_empty() {
                    "General"
                } else {
                    hit.heading.as_str()
                };
                format!("{}: {}", heading, hit.text)
            })
            .collect())
    }

    pub fn validation_report(
        &self,
        issues: impl IntoIterator<Item = ValidationIssue>,
    ) -> ValidationReport {
        ValidationReport::from_issues(issues)
    }

    /// Validate a candidate plan against the element schema and the
    /// domain rules.
    pub async fn validate(&self, plan: &Value) -> Result<ValidationReport> {
        let state = self.state().await?;
        let thresholds = &self.config.rules;

        let report = match &state.schema {
            Ok(schema) => self.validation_report(
                validate_schema(schema, plan)
                    .chain(validate_rules(plan, &state.catalogs, thresholds)),
            ),
            Err(reason) => self.validation_report(
                std::iter::once(ValidationIssue::error("schema.missing", "$", reason.clone()))
                    .chain(validate_rules(plan, &state.catalogs, thresholds)),
            ),
        };
        Ok(report)
    }

    pub async fn knowledge_graph(&self) -> Result<KnowledgeGraph> {
        let state = self.state().await?;
        Ok(KnowledgeGraph::build(&state.documents))
    }
}

/// Pick the element schema: the configured document, else the first
/// schema-kind document in id order.
fn resolve_schema(
    documents: &[KnowledgeDocument],
    configured: Option<&str>,
) -> std::result::Result<ElementSchema, String> {
    let doc = match configured {
        Some(id) => documents
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| format!("schema document '{}' is not in the corpus", id))?,
        None => documents
            .iter()
            .find(|d| d.kind == DocumentKind::Schema)
            .ok_or_else(|| "the corpus has no schema document".to_string())?,
    };
    schema_value(doc).map(ElementSchema::from_value)
}

/// The JSON value of a schema document: the whole body for JSON sources,
/// else the first fenced `json` block of a Markdown source.
fn schema_value(doc: &KnowledgeDocument) -> std::result::Result<Value, String> {
    let body: String = doc
        .sections
        .iter()
        .map(|s| s.body.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        return Ok(value);
    }

    let fenced = body
        .split("```json")
        .nth(1)
        .and_then(|rest| rest.split("```").next())
        .ok_or_else(|| format!("schema document '{}' holds no JSON", doc.id))?;
    serde_json::from_str(fenced)
        .map_err(|e| format!("schema document '{}' is not valid JSON: {}", doc.id, e))
}
