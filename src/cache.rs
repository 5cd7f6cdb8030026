//! On-disk cache artifacts.
//!
//! Three JSON files under `cache.dir`:
//!
//! | File | Contents |
//! |------|----------|
//! | `documents.json` | every parsed [`KnowledgeDocument`] |
//! | `embeddings.json` | encoder name, dims, and every [`VectorisedChunk`] |
//! | `manifest.json` | per-file fingerprints plus encoder and chunking settings |
//!
//! Each file is written to a temp file and renamed into place, and the
//! manifest is written last: a crash mid-persist leaves the previous
//! manifest, whose fingerprints no longer match, so the next sync redoes
//! the work.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use editkb_core::models::{KnowledgeDocument, VectorisedChunk};
use editkb_core::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DOCUMENTS_FILE: &str = "documents.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Fingerprints and settings of the last successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Document id → SHA-256 of the raw source bytes.
    pub files: BTreeMap<String, String>,
    pub encoder: String,
    pub dims: usize,
    pub max_tokens: usize,
    pub section_level: u8,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsFile {
    encoder: String,
    dims: usize,
    chunks: Vec<VectorisedChunk>,
}

#[derive(Serialize)]
struct EmbeddingsFileRef<'a> {
    encoder: &'a str,
    dims: usize,
    chunks: &'a [VectorisedChunk],
}

/// Everything one sync produces; the in-memory mirror of the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub documents: Vec<KnowledgeDocument>,
    pub chunks: Vec<VectorisedChunk>,
    pub manifest: Manifest,
}

impl CacheSnapshot {
    /// Chunks grouped by owning document id.
    pub fn chunks_by_document(&self) -> BTreeMap<&str, Vec<&VectorisedChunk>> {
        let mut out: BTreeMap<&str, Vec<&VectorisedChunk>> = BTreeMap::new();
        for chunk in &self.chunks {
            out.entry(chunk.document_id.as_str()).or_default().push(chunk);
        }
        out
    }
}

pub fn exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Load all three artifacts. `Ok(None)` when no manifest has been written.
///
/// # Errors
///
/// [`CoreError::CacheCorruption`] when an artifact is missing or fails to
/// deserialize, or when the embeddings disagree with the manifest.
pub fn load(dir: &Path) -> Result<Option<CacheSnapshot>> {
    if !exists(dir) {
        return Ok(None);
    }
    let manifest: Manifest = read_json(&dir.join(MANIFEST_FILE))?;
    let documents: Vec<KnowledgeDocument> = read_json(&dir.join(DOCUMENTS_FILE))?;
    let embeddings: EmbeddingsFile = read_json(&dir.join(EMBEDDINGS_FILE))?;

    if embeddings.encoder != manifest.encoder || embeddings.dims != manifest.dims {
        return Err(CoreError::corrupt(
            dir.join(EMBEDDINGS_FILE),
            format!(
                "written by {}/{} but manifest says {}/{}",
                embeddings.encoder, embeddings.dims, manifest.encoder, manifest.dims
            ),
        ));
    }
    if let Some(bad) = embeddings.chunks.iter().find(|c| c.vector.len() != manifest.dims) {
        return Err(CoreError::corrupt(
            dir.join(EMBEDDINGS_FILE),
            format!("chunk {} has {} dims", bad.chunk_id, bad.vector.len()),
        ));
    }

    Ok(Some(CacheSnapshot {
        documents,
        chunks: embeddings.chunks,
        manifest,
    }))
}

/// Write all three artifacts, manifest last.
pub fn persist(dir: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;

    write_json_atomic(dir, DOCUMENTS_FILE, &snapshot.documents)?;
    write_json_atomic(
        dir,
        EMBEDDINGS_FILE,
        &EmbeddingsFileRef {
            encoder: &snapshot.manifest.encoder,
            dims: snapshot.manifest.dims,
            chunks: &snapshot.chunks,
        },
    )?;
    write_json_atomic(dir, MANIFEST_FILE, &snapshot.manifest)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| CoreError::corrupt(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::corrupt(path, e.to_string()))
}

fn write_json_atomic<T: Serialize>(dir: &Path, filename: &str, value: &T) -> Result<()> {
    let target = dir.join(filename);
    let temp: PathBuf = dir.join(format!(".{filename}.tmp"));

    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| CoreError::io(&target, std::io::Error::other(e)))?;

    // Write to temp file first
    std::fs::write(&temp, &content).map_err(|e| CoreError::io(&temp, e))?;

    // Atomic rename
    std::fs::rename(&temp, &target).map_err(|e| CoreError::io(&target, e))?;

    debug!(file = %filename, size = content.len(), "wrote cache artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use editkb_core::models::{DocumentKind, Metadata, Section};

    fn snapshot() -> CacheSnapshot {
        let doc = KnowledgeDocument {
            id: "guides/zoom.md".to_string(),
            kind: DocumentKind::Guideline,
            metadata: Metadata::new(),
            sections: vec![Section {
                heading: "Zoom".to_string(),
                level: 2,
                body: "Zoom on numbers.".to_string(),
            }],
            content_hash: "abc".to_string(),
        };
        let chunk = VectorisedChunk {
            document_id: doc.id.clone(),
            chunk_id: "guides/zoom.md::s0:c0".to_string(),
            section_index: 0,
            heading: "Zoom".to_string(),
            text: "Zoom on numbers.".to_string(),
            hash: "def".to_string(),
            vector: vec![0.6, 0.8],
        };
        CacheSnapshot {
            manifest: Manifest {
                files: BTreeMap::from([(doc.id.clone(), "abc".to_string())]),
                encoder: "hashing-v1".to_string(),
                dims: 2,
                max_tokens: 200,
                section_level: 2,
                synced_at: Utc::now(),
            },
            documents: vec![doc],
            chunks: vec![chunk],
        }
    }

    #[test]
    fn test_missing_cache_loads_as_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("knowledge");
        let snap = snapshot();
        persist(&dir, &snap).unwrap();
        assert!(dir.join(DOCUMENTS_FILE).is_file());
        assert!(dir.join(EMBEDDINGS_FILE).is_file());
        assert!(!dir.join(".manifest.json.tmp").exists());
        assert_eq!(load(&dir).unwrap(), Some(snap));
    }

    #[test]
    fn test_corrupt_artifact_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        persist(tmp.path(), &snapshot()).unwrap();
        std::fs::write(tmp.path().join(DOCUMENTS_FILE), "{ not json").unwrap();
        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::CacheCorruption { .. }));
    }

    #[test]
    fn test_missing_artifact_with_manifest_is_corrupt() {
        let tmp = tempfile::TempDir::new().unwrap();
        persist(tmp.path(), &snapshot()).unwrap();
        std::fs::remove_file(tmp.path().join(EMBEDDINGS_FILE)).unwrap();
        assert!(matches!(
            load(tmp.path()),
            Err(CoreError::CacheCorruption { .. })
        ));
    }

    #[test]
    fn test_vector_length_disagreeing_with_manifest_is_corrupt() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut snap = snapshot();
        snap.chunks[0].vector.push(0.0);
        persist(tmp.path(), &snap).unwrap();
        assert!(load(tmp.path()).is_err());
    }
}
