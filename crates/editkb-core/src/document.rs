//! Source bytes → [`KnowledgeDocument`] → [`VectorisedChunk`]s.
//!
//! Markdown goes through the segmenter. JSON is wrapped as a single
//! section whose body is the pretty-printed value; top-level scalar fields
//! become metadata. A JSON file that declares itself a schema is checked
//! for internal consistency before it is accepted.
//!
//! The kind of a document is decided here, once, and carried as data.

use serde_json::Value;

use crate::chunk::{chunk_document, sha256_hex};
use crate::embedding::Encoder;
use crate::error::{CoreError, Result};
use crate::markdown::segment;
use crate::models::{
    humanize_stem, DocumentKind, KnowledgeDocument, Metadata, Scalar, Section, VectorisedChunk,
};
use crate::schema::check_consistency;

/// Parse one corpus file. `id` is the `/`-separated path relative to the
/// corpus root; its extension selects the parser.
pub fn parse_document(id: &str, bytes: &[u8], section_level: u8) -> Result<KnowledgeDocument> {
    let content_hash = sha256_hex(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CoreError::parse(id, format!("not valid UTF-8: {}", e)))?;

    if is_json(id) {
        return parse_json(id, text, content_hash);
    }

    let segmented = segment(id, text, section_level)?;
    let kind = resolve_kind(id, &segmented.metadata, false);
    Ok(KnowledgeDocument {
        id: id.to_string(),
        kind,
        metadata: segmented.metadata,
        sections: segmented.sections,
        content_hash,
    })
}

fn is_json(id: &str) -> bool {
    id.to_ascii_lowercase().ends_with(".json")
}

fn parse_json(id: &str, text: &str, content_hash: String) -> Result<KnowledgeDocument> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CoreError::parse(id, e.to_string()))?;

    let mut metadata = Metadata::new();
    if let Value::Object(map) = &value {
        for (key, field) in map {
            if let Some(scalar) = Scalar::from_json(field) {
                metadata.insert(key.clone(), scalar);
            }
        }
    }

    let is_schema = declares_schema(id, &value);
    if is_schema {
        check_consistency(id, &value)?;
    }

    let kind = resolve_kind(id, &metadata, is_schema);
    let title = metadata
        .get("title")
        .and_then(Scalar::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| humanize_stem(id));
    let body =
        serde_json::to_string_pretty(&value).map_err(|e| CoreError::parse(id, e.to_string()))?;

    Ok(KnowledgeDocument {
        id: id.to_string(),
        kind,
        metadata,
        sections: vec![Section {
            heading: title,
            level: 1,
            body,
        }],
        content_hash,
    })
}

fn declares_schema(id: &str, value: &Value) -> bool {
    value.get("$schema").is_some() || id.to_ascii_lowercase().ends_with("schema.json")
}

/// Decide a document's kind; the first matching rule wins.
///
/// 1. An explicit `kind` metadata field naming a valid kind.
/// 2. A JSON schema document.
/// 3. A path under `catalogs/` or `assets/`, or a stem containing
///    `catalog` or `_rules`.
/// 4. Stem or parent directory containing `glossary`, `definition`,
///    `example` or `pattern`.
/// 5. Otherwise a guideline.
pub fn resolve_kind(id: &str, metadata: &Metadata, is_schema: bool) -> DocumentKind {
    if let Some(kind) = metadata
        .get("kind")
        .and_then(Scalar::as_str)
        .and_then(|s| s.parse().ok())
    {
        return kind;
    }
    if is_schema {
        return DocumentKind::Schema;
    }

    let lower = id.to_lowercase();
    let mut parts: Vec<&str> = lower.split('/').collect();
    let file = parts.pop().unwrap_or_default();
    let stem = file.rsplit_once('.').map_or(file, |(s, _)| s);
    let parent = parts.last().copied().unwrap_or_default();

    if parts.iter().any(|d| *d == "catalogs" || *d == "assets")
        || stem.contains("catalog")
        || stem.contains("_rules")
    {
        return DocumentKind::Catalog;
    }

    let names_kind = |needle: &str| stem.contains(needle) || parent.contains(needle);
    if names_kind("glossary") {
        DocumentKind::Glossary
    } else if names_kind("definition") {
        DocumentKind::Definition
    } else if names_kind("example") || names_kind("pattern") {
        DocumentKind::Example
    } else {
        DocumentKind::Guideline
    }
}

/// Chunk every section of `doc` and encode each chunk.
pub fn vectorise(
    doc: &KnowledgeDocument,
    max_tokens: usize,
    encoder: &dyn Encoder,
) -> Vec<VectorisedChunk> {
    chunk_document(doc, max_tokens)
        .into_iter()
        .map(|c| VectorisedChunk {
            vector: encoder.encode(&c.text),
            document_id: c.document_id,
            chunk_id: c.chunk_id,
            section_index: c.section_index,
            heading: c.heading,
            text: c.text,
            hash: c.hash,
        })
        .collect()
}
