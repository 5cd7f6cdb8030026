//! Core data models used throughout editkb.
//!
//! These types represent the documents, chunks, and validation results that
//! flow through the ingestion, retrieval, and validation pipeline. They
//! carry no behavior beyond small accessors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of document kinds, decided once at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Guideline,
    Definition,
    Example,
    Schema,
    Glossary,
    Catalog,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Guideline,
        DocumentKind::Definition,
        DocumentKind::Example,
        DocumentKind::Schema,
        DocumentKind::Glossary,
        DocumentKind::Catalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Guideline => "guideline",
            DocumentKind::Definition => "definition",
            DocumentKind::Example => "example",
            DocumentKind::Schema => "schema",
            DocumentKind::Glossary => "glossary",
            DocumentKind::Catalog => "catalog",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        DocumentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "Unknown document kind: '{}'. Use guideline, definition, example, schema, glossary, or catalog.",
                    s
                )
            })
    }
}

/// A scalar metadata value from front matter or a JSON top-level field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Null,
}

impl Scalar {
    /// Convert a JSON value into a scalar. Arrays and objects yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Scalar> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => Some(Scalar::Number(n.clone())),
            serde_json::Value::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => f.write_str(s),
            Scalar::Null => f.write_str("null"),
        }
    }
}

/// Ordered metadata map. `BTreeMap` keeps cache serialization stable.
pub type Metadata = BTreeMap<String, Scalar>;

/// One titled section of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text; empty for the untitled preamble.
    pub heading: String,
    /// Heading rank (1 for `#`), 0 when untitled.
    pub level: u8,
    pub body: String,
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Path relative to the corpus root, `/`-separated.
    pub id: String,
    pub kind: DocumentKind,
    pub metadata: Metadata,
    pub sections: Vec<Section>,
    /// Lowercase hex SHA-256 of the raw source bytes.
    pub content_hash: String,
}

impl KnowledgeDocument {
    /// The `title` metadata field, falling back to the humanized file stem.
    pub fn title(&self) -> String {
        self.metadata
            .get("title")
            .and_then(Scalar::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| humanize_stem(&self.id))
    }

    pub fn headings(&self) -> impl Iterator<Item = (&str, u8)> {
        self.sections
            .iter()
            .filter(|s| !s.heading.is_empty())
            .map(|s| (s.heading.as_str(), s.level))
    }
}

/// `guides/planning_guidelines.md` → `Planning Guidelines`.
pub fn humanize_stem(id: &str) -> String {
    let file = id.rsplit('/').next().unwrap_or(id);
    let stem = match file.rfind('.') {
        Some(pos) if pos > 0 => &file[..pos],
        _ => file,
    };
    stem.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One embedded unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorisedChunk {
    pub document_id: String,
    /// Unique within the document: `{document_id}::s{section}:c{chunk}`.
    pub chunk_id: String,
    pub section_index: usize,
    /// Heading of the owning section, kept for prompt attribution.
    pub heading: String,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    /// Unit-normalized embedding.
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.pad("error"),
            Severity::Warning => f.pad("warning"),
        }
    }
}

/// One problem found in a candidate plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Stable dotted identifier, e.g. `schema.required`.
    pub code: String,
    /// Location in the plan, e.g. `elements[3].layer`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False if and only if at least one error-severity issue is present.
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Collect issues in order and derive `is_valid`.
    pub fn from_issues(issues: impl IntoIterator<Item = ValidationIssue>) -> Self {
        let issues: Vec<ValidationIssue> = issues.into_iter().collect();
        let is_valid = !issues.iter().any(ValidationIssue::is_error);
        Self { is_valid, issues }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}
