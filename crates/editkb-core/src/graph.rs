//! Reference graph over the loaded corpus.
//!
//! A diagnostic view only: search and validation never consult it. Nodes
//! live in an arena indexed by [`NodeId`]; edges refer to nodes by id, so
//! cycles between documents need no shared ownership.
//!
//! Edges:
//! - `contains`: document → each titled section.
//! - `references`: section (or document, for untitled text) → document or
//!   section, detected from relative markdown links, `[[wiki]]` links, and
//!   `see <Title>` phrases naming a known title or heading.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::KnowledgeDocument;

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Section,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Document id, or `{document_id}::{heading}` for sections.
    pub key: String,
    /// Title for documents, heading text for sections.
    pub label: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Contains,
    References,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_key: BTreeMap<String, NodeId>,
}

static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]\(([^)\s#]+)(?:#[^)]*)?\)").expect("valid regex")
});

static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|#]+)(?:#([^\]|]+))?(?:\|[^\]]*)?\]\]").expect("valid regex")
});

static SEE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsee\s+(?:the\s+)?").expect("valid regex"));

impl KnowledgeGraph {
    pub fn build(documents: &[KnowledgeDocument]) -> Self {
        let mut graph = Self::default();
        let mut sources: Vec<(NodeId, &KnowledgeDocument, &str)> = Vec::new();

        for doc in documents {
            let doc_node = graph.add_node(NodeKind::Document, doc.id.clone(), doc.title(), doc, None);
            for section in &doc.sections {
                if section.heading.is_empty() {
                    sources.push((doc_node, doc, &section.body));
                    continue;
                }
                let key = format!("{}::{}", doc.id, section.heading);
                let existing = graph.by_key.get(&key).copied();
                let section_node = match existing {
                    Some(existing) => existing,
                    None => graph.add_node(
                        NodeKind::Section,
                        key,
                        section.heading.clone(),
                        doc,
                        Some(section.level),
                    ),
                };
                graph.add_edge(doc_node, section_node, EdgeKind::Contains);
                sources.push((section_node, doc, &section.body));
            }
        }

        let labels = graph.label_index();
        for (from, doc, body) in sources {
            let targets: BTreeSet<NodeId> = graph
                .references_in(doc, body, &labels)
                .into_iter()
                .filter(|to| *to != from && graph.nodes[to.0].document_id != doc.id)
                .collect();
            for to in targets {
                graph.add_edge(from, to, EdgeKind::References);
            }
        }
        graph
    }

    fn add_node(
        &mut self,
        kind: NodeKind,
        key: String,
        label: String,
        doc: &KnowledgeDocument,
        level: Option<u8>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_key.insert(key.clone(), id);
        self.nodes.push(Node {
            id,
            kind,
            key,
            label,
            document_id: doc.id.clone(),
            level,
        });
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        let edge = Edge { from, to, kind };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Lowercased labels, longest first, for `see ...` matching.
    fn label_index(&self) -> Vec<(String, NodeId)> {
        let mut labels: Vec<(String, NodeId)> = self
            .nodes
            .iter()
            .filter(|n| !n.label.is_empty())
            .map(|n| (n.label.to_lowercase(), n.id))
            .collect();
        labels.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.1.cmp(&b.1)));
        labels
    }

    fn references_in(
        &self,
        doc: &KnowledgeDocument,
        body: &str,
        labels: &[(String, NodeId)],
    ) -> Vec<NodeId> {
        let mut found = Vec::new();

        for caps in MD_LINK_RE.captures_iter(body) {
            let target = &caps[1];
            if target.contains("://") || target.starts_with("mailto:") {
                continue;
            }
            if let Some(id) = self.by_key.get(&resolve_relative(&doc.id, target)) {
                found.push(*id);
            }
        }

        for caps in WIKI_LINK_RE.captures_iter(body) {
            let Some(doc_node) = self.find_document(caps[1].trim()) else {
                continue;
            };
            let heading = caps.get(2).map(|m| m.as_str().trim());
            let section = heading.and_then(|h| {
                let key = format!("{}::{}", self.nodes[doc_node.0].key, h);
                self.by_key.get(&key).copied()
            });
            found.push(section.unwrap_or(doc_node));
        }

        let lower = body.to_lowercase();
        for m in SEE_RE.find_iter(&lower) {
            let rest = &lower[m.end()..];
            let hit = labels.iter().find(|(label, _)| {
                rest.starts_with(label.as_str())
                    && !rest[label.len()..]
                        .chars()
                        .next()
                        .is_some_and(char::is_alphanumeric)
            });
            if let Some((_, id)) = hit {
                found.push(*id);
            }
        }

        found
    }

    /// Match a wiki target against document ids, stems, and titles.
    fn find_document(&self, target: &str) -> Option<NodeId> {
        let wanted = target.to_lowercase();
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Document)
            .find(|n| {
                let id = n.key.to_lowercase();
                let stem = id
                    .rsplit('/')
                    .next()
                    .map(|f| f.rsplit_once('.').map_or(f, |(s, _)| s))
                    .unwrap_or(id.as_str());
                id == wanted || stem == wanted || n.label.to_lowercase() == wanted
            })
            .map(|n| n.id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Look up a node by key (document id or `doc::heading`).
    pub fn find(&self, key: &str) -> Option<&Node> {
        self.by_key.get(key).and_then(|id| self.node(*id))
    }

    /// Targets of outgoing edges of `kind` from `from`.
    pub fn neighbors(&self, from: NodeId, kind: EdgeKind) -> impl Iterator<Item = &Node> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == from && e.kind == kind)
            .filter_map(|e| self.node(e.to))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "nodes": self.nodes,
            "edges": self.edges,
        })
    }
}

/// Resolve `target` relative to the directory of document `from`.
fn resolve_relative(from: &str, target: &str) -> String {
    let mut parts: Vec<&str> = match target.strip_prefix('/') {
        Some(_) => Vec::new(),
        None => {
            let mut dir: Vec<&str> = from.split('/').collect();
            dir.pop();
            dir
        }
    };
    for part in target.trim_start_matches('/').split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentKind, Metadata, Section};

    fn doc(id: &str, sections: &[(&str, &str)]) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.to_string(),
            kind: DocumentKind::Guideline,
            metadata: Metadata::new(),
            sections: sections
                .iter()
                .map(|(h, b)| Section {
                    heading: h.to_string(),
                    level: if h.is_empty() { 0 } else { 2 },
                    body: b.to_string(),
                })
                .collect(),
            content_hash: String::new(),
        }
    }

    fn corpus() -> Vec<KnowledgeDocument> {
        vec![
            doc(
                "guides/motion_rules.md",
                &[
                    ("Zoom", "Zoom on numbers. See the Sound Design guide for cues."),
                    ("Spacing", "Details in [effects](../defs/effects.md#zoom)."),
                ],
            ),
            doc("guides/sound_design.md", &[("Cues", "Use [[effects#Zoom In]] sparingly.")]),
            doc("defs/effects.md", &[("Zoom In", "Scale up."), ("Shake", "Jitter.")]),
        ]
    }

    fn refs(graph: &KnowledgeGraph, key: &str) -> Vec<String> {
        let from = graph.find(key).unwrap().id;
        graph
            .neighbors(from, EdgeKind::References)
            .map(|n| n.key.clone())
            .collect()
    }

    #[test]
    fn test_documents_contain_sections() {
        let graph = KnowledgeGraph::build(&corpus());
        let effects = graph.find("defs/effects.md").unwrap();
        assert_eq!(effects.kind, NodeKind::Document);
        let children: Vec<_> = graph
            .neighbors(effects.id, EdgeKind::Contains)
            .map(|n| n.label.clone())
            .collect();
        assert_eq!(children, vec!["Zoom In", "Shake"]);
        assert_eq!(graph.nodes().len(), 3 + 5);
    }

    #[test]
    fn test_markdown_link_resolves_relative_path() {
        let graph = KnowledgeGraph::build(&corpus());
        assert_eq!(
            refs(&graph, "guides/motion_rules.md::Spacing"),
            vec!["defs/effects.md"]
        );
    }

    #[test]
    fn test_wiki_link_targets_section() {
        let graph = KnowledgeGraph::build(&corpus());
        assert_eq!(
            refs(&graph, "guides/sound_design.md::Cues"),
            vec!["defs/effects.md::Zoom In"]
        );
    }

    #[test]
    fn test_see_phrase_matches_title() {
        let graph = KnowledgeGraph::build(&corpus());
        assert_eq!(
            refs(&graph, "guides/motion_rules.md::Zoom"),
            vec!["guides/sound_design.md"]
        );
    }

    #[test]
    fn test_self_references_are_dropped() {
        let docs = vec![doc("a.md", &[("Intro", "See Intro. See [[a]].")])];
        let graph = KnowledgeGraph::build(&docs);
        assert!(refs(&graph, "a.md::Intro").is_empty());
    }

    #[test]
    fn test_json_shape() {
        let graph = KnowledgeGraph::build(&corpus());
        let json = graph.to_json();
        assert_eq!(json["nodes"][0]["kind"], "document");
        assert_eq!(json["nodes"][0]["label"], "Motion Rules");
        assert_eq!(json["edges"][0]["kind"], "contains");
        assert!(json["edges"].as_array().unwrap().len() >= 8);
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("guides/a.md", "../defs/b.md"), "defs/b.md");
        assert_eq!(resolve_relative("guides/a.md", "./c.md"), "guides/c.md");
        assert_eq!(resolve_relative("guides/a.md", "/top.md"), "top.md");
    }
}
