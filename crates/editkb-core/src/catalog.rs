//! Asset catalogs and rule tables consulted by the plan rule validator.
//!
//! Catalog files are JSON, either wrapped (`{"items": [...]}` for asset
//! catalogs, `{"rules": [...]}` for rule tables) or a bare array. Parsing
//! lives here; reading the files is the application's job.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One b-roll clip or sound effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Minimum spacing between repeated uses of a motion action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionRule {
    pub action: String,
    /// Seconds.
    #[serde(default)]
    pub min_spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

/// Tags recommended for elements carrying a given `context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRule {
    pub context: String,
    #[serde(default)]
    pub recommended_sfx_tags: Vec<String>,
    #[serde(default)]
    pub recommended_broll_tags: Vec<String>,
}

/// All reference data, keyed by id / action / context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogs {
    pub broll: BTreeMap<String, CatalogEntry>,
    pub sfx: BTreeMap<String, CatalogEntry>,
    pub motion_rules: BTreeMap<String, MotionRule>,
    pub context_rules: BTreeMap<String, ContextRule>,
}

impl Catalogs {
    pub fn with_broll(mut self, entries: Vec<CatalogEntry>) -> Self {
        self.broll = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        self
    }

    pub fn with_sfx(mut self, entries: Vec<CatalogEntry>) -> Self {
        self.sfx = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        self
    }

    pub fn with_motion_rules(mut self, rules: Vec<MotionRule>) -> Self {
        self.motion_rules = rules.into_iter().map(|r| (r.action.clone(), r)).collect();
        self
    }

    pub fn with_context_rules(mut self, rules: Vec<ContextRule>) -> Self {
        self.context_rules = rules.into_iter().map(|r| (r.context.clone(), r)).collect();
        self
    }

    /// Look up an SFX id, also trying it without an `assets/sfx/` prefix.
    pub fn sfx_entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.sfx
            .get(id)
            .or_else(|| id.strip_prefix("assets/sfx/").and_then(|s| self.sfx.get(s)))
    }

    pub fn is_empty(&self) -> bool {
        self.broll.is_empty()
            && self.sfx.is_empty()
            && self.motion_rules.is_empty()
            && self.context_rules.is_empty()
    }
}

/// Parse a catalog file body. `key` names the wrapper field (`items` or
/// `rules`); a bare top-level array is accepted too.
pub fn parse_list<T: DeserializeOwned>(name: &str, text: &str, key: &str) -> Result<Vec<T>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CoreError::parse(name, e.to_string()))?;
    let list = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => match map.remove(key) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        },
        _ => {
            return Err(CoreError::parse(
                name,
                format!("expected an array or an object with \"{}\"", key),
            ))
        }
    };
    serde_json::from_value(list).map_err(|e| CoreError::parse(name, e.to_string()))
}
