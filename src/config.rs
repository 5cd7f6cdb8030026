//! TOML configuration for `ekb`.
//!
//! Only `[corpus]` and `[cache]` are required; every other section has
//! defaults. Relative paths are resolved against the directory holding
//! the config file, so the same file works from any working directory.

use anyhow::{Context, Result};
use editkb_core::embedding::DEFAULT_DIMS;
use editkb_core::markdown::DEFAULT_SECTION_LEVEL;
use editkb_core::rules::RuleThresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub markdown: MarkdownConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub catalogs: CatalogsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub rules: RuleThresholds,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.markdown".to_string(),
        "**/*.json".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarkdownConfig {
    #[serde(default = "default_section_level")]
    pub section_level: u8,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            section_level: DEFAULT_SECTION_LEVEL,
        }
    }
}

fn default_section_level() -> u8 {
    DEFAULT_SECTION_LEVEL
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            dims: default_dims(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogsConfig {
    #[serde(default = "default_catalog_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_broll")]
    pub broll: String,
    #[serde(default = "default_sfx")]
    pub sfx: String,
    #[serde(default = "default_motion_rules")]
    pub motion_rules: String,
    #[serde(default = "default_context_rules")]
    pub context_rules: String,
}

impl Default for CatalogsConfig {
    fn default() -> Self {
        Self {
            dir: default_catalog_dir(),
            broll: default_broll(),
            sfx: default_sfx(),
            motion_rules: default_motion_rules(),
            context_rules: default_context_rules(),
        }
    }
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("assets")
}
fn default_broll() -> String {
    "broll_catalog.json".to_string()
}
fn default_sfx() -> String {
    "sfx_catalog.json".to_string()
}
fn default_motion_rules() -> String {
    "motion_rules.json".to_string()
}
fn default_context_rules() -> String {
    "context_rules.json".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ValidationConfig {
    /// Corpus id of the element schema; the first schema document when unset.
    #[serde(default)]
    pub schema_document: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(1..=6).contains(&config.markdown.section_level) {
        anyhow::bail!("markdown.section_level must be in [1, 6]");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hashing" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be hashing.", other),
    }

    let rules = &config.rules;
    if rules.default_motion_spacing < 0.0 || rules.overlay_min_spacing < 0.0 {
        anyhow::bail!("rules spacing thresholds must be >= 0");
    }

    if config.corpus.include_globs.is_empty() {
        anyhow::bail!("corpus.include_globs must not be empty");
    }

    Ok(())
}

impl Config {
    /// Resolve relative paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.corpus.root,
            &mut self.cache.dir,
            &mut self.catalogs.dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Build a config in code, mainly for tests and embedding callers.
    pub fn for_paths(corpus_root: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig {
                root: corpus_root.into(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            cache: CacheConfig {
                dir: cache_dir.into(),
            },
            markdown: MarkdownConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            catalogs: CatalogsConfig::default(),
            validation: ValidationConfig::default(),
            rules: RuleThresholds::default(),
        }
    }
}
