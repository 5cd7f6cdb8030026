//! Loads asset catalogs and rule tables from `catalogs.dir`.
//!
//! A missing file yields an empty table; a malformed one is an error,
//! since validating against a half-read catalog would report bogus
//! `rule.catalog.*` errors.

use std::path::Path;

use anyhow::{Context, Result};
use editkb_core::catalog::{parse_list, CatalogEntry, Catalogs, ContextRule, MotionRule};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::CatalogsConfig;

pub fn load_catalogs(config: &CatalogsConfig) -> Result<Catalogs> {
    let dir = &config.dir;
    let broll: Vec<CatalogEntry> = read_list(dir, &config.broll, "items")?;
    let sfx: Vec<CatalogEntry> = read_list(dir, &config.sfx, "items")?;
    let motion: Vec<MotionRule> = read_list(dir, &config.motion_rules, "rules")?;
    let context: Vec<ContextRule> = read_list(dir, &config.context_rules, "rules")?;

    debug!(
        broll = broll.len(),
        sfx = sfx.len(),
        motion_rules = motion.len(),
        context_rules = context.len(),
        "loaded catalogs"
    );

    Ok(Catalogs::default()
        .with_broll(broll)
        .with_sfx(sfx)
        .with_motion_rules(motion)
        .with_context_rules(context))
}

fn read_list<T: DeserializeOwned>(dir: &Path, file: &str, key: &str) -> Result<Vec<T>> {
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
    Ok(parse_list(file, &text, key)?)
}
