//! Plan rule validator.
//!
//! Domain rules that a JSON schema cannot express: spacing between
//! repeated motion effects, staggering of text overlays, overlap on
//! single-occupancy layers, and alignment with the asset catalogs.
//!
//! Every rule is a pure function of the plan, the catalogs, and the
//! thresholds. [`validate_rules`] evaluates them one at a time, so callers
//! that stop early skip the remaining rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{CatalogEntry, Catalogs};
use crate::models::ValidationIssue;
use crate::plan::{element_views, elements, Element};

/// Float noise tolerance when comparing gaps against a threshold.
const EPSILON: f64 = 1e-9;

/// Numeric thresholds and layer policy for the rule validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Minimum seconds between repeats of an action with no catalog rule.
    pub default_motion_spacing: f64,
    /// Minimum seconds between consecutive text overlays.
    pub overlay_min_spacing: f64,
    /// Layers that hold at most one element at any instant.
    pub single_occupancy_layers: Vec<String>,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            default_motion_spacing: 0.5,
            overlay_min_spacing: 0.3,
            single_occupancy_layers: vec![
                "main".to_string(),
                "video".to_string(),
                "transition".to_string(),
            ],
        }
    }
}

struct RuleInput<'a> {
    elements: Vec<Element<'a>>,
    catalogs: &'a Catalogs,
    thresholds: &'a RuleThresholds,
}

type Rule = fn(&RuleInput<'_>) -> Vec<ValidationIssue>;

const RULES: &[Rule] = &[
    motion_spacing,
    overlay_stagger,
    layer_overlap,
    catalog_alignment,
];

/// Run every domain rule against `plan`, one rule at a time.
///
/// A plan without an element array yields nothing here; the schema
/// validator reports its shape.
pub fn validate_rules<'a>(
    plan: &'a Value,
    catalogs: &'a Catalogs,
    thresholds: &'a RuleThresholds,
) -> impl Iterator<Item = ValidationIssue> + 'a {
    let input = RuleInput {
        elements: elements(plan)
            .map(|items| element_views(items).collect())
            .unwrap_or_default(),
        catalogs,
        thresholds,
    };
    RULES.iter().flat_map(move |rule| rule(&input))
}

/// Timed elements ordered by start time, plan order for ties.
fn by_time<'a>(elements: impl Iterator<Item = Element<'a>>) -> Vec<(f64, Element<'a>)> {
    let mut timed: Vec<_> = elements
        .filter_map(|e| e.time().map(|t| (t, e)))
        .collect();
    timed.sort_by(|a, b| a.0.total_cmp(&b.0));
    timed
}

fn motion_spacing(input: &RuleInput<'_>) -> Vec<ValidationIssue> {
    let mut groups: BTreeMap<(&str, &str), Vec<Element<'_>>> = BTreeMap::new();
    for element in &input.elements {
        if let Some(action) = element.action() {
            groups
                .entry((element.layer().unwrap_or(""), action))
                .or_default()
                .push(*element);
        }
    }

    let mut issues = Vec::new();
    for ((layer, action), members) in groups {
        let min_spacing = input
            .catalogs
            .motion_rules
            .get(action)
            .filter(|rule| rule.layer.as_deref().is_none_or(|l| l == layer))
            .and_then(|rule| rule.min_spacing)
            .unwrap_or(input.thresholds.default_motion_spacing);

        let timed = by_time(members.into_iter());
        for (i, (prev_t, prev)) in timed.iter().enumerate() {
            for (t, current) in &timed[i + 1..] {
                let gap = t - prev_t;
                if gap <= 0.0 {
                    issues.push(ValidationIssue::error(
                        "rule.motion.spacing",
                        current.field_path("timestamp"),
                        format!(
                            "'{}' at {}s repeats {} at the same timestamp",
                            action,
                            t,
                            prev.path()
                        ),
                    ));
                } else if gap + EPSILON < min_spacing {
                    issues.push(ValidationIssue::warning(
                        "rule.motion.spacing",
                        current.field_path("timestamp"),
                        format!(
                            "'{}' at {}s is {:.2}s after {}; minimum spacing is {}s",
                            action,
                            t,
                            gap,
                            prev.path(),
                            min_spacing
                        ),
                    ));
                } else {
                    break;
                }
            }
        }
    }
    issues
}

fn overlay_stagger(input: &RuleInput<'_>) -> Vec<ValidationIssue> {
    let min = input.thresholds.overlay_min_spacing;
    let overlays = by_time(
        input
            .elements
            .iter()
            .copied()
            .filter(|e| e.kind() == Some("text_overlay")),
    );
    overlays
        .windows(2)
        .filter(|pair| pair[1].0 - pair[0].0 + EPSILON < min)
        .map(|pair| {
            ValidationIssue::warning(
                "rule.overlay.spacing",
                pair[1].1.field_path("timestamp"),
                format!(
                    "text overlay at {}s follows {} too closely; stagger overlays by at least {}s",
                    pair[1].0,
                    pair[0].1.path(),
                    min
                ),
            )
        })
        .collect()
}

fn layer_overlap(input: &RuleInput<'_>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for layer in &input.thresholds.single_occupancy_layers {
        let timed = by_time(
            input
                .elements
                .iter()
                .copied()
                .filter(|e| e.layer() == Some(layer.as_str())),
        );
        for (i, (start, element)) in timed.iter().enumerate() {
            let end = start + element.duration();
            for (other_start, other) in &timed[i + 1..] {
                if *other_start >= end {
                    break;
                }
                // empty intervals occupy nothing
                if other.duration() <= 0.0 {
                    continue;
                }
                issues.push(ValidationIssue::error(
                    "rule.layer.overlap",
                    other.field_path("layer"),
                    format!(
                        "{} starts at {}s on single-occupancy layer '{}' before {} ends at {}s",
                        other.path(),
                        other_start,
                        layer,
                        element.path(),
                        end
                    ),
                ));
            }
        }
    }
    issues
}

fn catalog_alignment(input: &RuleInput<'_>) -> Vec<ValidationIssue> {
    let catalogs = input.catalogs;
    let mut issues = Vec::new();

    for element in &input.elements {
        let broll = element.broll().and_then(|(field, id)| {
            if catalogs.broll.is_empty() {
                return None;
            }
            let entry = catalogs.broll.get(id);
            if entry.is_none() {
                issues.push(ValidationIssue::error(
                    "rule.catalog.missing_broll",
                    element.field_path(field),
                    format!("b-roll '{}' is not in the b-roll catalog", id),
                ));
            }
            entry.map(|e| (field, e))
        });

        let sound = element.sound().and_then(|(field, id)| {
            if catalogs.sfx.is_empty() {
                return None;
            }
            let entry = catalogs.sfx_entry(id);
            if entry.is_none() {
                issues.push(ValidationIssue::error(
                    "rule.catalog.missing_sfx",
                    element.field_path(field),
                    format!("sound '{}' is not in the SFX catalog", id),
                ));
            }
            entry.map(|e| (field, e))
        });

        let references_asset = element.broll().is_some() || element.sound().is_some();
        let Some(context) = element.context().filter(|_| references_asset) else {
            continue;
        };
        if catalogs.context_rules.is_empty() {
            continue;
        }
        let Some(rule) = catalogs.context_rules.get(context) else {
            issues.push(ValidationIssue::warning(
                "rule.context.unknown",
                element.field_path("context"),
                format!("context '{}' has no recommendation rule", context),
            ));
            continue;
        };

        if let Some((field, entry)) = sound {
            if let Some(issue) = tag_mismatch(
                "rule.context.sfx_mismatch",
                element,
                field,
                entry,
                context,
                &rule.recommended_sfx_tags,
            ) {
                issues.push(issue);
            }
        }
        if let Some((field, entry)) = broll {
            if let Some(issue) = tag_mismatch(
                "rule.context.broll_mismatch",
                element,
                field,
                entry,
                context,
                &rule.recommended_broll_tags,
            ) {
                issues.push(issue);
            }
        }
    }
    issues
}

fn tag_mismatch(
    code: &str,
    element: &Element<'_>,
    field: &str,
    entry: &CatalogEntry,
    context: &str,
    recommended: &[String],
) -> Option<ValidationIssue> {
    if recommended.is_empty() || entry.tags.iter().any(|t| recommended.contains(t)) {
        return None;
    }
    Some(ValidationIssue::warning(
        code,
        element.field_path(field),
        format!(
            "'{}' has none of the tags recommended for context '{}' ({})",
            entry.id,
            context,
            recommended.join(", ")
        ),
    ))
}
