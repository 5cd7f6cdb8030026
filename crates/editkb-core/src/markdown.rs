//! Front matter extraction and heading-based sectioning.
//!
//! A document may open with a metadata block delimited by `---` (simple
//! `key: value` lines) or `+++` (TOML). The remaining body is split at ATX
//! headings whose rank is at or above a chosen `section_level`; deeper
//! headings stay inside their parent section's body.
//!
//! # Example
//!
//! ```rust
//! use editkb_core::markdown::segment;
//!
//! let doc = segment("x.md", "---\ntitle: Motion\n---\n## Zoom\nUse sparingly.", 2).unwrap();
//! assert_eq!(doc.metadata["title"].as_str(), Some("Motion"));
//! assert_eq!(doc.sections[0].heading, "Zoom");
//! ```

use crate::error::{CoreError, Result};
use crate::models::{Metadata, Scalar, Section};

/// Default heading rank used for sectioning (`##`).
pub const DEFAULT_SECTION_LEVEL: u8 = 2;

/// Output of [`segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segmented {
    pub metadata: Metadata,
    pub sections: Vec<Section>,
}

/// Split raw markdown into front matter metadata and ordered sections.
///
/// `id` is only used to label structural errors.
///
/// # Errors
///
/// Returns [`CoreError::StructuralParse`] when a front matter block is
/// opened but never closed, or when a TOML block fails to parse.
pub fn segment(id: &str, text: &str, section_level: u8) -> Result<Segmented> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (metadata, body) = split_front_matter(id, text)?;
    let sections = split_sections(body, section_level.clamp(1, 6));
    Ok(Segmented { metadata, sections })
}

fn split_front_matter<'a>(id: &str, text: &'a str) -> Result<(Metadata, &'a str)> {
    let first_line_end = text.find('\n').unwrap_or(text.len());
    let opener = text[..first_line_end].trim_end_matches('\r').trim_end();

    let closers: &[&str] = match opener {
        "---" => &["---", "..."],
        "+++" => &["+++"],
        _ => return Ok((Metadata::new(), text)),
    };

    let rest_start = (first_line_end + 1).min(text.len());
    let rest = &text[rest_start..];

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']).trim_end();
        if closers.contains(&trimmed) {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let metadata = if opener == "+++" {
                parse_toml_block(id, block)?
            } else {
                parse_key_value_block(block)
            };
            return Ok((metadata, body));
        }
        offset += line.len();
    }

    Err(CoreError::parse(
        id,
        format!("front matter opened with '{}' is never closed", opener),
    ))
}

fn parse_key_value_block(block: &str) -> Metadata {
    let mut metadata = Metadata::new();
    let mut list_key: Option<String> = None;
    let mut list_items: Vec<String> = Vec::new();

    let flush = |metadata: &mut Metadata, key: &mut Option<String>, items: &mut Vec<String>| {
        if let Some(k) = key.take() {
            let value = if items.is_empty() {
                Scalar::Null
            } else {
                Scalar::String(items.join(", "))
            };
            metadata.insert(k, value);
            items.clear();
        }
    };

    for raw in block.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if list_key.is_some() {
                list_items.push(unquote(item.trim()).to_string());
            }
            continue;
        }

        flush(&mut metadata, &mut list_key, &mut list_items);

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.starts_with(char::is_whitespace) {
            continue;
        }
        let key = key.trim().to_string();
        let value = value.trim();
        if value.is_empty() {
            list_key = Some(key);
        } else {
            metadata.insert(key, parse_scalar(value));
        }
    }
    flush(&mut metadata, &mut list_key, &mut list_items);

    metadata
}

fn parse_scalar(value: &str) -> Scalar {
    match value {
        "true" | "True" | "yes" => return Scalar::Bool(true),
        "false" | "False" | "no" => return Scalar::Bool(false),
        "null" | "~" => return Scalar::Null,
        _ => {}
    }
    if let Ok(i) = value.parse::<i64>() {
        return Scalar::Number(i.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Scalar::Number(n);
        }
    }
    Scalar::String(unquote(value).to_string())
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_toml_block(id: &str, block: &str) -> Result<Metadata> {
    let table: toml::Table = block
        .parse()
        .map_err(|e| CoreError::parse(id, format!("invalid TOML front matter: {}", e)))?;

    Ok(table
        .into_iter()
        .map(|(k, v)| {
            let scalar = match v {
                toml::Value::String(s) => Scalar::String(s),
                toml::Value::Integer(i) => Scalar::Number(i.into()),
                toml::Value::Float(f) => serde_json::Number::from_f64(f)
                    .map(Scalar::Number)
                    .unwrap_or(Scalar::Null),
                toml::Value::Boolean(b) => Scalar::Bool(b),
                other => Scalar::String(other.to_string()),
            };
            (k, scalar)
        })
        .collect())
}

/// Parse an ATX heading line into `(level, text)`.
fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_end();
    let stripped = trimmed.trim_start_matches(' ');
    if trimmed.len() - stripped.len() > 3 {
        return None;
    }
    let hashes = stripped.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &stripped[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some((hashes as u8, text))
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn split_sections(body: &str, section_level: u8) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading = String::new();
    let mut level = 0u8;
    let mut buf: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
            buf.push(line);
            continue;
        }
        if !in_fence {
            if let Some((lvl, text)) = parse_heading(line) {
                if lvl <= section_level {
                    push_section(&mut sections, &heading, level, &buf);
                    heading = text.to_string();
                    level = lvl;
                    buf.clear();
                    continue;
                }
            }
        }
        buf.push(line);
    }
    push_section(&mut sections, &heading, level, &buf);

    if sections.is_empty() {
        sections.push(Section {
            heading: String::new(),
            level: 0,
            body: String::new(),
        });
    }
    sections
}

fn push_section(sections: &mut Vec<Section>, heading: &str, level: u8, buf: &[&str]) {
    let body = trim_blank_lines(buf);
    // An untitled preamble is only kept when it has content.
    if level == 0 && body.is_empty() {
        return;
    }
    sections.push(Section {
        heading: heading.to_string(),
        level,
        body,
    });
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}
