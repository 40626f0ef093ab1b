//! Mapping payload decoding.
//!
//! A mapping payload is a YAML (or JSON) sequence of entries, each declaring a
//! path to copy from the source checkout into the target repository:
//!
//! ```yaml
//! - source: specs/openapi.yml
//!   destination: fern/openapi.yml
//! - from: docs/
//!   to: fern/docs/
//!   exclude:
//!     - docs/drafts/**
//! ```
//!
//! Both key vocabularies are accepted. The vocabulary of the first entry is
//! remembered so the list can be written back the way the author wrote it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::MappingError;

/// A declared `(source, destination)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub source: String,
    pub destination: String,
    /// Glob patterns, matched against paths relative to the source root.
    pub exclude: Vec<String>,
}

impl MappingEntry {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, patterns: &[&str]) -> Self {
        self.exclude = patterns.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Which key names the payload used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStyle {
    /// `source` / `destination`
    #[default]
    SourceDestination,
    /// `from` / `to`
    FromTo,
}

/// An ordered list of mapping entries plus the key style it was written in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingList {
    pub entries: Vec<MappingEntry>,
    pub style: KeyStyle,
}

impl MappingList {
    pub fn new(entries: Vec<MappingEntry>, style: KeyStyle) -> Self {
        Self { entries, style }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source paths in declaration order.
    pub fn tracked_paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.source.as_str()).collect()
    }

    /// Serialize to a YAML sequence using the list's key style.
    pub fn to_yaml(&self) -> Result<String, MappingError> {
        let value = self.to_yaml_value()?;
        serde_yaml_ng::to_string(&value).map_err(|e| MappingError::Serialize(e.to_string()))
    }

    /// Serialize to a YAML value using the list's key style.
    pub fn to_yaml_value(&self) -> Result<serde_yaml_ng::Value, MappingError> {
        let result = match self.style {
            KeyStyle::SourceDestination => {
                let rows: Vec<SourceDestinationRow<'_>> = self
                    .entries
                    .iter()
                    .map(|e| SourceDestinationRow {
                        source: &e.source,
                        destination: &e.destination,
                        exclude: &e.exclude,
                    })
                    .collect();
                serde_yaml_ng::to_value(rows)
            }
            KeyStyle::FromTo => {
                let rows: Vec<FromToRow<'_>> = self
                    .entries
                    .iter()
                    .map(|e| FromToRow {
                        from: &e.source,
                        to: &e.destination,
                        exclude: &e.exclude,
                    })
                    .collect();
                serde_yaml_ng::to_value(rows)
            }
        };
        result.map_err(|e| MappingError::Serialize(e.to_string()))
    }
}

#[derive(Serialize)]
struct SourceDestinationRow<'a> {
    source: &'a str,
    destination: &'a str,
    #[serde(skip_serializing_if = "no_patterns")]
    exclude: &'a [String],
}

#[derive(Serialize)]
struct FromToRow<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "no_patterns")]
    exclude: &'a [String],
}

fn no_patterns(patterns: &&[String]) -> bool {
    patterns.is_empty()
}

/// Raw element shape accepted from either vocabulary.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    source: Option<String>,
    destination: Option<String>,
    from: Option<String>,
    to: Option<String>,
    exclude: Option<Vec<String>>,
}

/// Decode and validate a mapping payload.
///
/// YAML is tried first, JSON second. Either the whole list is valid or the
/// call fails; no entry is accepted on its own.
pub fn parse_mapping(text: &str) -> Result<MappingList, MappingError> {
    let value = decode_with_fallback(
        text,
        |t| serde_yaml_ng::from_str::<serde_json::Value>(t).map_err(|e| e.to_string()),
        |t| serde_json::from_str::<serde_json::Value>(t).map_err(|e| e.to_string()),
    )?;
    mapping_from_value(value)
}

/// Validate an already-decoded value as a mapping list.
pub fn mapping_from_value(value: serde_json::Value) -> Result<MappingList, MappingError> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => return Err(MappingError::NotASequence),
    };
    if items.is_empty() {
        return Err(MappingError::Empty);
    }

    let mut style = KeyStyle::SourceDestination;
    let mut entries = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            return Err(MappingError::InvalidEntry {
                index,
                detail: "expected a mapping with 'source' and 'destination'".into(),
            });
        }
        let raw: RawEntry = serde_json::from_value(item).map_err(|e| MappingError::InvalidEntry {
            index,
            detail: e.to_string(),
        })?;

        let uses_from_to = raw.from.is_some() || raw.to.is_some();
        if index == 0 && uses_from_to {
            style = KeyStyle::FromTo;
        }

        let source = raw.source.or(raw.from).filter(|s| !s.trim().is_empty());
        let destination = raw.destination.or(raw.to).filter(|s| !s.trim().is_empty());
        match (source, destination) {
            (Some(source), Some(destination)) => entries.push(MappingEntry {
                source,
                destination,
                exclude: raw.exclude.unwrap_or_default(),
            }),
            _ => {
                let fields = if uses_from_to {
                    "'from' or 'to'"
                } else {
                    "'source' or 'destination'"
                };
                return Err(MappingError::InvalidEntry {
                    index,
                    detail: format!("missing required {} field", fields),
                });
            }
        }
    }

    debug!(count = entries.len(), style = ?style, "parsed mapping");
    Ok(MappingList { entries, style })
}

/// Run `primary`, then `fallback` on failure. When both fail the primary
/// decoder's message is reported.
fn decode_with_fallback<T>(
    text: &str,
    primary: impl FnOnce(&str) -> Result<T, String>,
    fallback: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, MappingError> {
    match primary(text) {
        Ok(value) => Ok(value),
        Err(primary_err) => {
            debug!(error = %primary_err, "YAML decode failed, trying JSON");
            fallback(text).map_err(|_| MappingError::Parse(primary_err))
        }
    }
}
