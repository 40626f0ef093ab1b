//! Structured editing of the workflow document that declares the mapping.
//!
//! The mapping sits under `jobs.<job>.steps[<n>].with.<key>`, either as an
//! inline YAML string (usually a block scalar) or as a YAML sequence. Only that
//! node is replaced; the rest of the document is re-serialized as parsed, with
//! key order intact. Comments do not survive the round trip.

use std::path::{Path, PathBuf};

use serde_yaml_ng::Value;
use tracing::{debug, info, warn};

use crate::errors::{ConfigError, CoreError, MappingError};
use crate::mapping::{self, MappingList};

pub const DEFAULT_CONFIG_PATH: &str = ".github/workflows/sync-openapi.yml";

/// Input names that may carry the mapping, in lookup order.
pub const DEFAULT_MAPPING_KEYS: &[&str] = &["openapi", "files", "sources"];

/// Where the mapping node was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingLocation {
    pub job: String,
    pub step: usize,
    pub key: String,
}

impl std::fmt::Display for MappingLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "jobs.{}.steps[{}].with.{}", self.job, self.step, self.key)
    }
}

/// A parsed workflow document with a located mapping node.
#[derive(Debug)]
pub struct ConfigDocument {
    path: PathBuf,
    doc: Value,
    location: MappingLocation,
}

impl ConfigDocument {
    /// Read and parse `path`, locating the first step input named by `keys`.
    pub fn load(path: &Path, keys: &[String]) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text, keys)
    }

    pub fn parse(path: &Path, text: &str, keys: &[String]) -> Result<Self, ConfigError> {
        let doc: Value =
            serde_yaml_ng::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let location = locate(&doc, keys).ok_or_else(|| ConfigError::MissingMappingBlock {
            path: path.display().to_string(),
            keys: keys.join(", "),
        })?;
        debug!(path = %path.display(), %location, "located mapping block");
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            location,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn location(&self) -> &MappingLocation {
        &self.location
    }

    fn node(&self) -> Option<&Value> {
        self.doc
            .get("jobs")?
            .get(self.location.job.as_str())?
            .get("steps")?
            .get(self.location.step)?
            .get("with")?
            .get(self.location.key.as_str())
    }

    fn node_mut(&mut self) -> Option<&mut Value> {
        self.doc
            .get_mut("jobs")?
            .get_mut(self.location.job.as_str())?
            .get_mut("steps")?
            .get_mut(self.location.step)?
            .get_mut("with")?
            .get_mut(self.location.key.as_str())
    }

    /// Decode the mapping node.
    pub fn mappings(&self) -> Result<MappingList, MappingError> {
        match self.node() {
            Some(Value::String(text)) => mapping::parse_mapping(text),
            Some(node @ Value::Sequence(_)) => {
                let value =
                    serde_json::to_value(node).map_err(|e| MappingError::Parse(e.to_string()))?;
                mapping::mapping_from_value(value)
            }
            _ => Err(MappingError::NotASequence),
        }
    }

    /// Replace the mapping node, keeping its shape (string or sequence).
    pub fn replace_mappings(&mut self, list: &MappingList) -> Result<(), MappingError> {
        if list.is_empty() {
            warn!(location = %self.location, "every mapping was removed; writing an empty list");
        }
        let inline = matches!(self.node(), Some(Value::String(_)));
        let replacement = if inline {
            Value::String(list.to_yaml()?)
        } else {
            list.to_yaml_value()?
        };
        match self.node_mut() {
            Some(node) => {
                *node = replacement;
                Ok(())
            }
            None => Err(MappingError::NotASequence),
        }
    }

    pub fn render(&self) -> Result<String, ConfigError> {
        serde_yaml_ng::to_string(&self.doc).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Write the document back to where it was loaded from.
    pub fn save(&self) -> Result<String, CoreError> {
        let text = self.render()?;
        std::fs::write(&self.path, &text).map_err(ConfigError::IoError)?;
        info!(path = %self.path.display(), "wrote updated config document");
        Ok(text)
    }
}

fn locate(doc: &Value, keys: &[String]) -> Option<MappingLocation> {
    let jobs = doc.get("jobs")?.as_mapping()?;
    for (job_name, job) in jobs {
        let Some(job_name) = job_name.as_str() else { continue };
        let Some(steps) = job.get("steps").and_then(Value::as_sequence) else {
            continue;
        };
        for (index, step) in steps.iter().enumerate() {
            let Some(with) = step.get("with") else { continue };
            if let Some(key) = keys.iter().find(|k| with.get(k.as_str()).is_some()) {
                return Some(MappingLocation {
                    job: job_name.to_string(),
                    step: index,
                    key: key.clone(),
                });
            }
        }
    }
    None
}
