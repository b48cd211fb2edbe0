//! The permanent template registry: six JSON documents under `REGISTRY_DIR`
//!
//! Each document holds one container object keyed by template id, e.g.
//! `templates.json` is `{"templates": {"drake": {...}}}`.

use crate::types::{TemplateEntry, TextPosition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Templates,
    Prompts,
    OutputModels,
    Renderers,
    Generators,
    Bindings,
}

impl Artifact {
    pub const ALL: [Artifact; 6] = [
        Artifact::Templates,
        Artifact::Prompts,
        Artifact::OutputModels,
        Artifact::Renderers,
        Artifact::Generators,
        Artifact::Bindings,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Templates => "templates.json",
            Artifact::Prompts => "prompts.json",
            Artifact::OutputModels => "output_models.json",
            Artifact::Renderers => "renderers.json",
            Artifact::Generators => "generators.json",
            Artifact::Bindings => "pipeline.json",
        }
    }

    /// Top-level key of the object entries are inserted into
    pub fn container_key(&self) -> &'static str {
        match self {
            Artifact::Templates => "templates",
            Artifact::Prompts => "prompts",
            Artifact::OutputModels => "output_models",
            Artifact::Renderers => "renderers",
            Artifact::Generators => "generators",
            Artifact::Bindings => "bindings",
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("{path} is not valid JSON: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{path} has no '{key}' object")]
    MissingContainer { path: PathBuf, key: &'static str },
}

/// Where each slot's text is drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererLayout {
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    pub slots: BTreeMap<String, TextPosition>,
}

fn default_font_size() -> u32 {
    32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorEntry {
    pub function: String,
    pub slots: Vec<String>,
}

/// Loaded registry contents
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateEntry>,
    prompts: BTreeMap<String, String>,
    output_models: BTreeMap<String, Value>,
    renderers: BTreeMap<String, RendererLayout>,
    generators: BTreeMap<String, GeneratorEntry>,
    bindings: BTreeMap<String, Value>,
}

/// Create any missing registry document with an empty container
pub fn init_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for artifact in Artifact::ALL {
        let path = dir.join(artifact.file_name());
        if !path.exists() {
            let mut doc = Map::new();
            doc.insert(artifact.container_key().to_string(), Value::Object(Map::new()));
            std::fs::write(&path, serde_json::to_string_pretty(&Value::Object(doc)).unwrap_or_default())?;
        }
    }
    Ok(())
}

/// Read one document's container object. A missing file reads as empty.
pub fn read_container(dir: &Path, artifact: Artifact) -> Result<Map<String, Value>, RegistryError> {
    let path = dir.join(artifact.file_name());
    if !path.exists() {
        return Ok(Map::new());
    }
    let text = std::fs::read_to_string(&path).map_err(|e| RegistryError::Read {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let mut doc: Value = serde_json::from_str(&text).map_err(|e| RegistryError::Parse {
        path: path.clone(),
        message: e.to_string(),
    })?;
    match doc.get_mut(artifact.container_key()).map(Value::take) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(RegistryError::MissingContainer {
            path,
            key: artifact.container_key(),
        }),
    }
}

fn typed<T: serde::de::DeserializeOwned>(artifact: Artifact, map: Map<String, Value>) -> BTreeMap<String, T> {
    map.into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(v) => Some((id, v)),
            Err(e) => {
                warn!("[Registry] Skipping {} entry '{}': {}", artifact.file_name(), id, e);
                None
            }
        })
        .collect()
}

impl TemplateRegistry {
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let mut templates: BTreeMap<String, TemplateEntry> = typed(Artifact::Templates, read_container(dir, Artifact::Templates)?);
        templates.retain(|id, entry| {
            let ok = entry.is_consistent() && entry.id == *id;
            if !ok {
                warn!("[Registry] Skipping inconsistent template '{}'", id);
            }
            ok
        });

        let registry = Self {
            templates,
            prompts: typed(Artifact::Prompts, read_container(dir, Artifact::Prompts)?),
            output_models: read_container(dir, Artifact::OutputModels)?.into_iter().collect(),
            renderers: typed(Artifact::Renderers, read_container(dir, Artifact::Renderers)?),
            generators: typed(Artifact::Generators, read_container(dir, Artifact::Generators)?),
            bindings: read_container(dir, Artifact::Bindings)?.into_iter().collect(),
        };
        info!("[Registry] Loaded {} templates from {}", registry.templates.len(), dir.display());
        Ok(registry)
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateEntry> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TemplateEntry> {
        self.templates.get(id)
    }

    pub fn prompt(&self, id: &str) -> Option<&str> {
        self.prompts.get(id).map(String::as_str)
    }

    pub fn layout(&self, id: &str) -> Option<&RendererLayout> {
        self.renderers.get(id)
    }

    pub fn generator(&self, id: &str) -> Option<&GeneratorEntry> {
        self.generators.get(id)
    }

    pub fn binding(&self, id: &str) -> Option<&Value> {
        self.bindings.get(id)
    }

    /// Stored schema when it requires exactly the template's slots, otherwise one built from the entry
    pub fn output_schema(&self, entry: &TemplateEntry) -> Value {
        match self.output_models.get(&entry.id) {
            Some(schema) if required_fields(schema) == entry.slot_names.iter().cloned().collect::<BTreeSet<String>>() => {
                schema.clone()
            }
            Some(_) => {
                warn!("[Registry] Stored schema for '{}' does not match its slots, rebuilding", entry.id);
                build_output_schema(entry)
            }
            None => build_output_schema(entry),
        }
    }

    /// A template other than `id` whose image is stored as `filename`
    pub fn image_owner(&self, filename: &str, id: &str) -> Option<&TemplateEntry> {
        self.templates.values().find(|t| t.id != id && t.filename == filename)
    }

    /// Templates that can be both generated and rendered
    pub fn usable(&self) -> Vec<&TemplateEntry> {
        self.templates
            .values()
            .filter(|t| self.layout(&t.id).is_some_and(|l| t.slot_names.iter().all(|s| l.slots.contains_key(s))))
            .collect()
    }
}

fn required_fields(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Per-meme output schema: one required string per slot plus optional reasoning
pub fn build_output_schema(entry: &TemplateEntry) -> Value {
    let mut properties = Map::new();
    for slot in &entry.slot_names {
        properties.insert(
            slot.clone(),
            json!({"type": "string", "maxLength": entry.max_chars_per_slot}),
        );
    }
    properties.insert(
        "reasoning".into(),
        json!({"type": "string", "description": "Why this text fits the template's irony"}),
    );
    json!({
        "type": "object",
        "properties": properties,
        "required": entry.slot_names,
        "additionalProperties": false
    })
}
