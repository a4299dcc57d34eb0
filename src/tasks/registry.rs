//! Tool catalog: loading, lookup and sampling of tool definitions.

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_version() -> String {
    "v1".to_string()
}

/// A callable tool definition: name, description and a JSON-schema parameter
/// object. Serialized with a qualified `name@version` so multiple versions of
/// the same tool can coexist in one catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments (`{"type": "object", ...}`).
    pub parameters: Value,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl ToolSpec {
    /// Create a tool spec with the default version and no category.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            version: default_version(),
            category: None,
        }
    }

    /// The qualified name used on the wire and in expected-tool lists.
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Wire representation embedded in prompts and exported samples.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "name": self.qualified_name(),
            "description": self.description,
            "parameters": self.parameters,
        })
    }

    /// Check that the parameter schema is a well-formed object schema.
    pub fn has_valid_schema(&self) -> bool {
        let Some(obj) = self.parameters.as_object() else {
            return false;
        };
        obj.get("type").and_then(Value::as_str) == Some("object")
            && obj.get("properties").map(Value::is_object).unwrap_or(false)
    }
}

/// Errors that can occur while loading a tool catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(String),

    #[error("Catalog must be a JSON array or an object with a 'tools' array")]
    InvalidFormat,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory tool catalog with lookup by qualified name and random sampling.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file.
    ///
    /// Accepts either a bare array of tool objects or `{"tools": [...]}`.
    /// Entries with a malformed parameter schema are skipped with a warning
    /// rather than failing the whole load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;

        let entries = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("tools") {
                Some(Value::Array(items)) => items,
                _ => return Err(CatalogError::InvalidFormat),
            },
            _ => return Err(CatalogError::InvalidFormat),
        };

        let mut registry = Self::new();
        for entry in entries {
            match serde_json::from_value::<ToolSpec>(entry) {
                Ok(tool) if tool.has_valid_schema() => registry.register(tool),
                Ok(tool) => {
                    tracing::warn!(tool = %tool.name, "Skipping tool with invalid parameter schema");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed tool entry");
                }
            }
        }

        tracing::info!(count = registry.len(), path = %path.display(), "Loaded tool catalog");
        Ok(registry)
    }

    /// Add a tool to the registry. Later registrations of the same qualified
    /// name replace earlier ones.
    pub fn register(&mut self, tool: ToolSpec) {
        let key = tool.qualified_name();
        if let Some(&idx) = self.by_name.get(&key) {
            self.tools[idx] = tool;
        } else {
            self.by_name.insert(key, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name and version.
    pub fn get(&self, name: &str, version: &str) -> Option<&ToolSpec> {
        self.by_name
            .get(&format!("{}@{}", name, version))
            .map(|&idx| &self.tools[idx])
    }

    /// Sample up to `n` distinct tools, optionally restricted to a category.
    pub fn sample(&self, n: usize, category: Option<&str>, rng: &mut StdRng) -> Vec<ToolSpec> {
        let candidates: Vec<&ToolSpec> = self
            .tools
            .iter()
            .filter(|t| category.map_or(true, |c| t.category.as_deref() == Some(c)))
            .collect();

        candidates
            .choose_multiple(rng, n.min(candidates.len()))
            .map(|t| (*t).clone())
            .collect()
    }

    /// All tools in registration order.
    pub fn all(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
