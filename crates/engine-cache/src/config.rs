//! Registry configuration.
//!
//! [`RegistryConfig`] is built in code and may carry a literal engine
//! definition as the default engine. [`RegistrySettings`] is its
//! serializable subset, read from YAML or JSON:
//!
//! ```yaml
//! default_engine: html
//! reserved_keys: [clearCache, __meta]
//! defaults: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::definition::{EngineDefinition, EngineSpec};
use crate::error::{RenderError, Result};
use crate::registry::EngineRegistry;

/// Key skipped by [`EngineRegistry::load`] unless configured otherwise.
pub const CLEAR_CACHE_KEY: &str = "clearCache";

/// Engine used when a lookup finds nothing under the requested extension.
#[derive(Clone, Debug)]
pub enum DefaultEngine {
    /// Use whatever engine is registered under this extension.
    Extension(String),
    /// Use this engine, kept outside the registry's mapping.
    Definition(EngineDefinition),
}

impl From<&str> for DefaultEngine {
    fn from(ext: &str) -> Self {
        DefaultEngine::Extension(ext.to_string())
    }
}

impl From<String> for DefaultEngine {
    fn from(ext: String) -> Self {
        DefaultEngine::Extension(ext)
    }
}

impl From<EngineDefinition> for DefaultEngine {
    fn from(definition: EngineDefinition) -> Self {
        DefaultEngine::Definition(definition)
    }
}

impl From<EngineSpec> for DefaultEngine {
    fn from(spec: EngineSpec) -> Self {
        DefaultEngine::Definition(EngineDefinition::Spec(spec))
    }
}

/// Configuration passed to [`EngineRegistry::with_config`].
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub default_engine: Option<DefaultEngine>,
    /// Entry names [`EngineRegistry::load`] treats as metadata.
    pub reserved_keys: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_engine: None,
            reserved_keys: vec![CLEAR_CACHE_KEY.to_string()],
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_engine(mut self, engine: impl Into<DefaultEngine>) -> Self {
        self.default_engine = Some(engine.into());
        self
    }

    pub fn reserved_key(mut self, key: impl Into<String>) -> Self {
        self.reserved_keys.push(key.into());
        self
    }

    /// Replaces the reserved keys, including the default `clearCache`.
    pub fn reserved_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_keys.iter().any(|reserved| reserved == key)
    }
}

fn default_reserved_keys() -> Vec<String> {
    vec![CLEAR_CACHE_KEY.to_string()]
}

fn default_true() -> bool {
    true
}

/// Registry settings as stored in a configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Extension of the engine used as the default engine.
    #[serde(default)]
    pub default_engine: Option<String>,

    #[serde(default = "default_reserved_keys")]
    pub reserved_keys: Vec<String>,

    /// Register the bundled default engines.
    #[serde(default = "default_true")]
    pub defaults: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_engine: None,
            reserved_keys: default_reserved_keys(),
            defaults: true,
        }
    }
}

impl RegistrySettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads settings from a file, picking the format from its extension.
    ///
    /// `.json` files are parsed as JSON; anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig {
            default_engine: self.default_engine.clone().map(DefaultEngine::Extension),
            reserved_keys: self.reserved_keys.clone(),
        }
    }
}

impl From<RegistrySettings> for RegistryConfig {
    fn from(settings: RegistrySettings) -> Self {
        settings.to_config()
    }
}

impl EngineRegistry {
    /// Builds a registry from file settings, registering the bundled
    /// engines when `settings.defaults` is set.
    pub fn from_settings(settings: &RegistrySettings) -> Result<Self> {
        let mut registry = Self::with_config(settings.to_config())?;
        if settings.defaults {
            registry.init()?;
        }
        Ok(registry)
    }
}
