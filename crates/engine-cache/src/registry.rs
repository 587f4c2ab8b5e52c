//! The engine registry.

use std::collections::HashMap;

use engine_cache_helpers::HelperStore;
use log::debug;
use serde_json::{Map, Value};

use crate::config::{DefaultEngine, RegistryConfig};
use crate::definition::RegistrationArg;
use crate::engine::{decorate, normalize, Engine};
use crate::error::{RenderError, Result};
use crate::util::{format_ext, WILDCARD};

/// Where a lookup landed.
enum Slot {
    Registered(String),
    Fallback,
}

/// Mapping from file extension to template engine.
///
/// Extensions are accepted with or without the leading dot and always stored
/// with it, so `"hbs"` and `".hbs"` name the same engine. Registering an
/// extension again replaces its engine entirely.
///
/// # Resolution Order
///
/// [`get`](Self::get) looks for:
///
/// 1. The engine registered under the extension
/// 2. The configured default engine, if any (see [`RegistryConfig`])
/// 3. The wildcard engine registered under `*`
///
/// # Thread Safety
///
/// Registration takes `&mut self`. To share a registry across threads, wrap
/// it in a lock; rendering only needs `&Engine`.
///
/// # Example
///
/// ```rust
/// use engine_cache::{EngineRegistry, EngineSpec, Locals};
///
/// fn shout(src: &str, _locals: &Locals) -> engine_cache::Result<String> {
///     Ok(src.to_uppercase())
/// }
///
/// let mut registry = EngineRegistry::new();
/// registry.register("txt", EngineSpec::new().render_sync(shout))?;
///
/// let engine = registry.get(".txt").unwrap();
/// assert_eq!(engine.name(), "shout");
/// assert_eq!(engine.render_sync("hi", Locals::new())?, "HI");
/// # Ok::<(), engine_cache::RenderError>(())
/// ```
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Engine>,
    config: RegistryConfig,
    fallback: Option<Engine>,
}

impl EngineRegistry {
    /// Creates an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled default engines.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.init()?;
        Ok(registry)
    }

    /// Creates an empty registry with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] if the configured default
    /// engine is a definition that fails validation.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        let fallback = match &config.default_engine {
            Some(DefaultEngine::Definition(definition)) => {
                Some(decorate(normalize(WILDCARD, definition.clone(), None)?))
            }
            Some(DefaultEngine::Extension(_)) | None => None,
        };

        Ok(Self {
            engines: HashMap::new(),
            config,
            fallback,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers the bundled default engines, replacing any engine already
    /// registered under their extensions.
    pub fn init(&mut self) -> Result<&mut Self> {
        for (ext, spec) in crate::defaults::engines() {
            self.insert(ext, spec.into(), None)?;
        }
        Ok(self)
    }

    /// Registers `definition` under `ext`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] if the extension is empty or
    /// the definition has neither `render` nor `render_sync`. The registry
    /// is left untouched on error.
    #[doc(alias = "setEngine")]
    pub fn register(
        &mut self,
        ext: &str,
        definition: impl Into<RegistrationArg>,
    ) -> Result<&mut Self> {
        self.insert(ext, definition.into(), None)
    }

    /// Registers an engine with registration options.
    ///
    /// The engine and the options may be passed in either order: when the
    /// second argument looks like an engine, the two are swapped. `null`
    /// options are treated as absent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use engine_cache::{EngineRegistry, EngineSpec, Locals};
    /// use serde_json::json;
    ///
    /// let spec = || EngineSpec::new().render_sync(|s: &str, _: &Locals| Ok(s.to_string()));
    ///
    /// let mut registry = EngineRegistry::new();
    /// registry
    ///     .register_with("a", spec(), json!({"cache": true}))?
    ///     .register_with("b", json!({"cache": true}), spec())?;
    ///
    /// assert_eq!(registry.get("a").unwrap().option("cache"), Some(&json!(true)));
    /// assert_eq!(registry.get("b").unwrap().option("cache"), Some(&json!(true)));
    /// # Ok::<(), engine_cache::RenderError>(())
    /// ```
    #[doc(alias = "setEngine")]
    pub fn register_with(
        &mut self,
        ext: &str,
        first: impl Into<RegistrationArg>,
        second: impl Into<RegistrationArg>,
    ) -> Result<&mut Self> {
        let (first, second) = (first.into(), second.into());
        let (definition, options) = if second.is_engine() {
            (second, first)
        } else {
            (first, second)
        };

        let options = match options {
            RegistrationArg::Options(map) => Some(map),
            RegistrationArg::Invalid(Value::Null) => None,
            RegistrationArg::Definition(_) | RegistrationArg::Invalid(_) => {
                return Err(RenderError::configuration(
                    format_ext(ext),
                    "expected options to be an object",
                ));
            }
        };

        self.insert(ext, definition, options)
    }

    fn insert(
        &mut self,
        ext: &str,
        definition: RegistrationArg,
        options: Option<Map<String, Value>>,
    ) -> Result<&mut Self> {
        let engine = decorate(normalize(ext, definition, options)?);
        debug!("registered engine \"{}\" for {}", engine.name(), engine.ext());
        self.engines.insert(engine.ext().to_string(), engine);
        Ok(self)
    }

    /// Registers every entry of `engines` in iteration order.
    ///
    /// Entries whose name is a reserved key (`clearCache` by default) are
    /// skipped. Every other entry is validated before any is stored, so a
    /// bad entry leaves the registry unchanged.
    pub fn load<I, K, V>(&mut self, engines: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RegistrationArg>,
    {
        let mut normalized = Vec::new();
        for (name, definition) in engines {
            let name = name.as_ref();
            if self.config.is_reserved(name) {
                debug!("skipping reserved key \"{}\"", name);
                continue;
            }
            normalized.push(normalize(name, definition, None)?);
        }

        for engine in normalized {
            let engine = decorate(engine);
            debug!("loaded engine \"{}\" for {}", engine.name(), engine.ext());
            self.engines.insert(engine.ext().to_string(), engine);
        }
        Ok(self)
    }

    fn slot(&self, ext: &str) -> Option<Slot> {
        if ext.is_empty() {
            return None;
        }

        let key = format_ext(ext);
        if self.engines.contains_key(&key) {
            return Some(Slot::Registered(key));
        }

        match &self.config.default_engine {
            Some(DefaultEngine::Extension(default)) => {
                let default = format_ext(default);
                if self.engines.contains_key(&default) {
                    debug!("no engine for {}, using default {}", key, default);
                    return Some(Slot::Registered(default));
                }
            }
            Some(DefaultEngine::Definition(_)) if self.fallback.is_some() => {
                debug!("no engine for {}, using configured default engine", key);
                return Some(Slot::Fallback);
            }
            _ => {}
        }

        let wildcard = format_ext(WILDCARD);
        if self.engines.contains_key(&wildcard) {
            debug!("no engine for {}, using {}", key, wildcard);
            return Some(Slot::Registered(wildcard));
        }
        None
    }

    /// Returns the engine for `ext`, falling back to the default engine and
    /// then to the wildcard engine. Returns `None` for an empty extension.
    #[doc(alias = "getEngine")]
    pub fn get(&self, ext: &str) -> Option<&Engine> {
        match self.slot(ext)? {
            Slot::Registered(key) => self.engines.get(&key),
            Slot::Fallback => self.fallback.as_ref(),
        }
    }

    /// Mutable form of [`get`](Self::get), with the same fallbacks.
    pub fn get_mut(&mut self, ext: &str) -> Option<&mut Engine> {
        match self.slot(ext)? {
            Slot::Registered(key) => self.engines.get_mut(&key),
            Slot::Fallback => self.fallback.as_mut(),
        }
    }

    /// Returns every registered engine keyed by extension.
    pub fn cache(&self) -> &HashMap<String, Engine> {
        &self.engines
    }

    /// Returns true if an engine is registered under exactly `ext`.
    pub fn contains(&self, ext: &str) -> bool {
        !ext.is_empty() && self.engines.contains_key(&format_ext(ext))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Removes the engine registered under `ext`. Fallbacks are not consulted.
    pub fn remove(&mut self, ext: &str) -> Option<Engine> {
        if ext.is_empty() {
            return None;
        }
        let removed = self.engines.remove(&format_ext(ext));
        if let Some(engine) = &removed {
            debug!("removed engine \"{}\" for {}", engine.name(), engine.ext());
        }
        removed
    }

    /// Removes every registered engine.
    pub fn clear(&mut self) {
        debug!("clearing {} engines", self.engines.len());
        self.engines.clear();
    }

    /// Returns the helpers of the engine resolved for `ext`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::EngineNotFound`] if no engine resolves.
    pub fn helpers(&self, ext: &str) -> Result<&HelperStore> {
        self.get(ext)
            .map(Engine::helpers)
            .ok_or_else(|| RenderError::EngineNotFound {
                ext: format_ext(ext),
            })
    }

    pub fn helpers_mut(&mut self, ext: &str) -> Result<&mut HelperStore> {
        let key = format_ext(ext);
        self.get_mut(ext)
            .map(Engine::helpers_mut)
            .ok_or(RenderError::EngineNotFound { ext: key })
    }
}
