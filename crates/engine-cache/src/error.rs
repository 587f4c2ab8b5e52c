//! Error types for engine registration and rendering.
//!
//! [`RenderError`] is the single error type returned by the registry, the
//! decorated engines and the bundled default engines. Errors raised by an
//! underlying template library travel through [`RenderError::Engine`]
//! unchanged, so their message is exactly what the library reported.

use std::path::PathBuf;

use engine_cache_helpers::HelperError;
use serde_json::Value;
use thiserror::Error;

/// Boxed error produced by an underlying template library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Error type for registry and rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The engine definition passed to registration is unusable.
    #[error("engine-cache cannot register \"{ext}\": {message}")]
    Configuration { ext: String, message: String },

    /// A method was called with arguments of the wrong shape.
    #[error("engine-cache \"{method}\" {message}")]
    Usage {
        method: &'static str,
        message: String,
    },

    /// No engine, default engine or wildcard engine matches the extension.
    #[error("engine-cache has no engine registered for \"{ext}\"")]
    EngineNotFound { ext: String },

    /// Error raised by the underlying template library, passed through as is.
    #[error(transparent)]
    Engine(BoxError),

    /// An async helper placeholder could not be resolved.
    #[error("failed to resolve async helper placeholder {token}: {source}")]
    Resolution {
        token: String,
        #[source]
        source: HelperError,
    },

    /// A template file could not be read.
    #[error("failed to read template \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry settings could not be parsed.
    #[error("invalid registry settings: {0}")]
    Settings(String),
}

impl RenderError {
    /// Wraps an error from an underlying template library.
    ///
    /// Plain strings work too: `RenderError::engine("name is not defined")`.
    pub fn engine(err: impl Into<BoxError>) -> Self {
        RenderError::Engine(err.into())
    }

    pub(crate) fn configuration(ext: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Configuration {
            ext: ext.into(),
            message: message.into(),
        }
    }

    pub(crate) fn usage(method: &'static str, message: impl Into<String>) -> Self {
        RenderError::Usage {
            method,
            message: message.into(),
        }
    }

    /// The usage error raised when `src` is neither text nor a compiled template.
    pub(crate) fn invalid_source(method: &'static str, value: &Value) -> Self {
        Self::usage(
            method,
            format!(
                "expected \"str\" to be a string or compiled function, got {}.",
                crate::util::value_kind(value)
            ),
        )
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Settings(err.to_string())
    }
}

impl From<serde_yaml::Error> for RenderError {
    fn from(err: serde_yaml::Error) -> Self {
        RenderError::Settings(err.to_string())
    }
}

#[cfg(feature = "minijinja")]
impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        RenderError::Engine(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_transparent() {
        let err = RenderError::engine("name is not defined");
        assert_eq!(err.to_string(), "name is not defined");
    }

    #[test]
    fn test_usage_error_names_method() {
        let err = RenderError::invalid_source("render", &Value::Null);
        assert_eq!(
            err.to_string(),
            "engine-cache \"render\" expected \"str\" to be a string or compiled function, got null."
        );
    }

    #[test]
    fn test_resolution_error_keeps_source() {
        use std::error::Error;

        let err = RenderError::Resolution {
            token: "__async_x_0__".into(),
            source: HelperError::failed("boom"),
        };
        assert!(err.to_string().contains("__async_x_0__"));
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{").unwrap_err();
        let err: RenderError = yaml_err.into();
        assert!(matches!(err, RenderError::Settings(_)));
    }

    #[cfg(feature = "minijinja")]
    #[test]
    fn test_from_minijinja_error() {
        let mj_err = minijinja::Error::new(minijinja::ErrorKind::SyntaxError, "unexpected end");
        let err: RenderError = mj_err.into();
        assert!(matches!(err, RenderError::Engine(_)));
        assert!(err.to_string().contains("unexpected end"));
    }
}
