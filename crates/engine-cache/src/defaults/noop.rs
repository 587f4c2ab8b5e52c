//! Pass-through engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::trace;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::definition::EngineSpec;
use crate::error::{RenderError, Result};
use crate::locals::Locals;

/// File contents read by [`noop`]'s `render_file` with `cache: true`.
static FILE_CACHE: Lazy<Mutex<HashMap<PathBuf, String>>> = Lazy::new(Default::default);

/// An engine that returns its input unchanged.
///
/// Its `render_file` (also used as the `express` view callback) reads the
/// file and returns the contents. With `cache: true` in the locals, file
/// contents are kept for the rest of the process.
///
/// Registered under `*` by [`EngineRegistry::init`](crate::EngineRegistry::init).
pub fn noop() -> EngineSpec {
    EngineSpec::new()
        .name("noop")
        .render(noop_render)
        .render_sync(noop_render_sync)
        .render_file(noop_render_file)
}

async fn noop_render(src: String, _locals: Locals) -> Result<String> {
    Ok(src)
}

fn noop_render_sync(src: &str, _locals: &Locals) -> Result<String> {
    Ok(src.to_string())
}

async fn noop_render_file(path: PathBuf, locals: Locals) -> Result<String> {
    let cache = matches!(locals.get("cache"), Some(Value::Bool(true)));
    read_file(&path, cache)
}

fn read_file(path: &Path, cache: bool) -> Result<String> {
    if cache {
        let files = FILE_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(content) = files.get(path) {
            trace!("file cache hit for {}", path.display());
            return Ok(content.clone());
        }
    }

    let content = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if cache {
        FILE_CACHE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), content.clone());
    }
    Ok(content)
}

/// Forgets every file cached by the noop engine.
pub fn clear_file_cache() {
    FILE_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
