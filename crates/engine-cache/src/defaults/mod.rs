//! Bundled engine definitions.
//!
//! | Function | Engine |
//! |----------|--------|
//! | [`noop`] | Returns templates unchanged; registered under `*` by [`EngineRegistry::init`](crate::EngineRegistry::init) |
//! | [`base`] | `<%= expr %>` interpolation with helper calls |
//! | [`minijinja()`] | MiniJinja, behind the `minijinja` feature |

mod base;
#[cfg(feature = "minijinja")]
mod jinja;
mod noop;

pub use base::base;
#[cfg(feature = "minijinja")]
pub use jinja::{minijinja, MiniJinjaEngine};
pub use noop::{clear_file_cache, noop};

use crate::definition::EngineSpec;
use crate::util::WILDCARD;

/// The engines registered by [`EngineRegistry::init`](crate::EngineRegistry::init).
pub fn engines() -> Vec<(&'static str, EngineSpec)> {
    vec![(WILDCARD, noop())]
}
