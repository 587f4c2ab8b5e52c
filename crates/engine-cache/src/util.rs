//! Extension formatting and small type helpers.

use serde_json::Value;

/// Extension under which the catch-all engine is registered.
pub const WILDCARD: &str = "*";

/// Prefixes `ext` with a dot unless it already starts with one.
///
/// ```rust
/// use engine_cache::util::format_ext;
///
/// assert_eq!(format_ext("hbs"), ".hbs");
/// assert_eq!(format_ext(".hbs"), ".hbs");
/// assert_eq!(format_ext(""), "");
/// ```
pub fn format_ext(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Removes a single leading dot from `ext`.
pub fn strip_ext(ext: &str) -> &str {
    ext.strip_prefix('.').unwrap_or(ext)
}

/// Returns the name of the function type `F`, or `None` for closures.
///
/// Function items report their path through [`std::any::type_name`]; the
/// last segment is the function's own name.
pub(crate) fn function_name<F>() -> Option<String> {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") || full.contains('<') {
        return None;
    }
    full.rsplit("::")
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Describes the JSON type of `value` for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
