//! `ContentTypeRegistry` capability.

/// Resolves a concrete MIME type for a file extension, and answers whether a
/// concrete type satisfies a (possibly wildcard) allowed-type pattern such as
/// `text/*` or `*/json`.
pub trait ContentTypeRegistry: Send + Sync {
    /// The concrete MIME type registered for `extension` (without the dot),
    /// if any.
    fn type_for_extension(&self, extension: &str) -> Option<String>;

    /// Resolve `allowed` (which may contain a single `*` on either side of
    /// the `/`) against `extension`, returning the concrete type if the
    /// extension's registered type matches the pattern.
    fn resolve_allowed(&self, allowed: &str, extension: &str) -> Option<String> {
        let concrete = self.type_for_extension(extension)?;
        if content_type_matches(allowed, &concrete) {
            Some(concrete)
        } else {
            None
        }
    }
}

/// `true` iff `concrete` (e.g. `text/html`) satisfies `pattern` (e.g.
/// `text/*`, `*/html`, `*/*`, or an exact match).
pub fn content_type_matches(pattern: &str, concrete: &str) -> bool {
    if pattern == "*/*" || pattern == concrete {
        return true;
    }
    let (Some((p_type, p_sub)), Some((c_type, c_sub))) = (split_once_slash(pattern), split_once_slash(concrete))
    else {
        return false;
    };
    (p_type == "*" || p_type.eq_ignore_ascii_case(c_type))
        && (p_sub == "*" || p_sub.eq_ignore_ascii_case(c_sub))
}

fn split_once_slash(s: &str) -> Option<(&str, &str)> {
    s.split_once('/')
}

/// A small static registry keyed by file extension, sufficient for serving
/// the common static-content types.
#[derive(Debug, Clone, Default)]
pub struct StaticContentTypeRegistry {
    extra: std::collections::HashMap<String, String>,
}

impl StaticContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: impl Into<String>, mime_type: impl Into<String>) {
        self.extra.insert(extension.into(), mime_type.into());
    }
}

impl ContentTypeRegistry for StaticContentTypeRegistry {
    fn type_for_extension(&self, extension: &str) -> Option<String> {
        if let Some(t) = self.extra.get(extension) {
            return Some(t.clone());
        }
        let builtin = match extension.to_ascii_lowercase().as_str() {
            "html" | "htm" => "text/html",
            "txt" => "text/plain",
            "css" => "text/css",
            "csv" => "text/csv",
            "js" | "mjs" => "text/javascript",
            "json" => "application/json",
            "xml" => "application/xml",
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "ico" => "image/x-icon",
            "wasm" => "application/wasm",
            "bin" | "" => "application/octet-stream",
            _ => return None,
        };
        Some(builtin.to_string())
    }
}
