use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

static NAMESPACE_PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn namespace_prefix_re() -> &'static Regex {
    NAMESPACE_PREFIX_RE.get_or_init(|| {
        Regex::new(r"(?i)<namespacePrefix>(.*?)</namespacePrefix>")
            .expect("namespacePrefix pattern is valid")
    })
}

/// Reads the namespace prefix out of a `package.xml` style project descriptor.
///
/// A missing or unreadable descriptor is the unmanaged (default) namespace and
/// resolves to an empty string.
pub fn resolve_namespace(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => namespace_from_descriptor(&String::from_utf8_lossy(&bytes)),
        Err(_) => String::new(),
    }
}

pub fn namespace_from_descriptor(content: &str) -> String {
    namespace_prefix_re()
        .captures(content)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
