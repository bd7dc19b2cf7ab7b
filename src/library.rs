//! Image library references.

/// Scheme prefix of a library reference.
pub const LIBRARY_SCHEME: &str = "library://";

/// Tag used when a reference names none.
pub const DEFAULT_TAG: &str = "latest";

/// Strip the `library://` scheme and add `:latest` when no tag is given.
///
/// `library://alpine` becomes `alpine:latest`; `user/repo/img:3.18` is
/// returned as-is.
pub fn normalize_library_ref(reference: &str) -> String {
    let stripped = reference.strip_prefix(LIBRARY_SCHEME).unwrap_or(reference);
    if stripped.contains(':') {
        stripped.to_string()
    } else {
        format!("{stripped}:{DEFAULT_TAG}")
    }
}
