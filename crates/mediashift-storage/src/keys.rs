//! Content-addressed key generation.

/// Destination key for an asset: `{hash}{ext}`.
///
/// A missing leading dot on `ext` is added; an empty extension yields the bare hash.
pub fn asset_key(hash: &str, ext: &str) -> String {
    let ext = ext.trim();
    if ext.is_empty() || ext.starts_with('.') {
        format!("{}{}", hash, ext)
    } else {
        format!("{}.{}", hash, ext)
    }
}
