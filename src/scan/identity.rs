/// Identity keys for logical subjects across image sets
///
/// An identity is the set-relative directory (separators flattened to `_`)
/// joined with the file stem once the set suffix is stripped. Files sitting
/// directly in the set root keep just the stripped stem.

use std::path::Path;

/// Derive the identity of `path` inside the set rooted at `root`.
///
/// Returns `None` when `suffix` is non-empty and the stem does not end with it,
/// which is how interleaved outputs of several runs share one directory.
pub fn identity_for(root: &Path, path: &Path, suffix: &str) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();

    let name = if suffix.is_empty() {
        stem.as_ref()
    } else {
        stem.strip_suffix(suffix)?
    };

    let relative_dir = path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|dir| dir.to_string_lossy().replace(['/', '\\'], "_"))
        .unwrap_or_default();

    if relative_dir.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{}_{}", relative_dir, name))
    }
}
