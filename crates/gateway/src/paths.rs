use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;

/// Joins a client-supplied relative path onto `root`.
///
/// Absolute paths and `..` components are rejected outright rather than
/// normalised, so the result can never name anything outside `root`.
pub(crate) fn resolve_relative(root: &Path, raw: &str) -> Result<PathBuf, ApiError> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ApiError::bad_request(format!(
                    "path {raw:?} must not contain '..'"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ApiError::bad_request(format!(
                    "path {raw:?} must be relative to the work directory"
                )));
            }
        }
    }
    Ok(resolved)
}

/// Like [`resolve_relative`] but refuses paths that resolve to `root` itself.
pub(crate) fn resolve_entry(root: &Path, raw: &str) -> Result<PathBuf, ApiError> {
    let resolved = resolve_relative(root, raw)?;
    if resolved == root {
        return Err(ApiError::bad_request("path must name an entry"));
    }
    Ok(resolved)
}

/// Workspace and template names are a single visible path segment.
pub(crate) fn validate_entry_name(kind: &str, name: &str) -> Result<(), ApiError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == name && !name.starts_with('.') =>
        {
            Ok(())
        }
        _ => Err(ApiError::bad_request(format!(
            "invalid {kind} name {name:?}"
        ))),
    }
}
