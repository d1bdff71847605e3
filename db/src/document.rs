//! Loading a single device document: read, resolve imports, parse.

use std::path::Path;

use device_config_core::ConditionalDeviceConfig;

use crate::error::Result;
use crate::import::ImportResolver;

/// Returns `path` relative to `root` with `/` separators, or the full path
/// if it is not below `root`.
pub fn relative_filename(root: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves and parses the document at `path`.
///
/// Error messages name the document relative to `root_dir`.
///
/// # Errors
///
/// Propagates resolution errors from [`ImportResolver::resolve`] and the
/// [`Invalid`](device_config_core::ConfigError::Invalid) errors of
/// [`ConditionalDeviceConfig::parse`].
pub fn load_device_config(
    resolver: &ImportResolver<'_>,
    root_dir: &Path,
    path: &Path,
    is_embedded: bool,
) -> Result<ConditionalDeviceConfig> {
    let document = resolver.resolve(path)?;
    let filename = relative_filename(root_dir, path);
    Ok(ConditionalDeviceConfig::parse(&filename, &document, is_embedded)?)
}
