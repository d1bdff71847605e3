//! Device index: a flat, persisted summary of every document.
//!
//! The index lets lookups find the right document for a device without
//! parsing the whole database. It is rebuilt whenever the index file is
//! missing, cannot be parsed, or is older than any file or directory below
//! the devices directory.
//!
//! Two flavors share the builder: [`IndexEntry`] for identity lookups and
//! [`FulltextIndexEntry`], which also carries the texts needed by
//! [`search`].
//!
//! # Examples
//!
//! ```no_run
//! use device_config_db::{IndexEntry, load_or_rebuild};
//!
//! let entries: Vec<IndexEntry> =
//!     load_or_rebuild("config/devices", "config/devices/index.json").unwrap();
//! println!("{} devices indexed", entries.len());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use device_config_core::{
    DeviceConfig, DeviceId, FirmwareVersion, format_id, hex_id,
};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{load_device_config, relative_filename};
use crate::error::Result;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::import::{ImportResolver, TemplateCache};

/// Default name of the compact index inside the devices directory.
pub const INDEX_FILE: &str = "index.json";

/// Default name of the full-text index.
pub const FULLTEXT_INDEX_FILE: &str = "fulltext_index.json";

/// First line of every generated index file.
pub const INDEX_BANNER: &str =
    "// This file is auto-generated. DO NOT edit it by hand if you don't know what you're doing!";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Compact index entry: identity, firmware range and file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(with = "hex_id")]
    pub manufacturer_id: u16,
    #[serde(with = "hex_id")]
    pub product_type: u16,
    #[serde(with = "hex_id")]
    pub product_id: u16,
    pub firmware_version: FirmwareVersion,
    #[serde(default, skip_serializing_if = "is_false")]
    pub preferred: bool,
    /// Document path relative to its root, with `/` separators.
    pub filename: String,
    /// Root directory the entry was indexed from. Not persisted.
    #[serde(skip)]
    pub root_dir: Option<PathBuf>,
}

impl IndexEntry {
    /// Manufacturer and product identity match, firmware not checked.
    pub fn matches_identity(&self, device: &DeviceId) -> bool {
        self.manufacturer_id == device.manufacturer_id
            && self.product_type == device.product_type
            && self.product_id == device.product_id
    }

    /// Full lookup predicate. Without a firmware version only the identity
    /// is compared; with one, the entry's range must contain it.
    pub fn matches(&self, device: &DeviceId) -> bool {
        self.matches_identity(device)
            && device
                .firmware_version
                .as_deref()
                .is_none_or(|version| self.firmware_version.contains(version))
    }

    /// Absolute path of the document, if the root is known.
    pub fn path(&self) -> Option<PathBuf> {
        self.root_dir.as_ref().map(|root| root.join(&self.filename))
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} [{}] {}",
            format_id(self.manufacturer_id),
            format_id(self.product_type),
            format_id(self.product_id),
            self.firmware_version,
            self.filename
        )
    }
}

/// Index entry used for full-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulltextIndexEntry {
    pub manufacturer: String,
    #[serde(with = "hex_id")]
    pub manufacturer_id: u16,
    pub label: String,
    pub description: String,
    #[serde(with = "hex_id")]
    pub product_type: u16,
    #[serde(with = "hex_id")]
    pub product_id: u16,
    pub firmware_version: FirmwareVersion,
    #[serde(default, skip_serializing_if = "is_false")]
    pub preferred: bool,
    pub filename: String,
    #[serde(skip)]
    pub root_dir: Option<PathBuf>,
}

/// Which fields an index copies out of an evaluated document.
pub trait IndexFlavor: Serialize + DeserializeOwned + Clone + Send {
    /// One entry per device declared by `config`.
    fn extract_entries(config: &DeviceConfig, filename: &str, root_dir: &Path) -> Vec<Self>;

    /// Restores the root directory, which is not persisted.
    fn set_root_dir(&mut self, root_dir: &Path);
}

impl IndexFlavor for IndexEntry {
    fn extract_entries(config: &DeviceConfig, filename: &str, root_dir: &Path) -> Vec<Self> {
        config
            .devices
            .iter()
            .map(|device| IndexEntry {
                manufacturer_id: config.manufacturer_id,
                product_type: device.product_type,
                product_id: device.product_id,
                firmware_version: config.firmware_version.clone(),
                preferred: config.preferred,
                filename: filename.to_string(),
                root_dir: Some(root_dir.to_path_buf()),
            })
            .collect()
    }

    fn set_root_dir(&mut self, root_dir: &Path) {
        self.root_dir = Some(root_dir.to_path_buf());
    }
}

impl IndexFlavor for FulltextIndexEntry {
    fn extract_entries(config: &DeviceConfig, filename: &str, root_dir: &Path) -> Vec<Self> {
        config
            .devices
            .iter()
            .map(|device| FulltextIndexEntry {
                manufacturer: config.manufacturer.clone(),
                manufacturer_id: config.manufacturer_id,
                label: config.label.clone(),
                description: config.description.clone(),
                product_type: device.product_type,
                product_id: device.product_id,
                firmware_version: config.firmware_version.clone(),
                preferred: config.preferred,
                filename: filename.to_string(),
                root_dir: Some(root_dir.to_path_buf()),
            })
            .collect()
    }

    fn set_root_dir(&mut self, root_dir: &Path) {
        self.root_dir = Some(root_dir.to_path_buf());
    }
}

/// What to do with a document that fails to load during a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Abort the whole build instead of logging and skipping.
    pub fail_on_error: bool,
}

impl FailurePolicy {
    /// Log and skip broken documents.
    pub fn skip() -> Self {
        Self {
            fail_on_error: false,
        }
    }

    /// Abort on the first broken document.
    pub fn fail_fast() -> Self {
        Self {
            fail_on_error: true,
        }
    }

    /// Fails fast when the `CI` environment variable is set.
    pub fn from_env() -> Self {
        Self {
            fail_on_error: std::env::var_os("CI").is_some(),
        }
    }
}

/// State of an index file relative to the documents it summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Missing,
    Malformed,
    Stale,
    Fresh,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexState::Missing => "missing",
            IndexState::Malformed => "malformed",
            IndexState::Stale => "stale",
            IndexState::Fresh => "fresh",
        };
        f.write_str(name)
    }
}

/// Entries returned by [`IndexBuilder::load`] plus the state the index was
/// found in. Anything but [`IndexState::Fresh`] means it was rebuilt.
#[derive(Debug, Clone)]
pub struct LoadedIndex<E> {
    pub entries: Vec<E>,
    pub state: IndexState,
}

/// Builds, persists and refreshes index files for one devices directory.
pub struct IndexBuilder<'a> {
    fs: &'a dyn FileSystem,
    devices_dir: PathBuf,
    cache: Option<&'a TemplateCache>,
    policy: FailurePolicy,
    is_embedded: bool,
    index_files: Vec<String>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(fs: &'a dyn FileSystem, devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            devices_dir: devices_dir.into(),
            cache: None,
            policy: FailurePolicy::from_env(),
            is_embedded: true,
            index_files: vec![INDEX_FILE.to_string(), FULLTEXT_INDEX_FILE.to_string()],
        }
    }

    pub fn with_cache(mut self, cache: &'a TemplateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// File names treated as index files rather than documents. Defaults to
    /// [`INDEX_FILE`] and [`FULLTEXT_INDEX_FILE`].
    pub fn with_index_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_files = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_index_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.index_files.iter().any(|index| index == name))
    }

    /// Marks the documents as user-supplied rather than embedded.
    pub fn user_supplied(mut self) -> Self {
        self.is_embedded = false;
        self
    }

    pub fn devices_dir(&self) -> &Path {
        &self.devices_dir
    }

    fn resolver(&self) -> ImportResolver<'a> {
        let resolver = ImportResolver::new(self.fs).with_root_dir(&self.devices_dir);
        match self.cache {
            Some(cache) => resolver.with_cache(cache),
            None => resolver,
        }
    }

    /// Every indexable document: `*.json` files outside `templates`
    /// directories, index files excluded. Sorted by relative filename.
    pub fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .fs
            .walk(&self.devices_dir)?
            .into_iter()
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter(|path| !self.is_index_file(path))
            .filter(|path| {
                let relative = path.strip_prefix(&self.devices_dir).unwrap_or(path);
                !TemplateCache::is_template_path(relative)
            })
            .collect();
        paths.sort_by_cached_key(|path| relative_filename(&self.devices_dir, path));
        Ok(paths)
    }

    /// Loads, evaluates with no device identity, and indexes every document.
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::fail_on_error`] set, the first broken document
    /// (in filename order) aborts the build. Otherwise broken documents are
    /// logged and skipped, and only listing the directory can fail.
    pub fn build<E: IndexFlavor>(&self) -> Result<Vec<E>> {
        let paths = self.document_paths()?;
        debug!(dir = %self.devices_dir.display(), documents = paths.len(), "indexing");

        let results: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let filename = relative_filename(&self.devices_dir, path);
                let entries = load_device_config(&self.resolver(), &self.devices_dir, path, self.is_embedded)
                    .and_then(|config| config.evaluate(None).map_err(Into::into))
                    .map(|config| E::extract_entries(&config, &filename, &self.devices_dir));
                (filename, entries)
            })
            .collect();

        let mut entries = Vec::new();
        for (filename, result) in results {
            match result {
                Ok(found) => entries.extend(found),
                Err(err) if self.policy.fail_on_error => return Err(err),
                Err(err) => {
                    warn!(file = %filename, error = %err, "skipping device document that failed to load");
                }
            }
        }
        Ok(entries)
    }

    /// Returns `true` if any file or directory below the devices directory,
    /// index files excluded, is newer than `index_path`.
    pub fn is_stale(&self, index_path: &Path) -> Result<bool> {
        let index_modified = self.fs.modified(index_path)?;
        for path in self.fs.walk(&self.devices_dir)? {
            if path == index_path || self.is_index_file(&path) {
                continue;
            }
            if self.fs.modified(&path)? > index_modified {
                debug!(file = %path.display(), "newer than the index");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads an index file written by [`write_index`](Self::write_index).
    pub fn read_index<E: IndexFlavor>(&self, index_path: &Path) -> Result<Vec<E>> {
        let text = self.fs.read_to_string(index_path)?;
        Ok(json5::from_str(&text)?)
    }

    /// Writes `entries` after the auto-generation banner.
    pub fn write_index<E: IndexFlavor>(&self, index_path: &Path, entries: &[E]) -> Result<()> {
        let body = serde_json::to_string_pretty(entries)?;
        self.fs
            .write(index_path, &format!("{INDEX_BANNER}\n{body}\n"))?;
        Ok(())
    }

    /// Classifies `index_path` without rebuilding it.
    pub fn state<E: IndexFlavor>(&self, index_path: &Path) -> Result<IndexState> {
        if !self.fs.exists(index_path) {
            return Ok(IndexState::Missing);
        }
        if self.read_index::<E>(index_path).is_err() {
            return Ok(IndexState::Malformed);
        }
        if self.is_stale(index_path)? {
            return Ok(IndexState::Stale);
        }
        Ok(IndexState::Fresh)
    }

    /// Rebuilds and writes the index regardless of its state.
    pub fn rebuild<E: IndexFlavor>(&self, index_path: &Path) -> Result<Vec<E>> {
        let entries = self.build::<E>()?;
        self.write_index(index_path, &entries)?;
        info!(index = %index_path.display(), entries = entries.len(), "device index written");
        Ok(entries)
    }

    /// Returns the persisted index if it is fresh, otherwise rebuilds it.
    pub fn load<E: IndexFlavor>(&self, index_path: &Path) -> Result<LoadedIndex<E>> {
        let state = if !self.fs.exists(index_path) {
            IndexState::Missing
        } else {
            match self.read_index::<E>(index_path) {
                Err(err) => {
                    debug!(index = %index_path.display(), error = %err, "index unreadable");
                    IndexState::Malformed
                }
                Ok(mut entries) => {
                    if !self.is_stale(index_path)? {
                        debug!(index = %index_path.display(), entries = entries.len(), "index is fresh");
                        for entry in &mut entries {
                            entry.set_root_dir(&self.devices_dir);
                        }
                        return Ok(LoadedIndex {
                            entries,
                            state: IndexState::Fresh,
                        });
                    }
                    IndexState::Stale
                }
            }
        };

        info!(index = %index_path.display(), reason = %state, "rebuilding device index");
        let entries = self.rebuild(index_path)?;
        Ok(LoadedIndex { entries, state })
    }
}

/// Loads the index at `index_path`, rebuilding it from `devices_dir` when
/// it is missing, malformed or stale.
///
/// Uses the local file system and [`FailurePolicy::from_env`].
pub fn load_or_rebuild<E: IndexFlavor>(
    devices_dir: impl AsRef<Path>,
    index_path: impl AsRef<Path>,
) -> Result<Vec<E>> {
    let builder = IndexBuilder::new(&LocalFileSystem, devices_dir.as_ref());
    Ok(builder.load::<E>(index_path.as_ref())?.entries)
}

/// Case-insensitive search over labels, descriptions, manufacturers and
/// formatted ids. Every whitespace-separated term must match.
pub fn search<'e>(entries: &'e [FulltextIndexEntry], query: &str) -> Vec<&'e FulltextIndexEntry> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Vec::new();
    }
    entries
        .iter()
        .filter(|entry| {
            let haystack = format!(
                "{} {} {} {} {} {} {}",
                entry.manufacturer,
                entry.label,
                entry.description,
                format_id(entry.manufacturer_id),
                format_id(entry.product_type),
                format_id(entry.product_id),
                entry.filename
            )
            .to_lowercase();
            terms.iter().all(|term| haystack.contains(term.as_str()))
        })
        .collect()
}
