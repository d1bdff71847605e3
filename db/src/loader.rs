//! Device lookup over an embedded database and an optional priority
//! directory.
//!
//! Provides [`DeviceDatabase`] for identity lookups and
//! [`DeviceDatabaseBuilder`] for wiring its directories, failure policy and
//! template cache.
//!
//! # Loading patterns
//!
//! ```no_run
//! use device_config_db::{DeviceDatabase, FailurePolicy};
//! use device_config_core::DeviceId;
//!
//! let mut db = DeviceDatabase::builder("config/devices")
//!     .priority_dir("/etc/devices.d")
//!     .failure_policy(FailurePolicy::skip())
//!     .build();
//! db.load_index().unwrap();
//!
//! let device = DeviceId::new(0x0086, 0x0002, 0x0064).with_firmware("1.10");
//! if let Some(config) = db.lookup_device(&device).unwrap() {
//!     println!("{} {}", config.manufacturer, config.label);
//! }
//! ```
//!
//! Documents in the priority directory are indexed in memory on every load
//! and always win over embedded documents for the same device.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use device_config_core::{ConfigError, DeviceConfig, DeviceId};
use tracing::debug;

use crate::document::load_device_config;
use crate::error::{DatabaseError, Result};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::import::{ImportResolver, TemplateCache};
use crate::index::{
    FULLTEXT_INDEX_FILE, FailurePolicy, FulltextIndexEntry, INDEX_FILE, IndexBuilder, IndexEntry,
    IndexFlavor, IndexState, search,
};
use crate::validate::{Overlap, find_overlaps};

/// Entries of one index flavor, split by origin.
#[derive(Debug, Clone)]
struct Entries<E> {
    priority: Vec<E>,
    embedded: Vec<E>,
}

impl<E> Entries<E> {
    fn iter(&self) -> impl Iterator<Item = &E> {
        self.priority.iter().chain(&self.embedded)
    }
}

/// Picks the preferred match if there is one, otherwise the first match.
/// Priority entries are considered before embedded ones.
fn pick<'e>(
    entries: &'e Entries<IndexEntry>,
    predicate: impl Fn(&IndexEntry) -> bool,
) -> Option<&'e IndexEntry> {
    [&entries.priority, &entries.embedded]
        .into_iter()
        .find_map(|group| {
            let mut matches = group.iter().filter(|entry| predicate(entry));
            let first = matches.next()?;
            if first.preferred {
                return Some(first);
            }
            Some(matches.find(|entry| entry.preferred).unwrap_or(first))
        })
}

fn not_loaded(what: &str) -> DatabaseError {
    ConfigError::NotLoaded(format!("the {what} has not been loaded")).into()
}

/// Device configuration database with lookup by device identity.
pub struct DeviceDatabase {
    fs: Box<dyn FileSystem>,
    devices_dir: PathBuf,
    priority_dir: Option<PathBuf>,
    index_file: String,
    fulltext_index_file: String,
    policy: FailurePolicy,
    cache: Arc<TemplateCache>,
    index: Option<Entries<IndexEntry>>,
    fulltext: Option<Entries<FulltextIndexEntry>>,
}

impl fmt::Debug for DeviceDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDatabase")
            .field("devices_dir", &self.devices_dir)
            .field("priority_dir", &self.priority_dir)
            .field("policy", &self.policy)
            .field("index_loaded", &self.index.is_some())
            .field("fulltext_loaded", &self.fulltext.is_some())
            .finish_non_exhaustive()
    }
}

impl DeviceDatabase {
    /// Returns a new [`DeviceDatabaseBuilder`] for the embedded database at
    /// `devices_dir`.
    pub fn builder(devices_dir: impl Into<PathBuf>) -> DeviceDatabaseBuilder {
        DeviceDatabaseBuilder::new(devices_dir)
    }

    pub fn devices_dir(&self) -> &Path {
        &self.devices_dir
    }

    pub fn priority_dir(&self) -> Option<&Path> {
        self.priority_dir.as_deref()
    }

    pub fn index_path(&self) -> PathBuf {
        self.devices_dir.join(&self.index_file)
    }

    pub fn fulltext_index_path(&self) -> PathBuf {
        self.devices_dir.join(&self.fulltext_index_file)
    }

    /// The template cache shared by all lookups and index builds.
    pub fn template_cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    fn index_builder(&self, dir: &Path) -> IndexBuilder<'_> {
        IndexBuilder::new(self.fs.as_ref(), dir)
            .with_cache(&self.cache)
            .with_failure_policy(self.policy)
            .with_index_files([&self.index_file, &self.fulltext_index_file])
    }

    fn load_entries<E: IndexFlavor>(&self, index_path: &Path) -> Result<(Entries<E>, IndexState)> {
        let loaded = self.index_builder(&self.devices_dir).load::<E>(index_path)?;
        let priority = match &self.priority_dir {
            Some(dir) if self.fs.exists(dir) => {
                self.index_builder(dir).user_supplied().build::<E>()?
            }
            Some(dir) => {
                debug!(dir = %dir.display(), "priority directory does not exist");
                Vec::new()
            }
            None => Vec::new(),
        };
        Ok((
            Entries {
                priority,
                embedded: loaded.entries,
            },
            loaded.state,
        ))
    }

    /// Loads the compact index, rebuilding it if needed, and indexes the
    /// priority directory. Returns the state the persisted index was in.
    pub fn load_index(&mut self) -> Result<IndexState> {
        let (entries, state) = self.load_entries::<IndexEntry>(&self.index_path())?;
        debug!(
            priority = entries.priority.len(),
            embedded = entries.embedded.len(),
            "device index loaded"
        );
        self.index = Some(entries);
        Ok(state)
    }

    /// Like [`load_index`](Self::load_index) for the full-text index.
    pub fn load_fulltext_index(&mut self) -> Result<IndexState> {
        let (entries, state) = self.load_entries::<FulltextIndexEntry>(&self.fulltext_index_path())?;
        self.fulltext = Some(entries);
        Ok(state)
    }

    /// State of the persisted compact index, without rebuilding it.
    pub fn index_state(&self) -> Result<IndexState> {
        self.index_builder(&self.devices_dir)
            .state::<IndexEntry>(&self.index_path())
    }

    /// Every loaded entry, priority entries first.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotLoaded`] before [`load_index`](Self::load_index).
    pub fn entries(&self) -> Result<impl Iterator<Item = &IndexEntry>> {
        Ok(self.index.as_ref().ok_or_else(|| not_loaded("device index"))?.iter())
    }

    /// Finds the index entry for `device`.
    ///
    /// With a firmware version the entry's range must contain it; without
    /// one any entry for the identity matches. Priority entries are searched
    /// first and a `preferred` entry wins over other matches.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotLoaded`] before [`load_index`](Self::load_index).
    pub fn find(&self, device: &DeviceId) -> Result<Option<&IndexEntry>> {
        let entries = self.index.as_ref().ok_or_else(|| not_loaded("device index"))?;
        Ok(pick(entries, |entry| entry.matches(device)))
    }

    /// Finds the entry for `device` that has no firmware dimension. The
    /// device's firmware version, if any, is ignored.
    pub fn find_unversioned(&self, device: &DeviceId) -> Result<Option<&IndexEntry>> {
        let entries = self.index.as_ref().ok_or_else(|| not_loaded("device index"))?;
        Ok(pick(entries, |entry| {
            entry.firmware_version.is_unversioned() && entry.matches_identity(device)
        }))
    }

    /// Resolves and evaluates the document behind `entry` for `device`.
    pub fn load_entry(&self, entry: &IndexEntry, device: &DeviceId) -> Result<DeviceConfig> {
        let root = entry.root_dir.as_deref().unwrap_or(&self.devices_dir);
        let path = root.join(&entry.filename);
        let resolver = ImportResolver::new(self.fs.as_ref())
            .with_root_dir(root)
            .with_cache(&self.cache);
        let is_embedded = root == self.devices_dir.as_path();
        let config = load_device_config(&resolver, root, &path, is_embedded)?;
        debug!(device = %device, file = %entry.filename, "evaluating device document");
        Ok(config.evaluate(Some(device))?)
    }

    /// Looks up `device` and returns its evaluated configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotLoaded`] before [`load_index`](Self::load_index),
    /// and any error from resolving or evaluating the matching document.
    pub fn lookup_device(&self, device: &DeviceId) -> Result<Option<DeviceConfig>> {
        match self.find(device)? {
            Some(entry) => self.load_entry(entry, device).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`lookup_device`](Self::lookup_device), restricted to documents
    /// without a firmware dimension.
    pub fn lookup_unversioned(&self, device: &DeviceId) -> Result<Option<DeviceConfig>> {
        match self.find_unversioned(device)? {
            Some(entry) => self.load_entry(entry, device).map(Some),
            None => Ok(None),
        }
    }

    /// Full-text search over labels, descriptions and manufacturers.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotLoaded`] before
    /// [`load_fulltext_index`](Self::load_fulltext_index).
    pub fn search(&self, query: &str) -> Result<Vec<&FulltextIndexEntry>> {
        let entries = self
            .fulltext
            .as_ref()
            .ok_or_else(|| not_loaded("full-text index"))?;
        let mut hits = search(&entries.priority, query);
        hits.extend(search(&entries.embedded, query));
        Ok(hits)
    }

    /// Embedded entries that claim the same device for overlapping firmware.
    pub fn overlaps(&self) -> Result<Vec<Overlap>> {
        let entries = self.index.as_ref().ok_or_else(|| not_loaded("device index"))?;
        Ok(find_overlaps(&entries.embedded))
    }
}

/// Builder for a [`DeviceDatabase`].
///
/// # Example
///
/// ```no_run
/// use device_config_db::{DeviceDatabase, TemplateCache};
/// use std::sync::Arc;
///
/// let cache = Arc::new(TemplateCache::new());
/// let db = DeviceDatabase::builder("/opt/devices")
///     .template_cache(cache.clone())
///     .build();
/// ```
pub struct DeviceDatabaseBuilder {
    fs: Box<dyn FileSystem>,
    devices_dir: PathBuf,
    priority_dir: Option<PathBuf>,
    index_file: String,
    fulltext_index_file: String,
    policy: FailurePolicy,
    cache: Option<Arc<TemplateCache>>,
}

impl DeviceDatabaseBuilder {
    /// Creates a builder using the local file system, default index file
    /// names and [`FailurePolicy::from_env`].
    pub fn new(devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs: Box::new(LocalFileSystem),
            devices_dir: devices_dir.into(),
            priority_dir: None,
            index_file: INDEX_FILE.to_string(),
            fulltext_index_file: FULLTEXT_INDEX_FILE.to_string(),
            policy: FailurePolicy::from_env(),
            cache: None,
        }
    }

    /// User-supplied documents that take precedence over embedded ones.
    pub fn priority_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.priority_dir = Some(dir.into());
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shares a template cache with other databases or resolvers.
    pub fn template_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = name.into();
        self
    }

    pub fn fulltext_index_file(mut self, name: impl Into<String>) -> Self {
        self.fulltext_index_file = name.into();
        self
    }

    pub fn file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    /// Creates the database. Nothing is read until
    /// [`DeviceDatabase::load_index`] is called.
    pub fn build(self) -> DeviceDatabase {
        DeviceDatabase {
            fs: self.fs,
            devices_dir: self.devices_dir,
            priority_dir: self.priority_dir,
            index_file: self.index_file,
            fulltext_index_file: self.fulltext_index_file,
            policy: self.policy,
            cache: self.cache.unwrap_or_default(),
            index: None,
            fulltext: None,
        }
    }
}
