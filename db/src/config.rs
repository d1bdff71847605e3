//! Database configuration file.
//!
//! Names the directories and index files a [`DeviceDatabase`] works with.
//!
//! # Example YAML
//!
//! ```yaml
//! devices_dir: config/devices
//! priority_dir: /etc/devices.d
//! index_file: index.json
//! fulltext_index_file: fulltext_index.json
//! fail_on_error: true
//! ```
//!
//! Only `devices_dir` is required.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fs::LocalFileSystem;
use crate::index::{FULLTEXT_INDEX_FILE, FailurePolicy, INDEX_FILE, IndexBuilder};
use crate::loader::{DeviceDatabase, DeviceDatabaseBuilder};

fn default_index_file() -> String {
    INDEX_FILE.to_string()
}

fn default_fulltext_index_file() -> String {
    FULLTEXT_INDEX_FILE.to_string()
}

/// Locations and build policy of a device database.
///
/// # Examples
///
/// ```no_run
/// use device_config_db::DatabaseConfig;
///
/// let config = DatabaseConfig::load("devcfg.yml").unwrap();
/// let mut db = config.builder().build();
/// db.load_index().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root of the embedded database.
    pub devices_dir: PathBuf,
    /// User-supplied documents that win over embedded ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_dir: Option<PathBuf>,
    /// Compact index file name inside `devices_dir`.
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// Full-text index file name inside `devices_dir`.
    #[serde(default = "default_fulltext_index_file")]
    pub fulltext_index_file: String,
    /// Overrides the `CI`-based failure policy when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_error: Option<bool>,
}

impl DatabaseConfig {
    /// Configuration with default index names and no priority directory.
    pub fn new(devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            devices_dir: devices_dir.into(),
            priority_dir: None,
            index_file: default_index_file(),
            fulltext_index_file: default_fulltext_index_file(),
            fail_on_error: None,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.devices_dir.join(&self.index_file)
    }

    pub fn fulltext_index_path(&self) -> PathBuf {
        self.devices_dir.join(&self.fulltext_index_file)
    }

    /// `fail_on_error` if set, otherwise [`FailurePolicy::from_env`].
    pub fn failure_policy(&self) -> FailurePolicy {
        match self.fail_on_error {
            Some(fail_on_error) => FailurePolicy { fail_on_error },
            None => FailurePolicy::from_env(),
        }
    }

    /// An [`IndexBuilder`] over the local devices directory that skips the
    /// configured index files and honors the failure policy.
    pub fn index_builder(&self) -> IndexBuilder<'static> {
        IndexBuilder::new(&LocalFileSystem, &self.devices_dir)
            .with_failure_policy(self.failure_policy())
            .with_index_files([&self.index_file, &self.fulltext_index_file])
    }

    /// A [`DeviceDatabase`] builder set up from this configuration.
    pub fn builder(&self) -> DeviceDatabaseBuilder {
        let builder = DeviceDatabase::builder(&self.devices_dir)
            .index_file(&self.index_file)
            .fulltext_index_file(&self.fulltext_index_file)
            .failure_policy(self.failure_policy());
        match &self.priority_dir {
            Some(dir) => builder.priority_dir(dir),
            None => builder,
        }
    }
}
