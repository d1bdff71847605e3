//! Template resolution, index caching and lookup for device configuration
//! databases.
//!
//! A database is a directory tree of JSON5 device documents plus shared
//! fragments under `templates/`. This crate inlines `$import` directives,
//! maintains a persisted index of every document and answers lookups by
//! device identity.
//!
//! # Quick start
//!
//! ```no_run
//! use device_config_core::DeviceId;
//! use device_config_db::DeviceDatabase;
//!
//! let mut db = DeviceDatabase::builder("config/devices").build();
//! db.load_index().unwrap();
//!
//! let device = DeviceId::new(0x0086, 0x0002, 0x0064).with_firmware("1.10");
//! if let Some(config) = db.lookup_device(&device).unwrap() {
//!     println!("{} has {} parameters", config.label, config.param_information.len());
//! }
//! ```
//!
//! Lower-level building blocks are public too: [`ImportResolver`] for
//! resolving a single document, [`IndexBuilder`] for index maintenance and
//! [`find_overlaps`] for consistency checks.
//!
//! # Environment
//!
//! - **`CI`**: when set, a document that fails to load aborts an index
//!   rebuild instead of being logged and skipped.

mod config;
mod document;
mod error;
mod fs;
mod import;
mod index;
mod loader;
mod validate;

pub use config::DatabaseConfig;
pub use document::{load_device_config, relative_filename};
pub use error::{DatabaseError, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use import::{IMPORT_KEY, ImportResolver, ImportSpecifier, ROOT_MARKER, TemplateCache};
pub use index::{
    FULLTEXT_INDEX_FILE, FailurePolicy, FulltextIndexEntry, INDEX_BANNER, INDEX_FILE,
    IndexBuilder, IndexEntry, IndexFlavor, IndexState, LoadedIndex, load_or_rebuild, search,
};
pub use loader::{DeviceDatabase, DeviceDatabaseBuilder};
pub use validate::{Overlap, find_overlaps};
