//! File-system capability used by the resolver and the index builder.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// The file operations the database needs.
///
/// Implementations must be usable from several threads at once because
/// index rebuilds resolve documents in parallel.
pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Last modification time of a file or directory.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn exists(&self, path: &Path) -> bool;

    /// Every file and directory below `root`, recursively, `root` excluded.
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            out.push(entry?.into_path());
        }
        out.sort();
        Ok(out)
    }
}
