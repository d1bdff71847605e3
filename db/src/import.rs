//! `$import` resolution.
//!
//! Any object in a document may contain an `$import` key naming another
//! document, optionally narrowed by a `#`-prefixed selector:
//!
//! ```text
//! { "$import": "templates/master.json#base_enable_disable" }
//! { "$import": "~/templates/master.json#paramInformation/1[0x01]" }
//! { "$import": "#paramInformation/3" }
//! ```
//!
//! The imported object is spread into the importing one at the position of
//! the `$import` key: keys written before it are overwritten, keys written
//! after it win. Paths starting with `~/` are relative to the database
//! root, all others to the importing file. A selector without a path refers
//! to the importing file itself.
//!
//! # Examples
//!
//! ```no_run
//! use device_config_db::{ImportResolver, LocalFileSystem, TemplateCache};
//!
//! let cache = TemplateCache::new();
//! let resolver = ImportResolver::new(&LocalFileSystem)
//!     .with_root_dir("config/devices")
//!     .with_cache(&cache);
//! let document = resolver.resolve("config/devices/0x0086/zw100.json").unwrap();
//! println!("{}", serde_json::to_string_pretty(&document).unwrap());
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

use device_config_core::ConfigError;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DatabaseError, Result};
use crate::fs::FileSystem;

/// Key that triggers an import.
pub const IMPORT_KEY: &str = "$import";

/// Prefix of root-relative import paths.
pub const ROOT_MARKER: &str = "~/";

static SPECIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<filename>(?:~/)?[\w/\\._-]+\.json)?(?:#(?<selector>[\w/._-]+(?:\[0x[0-9a-fA-F]+\])?)?)?$",
    )
    .expect("static regex must compile")
});

/// A parsed import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    /// Target file, or `None` for the importing file itself.
    pub filename: Option<String>,
    /// Slash-separated path into the target, or `None` for the whole file.
    pub selector: Option<String>,
}

impl ImportSpecifier {
    /// Parses a specifier like `"master.json#params/1"`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `text` does not match the
    /// specifier grammar.
    pub fn parse(text: &str) -> std::result::Result<Self, ConfigError> {
        let caps = SPECIFIER_RE
            .captures(text)
            .filter(|_| !text.is_empty())
            .ok_or_else(|| ConfigError::Invalid(format!("import specifier \"{text}\" is invalid")))?;
        Ok(Self {
            filename: caps.name("filename").map(|m| m.as_str().to_string()),
            selector: caps
                .name("selector")
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn is_root_relative(&self) -> bool {
        self.filename
            .as_deref()
            .is_some_and(|f| f.starts_with(ROOT_MARKER))
    }
}

/// Cross-pass cache of parsed template files.
///
/// Only files below a `templates` directory are kept, which is where
/// fragments shared by many documents live. Safe to share between threads;
/// concurrent inserts of the same path store identical values.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<PathBuf, Arc<Value>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Value>> {
        self.entries.read().ok()?.get(path).cloned()
    }

    pub fn insert(&self, path: PathBuf, value: Arc<Value>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Returns `true` if `path` belongs in the cache.
    pub fn is_template_path(path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "templates"))
    }
}

/// Resolves `$import` directives in device documents.
pub struct ImportResolver<'a> {
    fs: &'a dyn FileSystem,
    root_dirs: Vec<PathBuf>,
    cache: Option<&'a TemplateCache>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            root_dirs: Vec::new(),
            cache: None,
        }
    }

    /// Adds a database root. Root-relative imports resolve against the
    /// root containing the importing file, and nothing outside the roots
    /// may be imported.
    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dirs.push(normalize(&dir.into()));
        self
    }

    pub fn with_root_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.root_dirs
            .extend(dirs.into_iter().map(|d| normalize(&d.into())));
        self
    }

    pub fn with_cache(mut self, cache: &'a TemplateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Reads `path` and returns it with every import inlined.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if the file or an import target is missing.
    /// - [`ConfigError::Invalid`] for malformed JSON, a bad specifier, a
    ///   selector that does not end at an object, or a path outside the roots.
    /// - [`ConfigError::CircularImport`] if an import leads back to a
    ///   file and selector already being resolved.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = normalize(path.as_ref());
        self.check_inside_roots(&path)?;
        let mut pass = Pass {
            resolver: self,
            files: HashMap::new(),
            stack: Vec::new(),
        };
        let resolved = pass.resolve_file(&path, None)?;

        if let Some(cache) = self.cache {
            for (file, value) in pass.files {
                if TemplateCache::is_template_path(&file) {
                    cache.insert(file, value);
                }
            }
        }
        Ok(resolved)
    }

    fn check_inside_roots(&self, path: &Path) -> Result<()> {
        if !self.root_dirs.is_empty() && !self.root_dirs.iter().any(|root| path.starts_with(root)) {
            return Err(ConfigError::Invalid(format!(
                "{} is outside of the configured root directories",
                path.display()
            ))
            .into());
        }
        Ok(())
    }

    fn target_path(&self, importer: &Path, filename: &str) -> Result<PathBuf> {
        let target = if let Some(rest) = filename.strip_prefix(ROOT_MARKER) {
            let root = self
                .root_dirs
                .iter()
                .find(|root| importer.starts_with(root))
                .or_else(|| self.root_dirs.first())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "{}: root-relative import \"{filename}\" needs a root directory",
                        importer.display()
                    ))
                })?;
            root.join(rest)
        } else {
            importer
                .parent()
                .map(|dir| dir.join(filename))
                .unwrap_or_else(|| PathBuf::from(filename))
        };
        let target = normalize(&target);
        self.check_inside_roots(&target)?;
        Ok(target)
    }
}

/// State of one resolution: the files read so far and the import stack.
struct Pass<'r, 'a> {
    resolver: &'r ImportResolver<'a>,
    files: HashMap<PathBuf, Arc<Value>>,
    stack: Vec<String>,
}

impl Pass<'_, '_> {
    fn read(&mut self, path: &Path) -> Result<Arc<Value>> {
        if let Some(value) = self.files.get(path) {
            return Ok(Arc::clone(value));
        }
        if let Some(value) = self.resolver.cache.and_then(|cache| cache.get(path)) {
            debug!(file = %path.display(), "template cache hit");
            self.files.insert(path.to_path_buf(), Arc::clone(&value));
            return Ok(value);
        }

        let text = self.resolver.fs.read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                DatabaseError::from(ConfigError::NotFound(format!("{} does not exist", path.display())))
            }
            _ => DatabaseError::from(err),
        })?;
        let value: Value = json5::from_str(&text).map_err(|err| {
            ConfigError::Invalid(format!("{}: could not parse JSON: {err}", path.display()))
        })?;
        let value = Arc::new(value);
        self.files.insert(path.to_path_buf(), Arc::clone(&value));
        Ok(value)
    }

    fn resolve_file(&mut self, path: &Path, selector: Option<&str>) -> Result<Value> {
        let key = match selector {
            Some(selector) => format!("{}#{selector}", path.display()),
            None => path.display().to_string(),
        };
        if self.stack.contains(&key) {
            let mut chain = self.stack.clone();
            chain.push(key);
            return Err(ConfigError::CircularImport(format!(
                "circular import detected: {}",
                chain.join(" -> ")
            ))
            .into());
        }
        debug!(import = %key, depth = self.stack.len(), "resolving");
        self.stack.push(key);

        let document = self.read(path)?;
        let target = select(path, &document, selector)?;
        let resolved = self.walk(path, target)?;

        self.stack.pop();
        Ok(resolved)
    }

    fn walk(&mut self, file: &Path, value: &Value) -> Result<Value> {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    if key == IMPORT_KEY {
                        let imported = self.import(file, item)?;
                        for (imported_key, imported_value) in imported {
                            out.insert(imported_key, imported_value);
                        }
                    } else {
                        out.insert(key.clone(), self.walk(file, item)?);
                    }
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(file, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn import(&mut self, file: &Path, specifier: &Value) -> Result<Map<String, Value>> {
        let text = specifier.as_str().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "{}: the value of \"{IMPORT_KEY}\" must be a string",
                file.display()
            ))
        })?;
        let specifier = ImportSpecifier::parse(text).map_err(|err| {
            ConfigError::Invalid(format!("{}: {}", file.display(), err.message()))
        })?;

        let target = match &specifier.filename {
            Some(filename) => self.resolver.target_path(file, filename)?,
            None => file.to_path_buf(),
        };
        match self.resolve_file(&target, specifier.selector.as_deref())? {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::Invalid(format!(
                "{}: import \"{text}\" does not resolve to an object",
                file.display()
            ))
            .into()),
        }
    }
}

/// Descends into `document` along a slash-separated selector. Inside arrays
/// a segment picks the element whose `"#"` property equals it.
fn select<'v>(path: &Path, document: &'v Value, selector: Option<&str>) -> Result<&'v Value> {
    let mut current = document;
    if let Some(selector) = selector {
        for segment in selector.split('/') {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => items
                    .iter()
                    .find(|item| item.get("#").and_then(Value::as_str) == Some(segment)),
                _ => None,
            };
            current = next.ok_or_else(|| {
                ConfigError::NotFound(format!(
                    "{}: selector \"{selector}\" does not exist (failed at \"{segment}\")",
                    path.display()
                ))
            })?;
        }
    }
    if !current.is_object() {
        let target = match selector {
            Some(selector) => format!("{}#{selector}", path.display()),
            None => path.display().to_string(),
        };
        return Err(ConfigError::Invalid(format!("import target {target} is not an object")).into());
    }
    Ok(current)
}

/// Lexically resolves `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_specifiers() {
        let spec = ImportSpecifier::parse("~/templates/master.json#paramInformation/1[0x01]").unwrap();
        assert_eq!(spec.filename.as_deref(), Some("~/templates/master.json"));
        assert_eq!(spec.selector.as_deref(), Some("paramInformation/1[0x01]"));
        assert!(spec.is_root_relative());

        let spec = ImportSpecifier::parse("#base").unwrap();
        assert_eq!(spec.filename, None);
        assert_eq!(spec.selector.as_deref(), Some("base"));

        let spec = ImportSpecifier::parse("#").unwrap();
        assert_eq!(spec, ImportSpecifier { filename: None, selector: None });
    }

    #[test]
    fn test_reject_bad_specifiers() {
        for text in ["", "master", "master.js", "master.json#a b", "a.json#x[0xzz]", "../x.json?"] {
            let err = ImportSpecifier::parse(text).unwrap_err();
            assert!(err.to_string().contains("is invalid"), "{text}");
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/db/0x0086/../templates/./a.json")),
            PathBuf::from("/db/templates/a.json")
        );
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_template_paths() {
        assert!(TemplateCache::is_template_path(Path::new("/db/templates/master.json")));
        assert!(TemplateCache::is_template_path(Path::new("/db/0x0086/templates/x.json")));
        assert!(!TemplateCache::is_template_path(Path::new("/db/0x0086/my_templates.json")));
    }

    #[test]
    fn test_select_in_tagged_arrays() {
        let doc = serde_json::json!({
            "paramInformation": [
                { "#": "1", "label": "one" },
                { "#": "2[0x01]", "label": "two" }
            ]
        });
        let path = Path::new("doc.json");
        let found = select(path, &doc, Some("paramInformation/2[0x01]")).unwrap();
        assert_eq!(found["label"], "two");

        let err = select(path, &doc, Some("paramInformation/3")).unwrap_err();
        assert_eq!(err.kind(), Some(device_config_core::ConfigErrorKind::NotFound));

        let err = select(path, &doc, Some("paramInformation")).unwrap_err();
        assert_eq!(err.kind(), Some(device_config_core::ConfigErrorKind::Invalid));
    }
}
