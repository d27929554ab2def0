//! Session-scoped cache of module resolutions.
//!
//! The type checker resolves `import` specifiers relative to the importing file; the
//! results are cached per `(module name, containing file)` until a file watcher reports
//! a change to either side.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    module: String,
    containing_file: PathBuf,
}

/// The outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PathBuf),
    /// Cached negative result; the module does not exist (yet).
    NotFound,
}

impl Resolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resolution::Resolved(path) => Some(path),
            Resolution::NotFound => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleResolutionCache {
    entries: DashMap<CacheKey, Resolution>,
}

impl ModuleResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, module: &str, containing_file: &Path) -> Option<Resolution> {
        self.entries
            .get(&CacheKey {
                module: module.to_string(),
                containing_file: containing_file.to_path_buf(),
            })
            .map(|r| r.value().clone())
    }

    pub fn insert(&self, module: &str, containing_file: &Path, resolution: Resolution) {
        self.entries.insert(
            CacheKey {
                module: module.to_string(),
                containing_file: containing_file.to_path_buf(),
            },
            resolution,
        );
    }

    /// Cached value, or resolve with `resolve` and cache the result.
    pub fn get_or_resolve(
        &self,
        module: &str,
        containing_file: &Path,
        resolve: impl FnOnce() -> Resolution,
    ) -> Resolution {
        if let Some(resolution) = self.get(module, containing_file) {
            return resolution;
        }
        let resolution = resolve();
        self.insert(module, containing_file, resolution.clone());
        resolution
    }

    /// Drop entries affected by a change to `path`.
    ///
    /// Removes entries made from `path`, entries resolved to `path`, and every negative
    /// entry, since a created file can satisfy any earlier miss.
    pub fn invalidate(&self, path: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, resolution| {
            key.containing_file.as_path() != path
                && match resolution {
                    Resolution::Resolved(resolved) => resolved.as_path() != path,
                    Resolution::NotFound => false,
                }
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("invalidated {} resolutions for {}", removed, path.display());
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
