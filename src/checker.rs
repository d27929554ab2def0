//! Type-checking engine collaborator.
//!
//! The engine sees synthetic sources only; every offset it reports or receives is an
//! offset into the synthetic text. Translating to and from the document is the
//! caller's job.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::resolution::{ModuleResolutionCache, Resolution};
use crate::virtual_code::{Severity, SyntheticSource};

/// A diagnostic reported against a synthetic source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerDiagnostic {
    pub span: Range<usize>,
    pub severity: Severity,
    pub code: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerHover {
    pub span: Range<usize>,
    /// Markdown.
    pub contents: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Variable,
    Function,
    Property,
    Module,
    Keyword,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerCompletion {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    /// Text replaced when the item is accepted; defaults to inserting at the cursor.
    pub replace: Option<Range<usize>>,
}

pub trait TypeChecker: Send + Sync {
    fn diagnostics(&self, source: &SyntheticSource) -> Vec<CheckerDiagnostic>;

    fn hover(&self, _source: &SyntheticSource, _offset: usize) -> Option<CheckerHover> {
        None
    }

    fn completions(&self, _source: &SyntheticSource, _offset: usize) -> Vec<CheckerCompletion> {
        Vec::new()
    }
}

/// A checker that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChecker;

impl TypeChecker for NullChecker {
    fn diagnostics(&self, _source: &SyntheticSource) -> Vec<CheckerDiagnostic> {
        Vec::new()
    }
}

/// Cooperative cancellation flag shared between a request and whoever supersedes it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both tokens share one flag.
    pub fn is_same(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Code of the diagnostic for an import that resolves to nothing.
pub const UNRESOLVED_IMPORT_CODE: u32 = 2307;

static IMPORT_SPECIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*(?:import[ \t]*|(?:import|export)\b[^'"`;]*?\bfrom\s*)(['"])([^'"\n]+)(['"])"#,
    )
    .unwrap()
});

const RESOLVE_SUFFIXES: &[&str] = &[
    "",
    ".ts",
    ".tsx",
    ".mts",
    ".js",
    ".mjs",
    ".astro",
    "/index.ts",
    "/index.js",
];

/// Reports relative imports that point at no file on disk.
///
/// Resolutions go through the session's [`ModuleResolutionCache`], so a file watcher
/// invalidating a path is enough to make the next run see a created or deleted file.
#[derive(Debug, Clone)]
pub struct ImportChecker {
    resolutions: Arc<ModuleResolutionCache>,
}

impl ImportChecker {
    pub fn new(resolutions: Arc<ModuleResolutionCache>) -> Self {
        Self { resolutions }
    }

    fn resolve(&self, specifier: &str, containing_file: &Path) -> Resolution {
        self.resolutions
            .get_or_resolve(specifier, containing_file, || {
                let Some(dir) = containing_file.parent() else {
                    return Resolution::NotFound;
                };
                RESOLVE_SUFFIXES
                    .iter()
                    .map(|suffix| dir.join(format!("{specifier}{suffix}")))
                    .find(|candidate| candidate.is_file())
                    .map(Resolution::Resolved)
                    .unwrap_or(Resolution::NotFound)
            })
    }
}

impl TypeChecker for ImportChecker {
    fn diagnostics(&self, source: &SyntheticSource) -> Vec<CheckerDiagnostic> {
        let containing_file = PathBuf::from(&source.file_name);
        IMPORT_SPECIFIER
            .captures_iter(source.text())
            .filter_map(|captures| {
                let specifier = captures.get(2)?;
                if captures.get(1)?.as_str() != captures.get(3)?.as_str() {
                    return None;
                }
                let name = specifier.as_str();
                if !(name.starts_with("./") || name.starts_with("../")) {
                    return None;
                }
                match self.resolve(name, &containing_file) {
                    Resolution::Resolved(_) => None,
                    Resolution::NotFound => Some(CheckerDiagnostic {
                        span: specifier.range(),
                        severity: Severity::Error,
                        code: Some(UNRESOLVED_IMPORT_CODE),
                        message: format!("Cannot find module '{}'.", name),
                    }),
                }
            })
            .collect()
    }
}
