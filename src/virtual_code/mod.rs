//! Synthetic sources handed to the type checker and the style service.
//!
//! This module provides:
//! - `OffsetMapping` for translating offsets between a document and a synthetic source
//! - `MarkupCompiler` and the built-in `TsxCompiler`
//! - `generate` for turning a parsed document into synthetic sources
//! - `LanguageModule` for virtual file naming, ambient declarations and framework files

pub mod compiler;
pub mod generator;
pub mod language;
pub mod mapping;
pub mod vlq;

pub use compiler::{CompileDiagnostic, CompileOutput, MarkupCompiler, Severity, TsxCompiler};
pub use generator::{generate, GenerateOptions, GeneratedCode, SourceParts};
pub use language::{FrameworkIntegration, FrameworkRegistry, LanguageKind, LanguageModule};
pub use mapping::{Capabilities, Capability, MappingSegment, OffsetMapping};

use crate::document::LineIndex;

/// What a synthetic source stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualFileKind {
    /// The whole document compiled to TSX.
    Primary,
    /// An isolated module script, numbered among the document's script blocks.
    Script { index: usize },
    /// A style block, numbered among the document's style blocks.
    Style { index: usize },
}

impl VirtualFileKind {
    /// Whether the type checker sees this file.
    pub fn is_checked(self) -> bool {
        !matches!(self, VirtualFileKind::Style { .. })
    }
}

/// Generated text plus the mapping that ties it to its document.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub file_name: String,
    pub kind: VirtualFileKind,
    /// Document version this source was generated for.
    pub version: u64,
    pub mapping: OffsetMapping,
    line_index: LineIndex,
}

impl SyntheticSource {
    pub fn new(
        file_name: String,
        kind: VirtualFileKind,
        text: String,
        version: u64,
        mapping: OffsetMapping,
    ) -> Self {
        Self {
            file_name,
            kind,
            version,
            mapping,
            line_index: LineIndex::new(text),
        }
    }

    pub fn text(&self) -> &str {
        self.line_index.source()
    }

    /// Line index over the generated text.
    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }
}
