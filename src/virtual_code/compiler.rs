//! Markup-to-code compiler collaborator.
//!
//! The generator treats the compiler as a pure function from document text to
//! generated code, a source map and diagnostics. Any implementation of
//! [`MarkupCompiler`] can be plugged in; [`TsxCompiler`] is the built-in one.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::LineIndex;
use crate::error::Result;
use crate::parser::{self, BlockKind, FrontmatterStatus, MarkupNode, NodeKind, ScriptMode};

use super::vlq::MappingsEncoder;

/// Code of the diagnostic reported when the compiler crashes or returns garbage.
pub const INTERNAL_ERROR_CODE: u32 = 1000;
/// Code of the diagnostic for a frontmatter without closing delimiter.
pub const UNCLOSED_FRONTMATTER_CODE: u32 = 2001;
/// Code of the diagnostic for a script or style element without closing tag.
pub const UNCLOSED_BLOCK_CODE: u32 = 2002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// Diagnostic location in the original document; line and column are one-based,
/// column and length in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticLocation {
    pub line: u32,
    pub column: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileDiagnostic {
    pub code: u32,
    pub severity: Severity,
    /// `None` for file-level problems.
    pub location: Option<DiagnosticLocation>,
    pub message: String,
    pub hint: Option<String>,
}

impl CompileDiagnostic {
    /// The diagnostic substituted for a failed compilation.
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: INTERNAL_ERROR_CODE,
            severity: Severity::Error,
            location: None,
            message: format!("internal compiler error: {}", detail),
            hint: Some("This is a bug in the compiler, not in your file.".to_string()),
        }
    }
}

/// What a compiler returns for one document.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub code: String,
    /// Source map v3 JSON.
    pub map: String,
    pub diagnostics: Vec<CompileDiagnostic>,
}

/// Turns a component document into checkable code.
pub trait MarkupCompiler: Send + Sync {
    fn compile(&self, source: &str, file_name: &str) -> Result<CompileOutput>;
}

static NON_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_$]+").unwrap());

/// Derive a PascalCase identifier from a file name (`my-page.astro` -> `MyPage`).
pub fn component_name(file_name: &str) -> String {
    let stem = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .split('.')
        .next()
        .unwrap_or_default();
    let mut name: String = NON_IDENTIFIER
        .split(stem)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "Component");
    }
    name
}

/// Built-in markup-to-TSX compiler.
///
/// Layout of the output: frontmatter code, then the bodies of inline scripts at module
/// scope, then a default-exported function returning the markup as a JSX fragment.
/// Module script and style bodies are dropped; unclosed and void elements get
/// synthetic closing tags.
#[derive(Debug, Clone)]
pub struct TsxCompiler {
    inline_attributes: Vec<String>,
}

impl Default for TsxCompiler {
    fn default() -> Self {
        Self::new(vec![parser::INLINE_ATTRIBUTE.to_string()])
    }
}

impl TsxCompiler {
    pub fn new(inline_attributes: Vec<String>) -> Self {
        Self { inline_attributes }
    }
}

impl MarkupCompiler for TsxCompiler {
    fn compile(&self, source: &str, file_name: &str) -> Result<CompileOutput> {
        let frontmatter = parser::scan(source);
        let tree = parser::parse(source, frontmatter.markup_start(source.len()));
        let blocks = parser::extract(&tree, source);
        let line_index = LineIndex::new(source.to_string());

        let mut emitter = Emitter::new(source, &line_index);
        let mut diagnostics = Vec::new();

        if let Some(body) = frontmatter.body() {
            emitter.mapped(body.start, &source[body.clone()]);
            emitter.synthetic("\n");
        }
        if let FrontmatterStatus::Open { open, .. } = frontmatter {
            diagnostics.push(located(
                &line_index,
                open.start..open.end,
                UNCLOSED_FRONTMATTER_CODE,
                Severity::Error,
                "Frontmatter is missing its closing `---`",
            ));
        }

        for block in &blocks {
            if block.kind == BlockKind::Script
                && block.script_mode(&self.inline_attributes) == ScriptMode::Inline
            {
                emitter.mapped(block.content_start, &block.content);
                emitter.synthetic("\n");
            }
            if !block.closed {
                let tag = match block.kind {
                    BlockKind::Script => "script",
                    BlockKind::Style => "style",
                };
                diagnostics.push(located(
                    &line_index,
                    block.container.start..block.content_start,
                    UNCLOSED_BLOCK_CODE,
                    Severity::Warning,
                    &format!("Unclosed <{}> element", tag),
                ));
            }
        }

        emitter.synthetic(&format!(
            "export default function {}__AstroComponent_(_props: Record<string, any>): any {{\nreturn <Fragment>\n",
            component_name(file_name)
        ));
        emitter.children(&tree.root);
        emitter.synthetic("\n</Fragment>;\n}\n");

        let (code, mappings) = emitter.finish();
        let map = serde_json::json!({
            "version": 3,
            "sources": [file_name],
            "names": [],
            "mappings": mappings,
        })
        .to_string();

        Ok(CompileOutput {
            code,
            map,
            diagnostics,
        })
    }
}

fn located(
    line_index: &LineIndex,
    span: std::ops::Range<usize>,
    code: u32,
    severity: Severity,
    message: &str,
) -> CompileDiagnostic {
    let range = line_index.span_to_range(&span);
    let length = if range.start.line == range.end.line {
        range.end.character - range.start.character
    } else {
        0
    };
    CompileDiagnostic {
        code,
        severity,
        location: Some(DiagnosticLocation {
            line: range.start.line + 1,
            column: range.start.character + 1,
            length,
        }),
        message: message.to_string(),
        hint: None,
    }
}

/// Writes generated code while recording source map segments.
struct Emitter<'a> {
    source: &'a str,
    line_index: &'a LineIndex,
    code: String,
    encoder: MappingsEncoder,
    line: u32,
    /// UTF-16 column in the generated text.
    column: u32,
}

impl<'a> Emitter<'a> {
    fn new(source: &'a str, line_index: &'a LineIndex) -> Self {
        Self {
            source,
            line_index,
            code: String::new(),
            encoder: MappingsEncoder::new(),
            line: 0,
            column: 0,
        }
    }

    fn finish(self) -> (String, String) {
        (self.code, self.encoder.finish())
    }

    fn push(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.code.push_str(text);
    }

    fn synthetic(&mut self, text: &str) {
        self.push(text);
    }

    /// Copy `text`, which starts at `source_start` in the original, verbatim.
    fn mapped(&mut self, source_start: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        self.mark(source_start);
        let mut rest = text;
        let mut offset = source_start;
        while let Some(newline) = rest.find('\n') {
            self.push(&rest[..=newline]);
            offset += newline + 1;
            rest = &rest[newline + 1..];
            if !rest.is_empty() {
                self.mark(offset);
            }
        }
        self.push(rest);
        self.encoder.add(self.line, self.column, None);
    }

    fn mark(&mut self, source_offset: usize) {
        let position = self.line_index.offset_to_position(source_offset);
        self.encoder.add(
            self.line,
            self.column,
            Some((position.line, position.character)),
        );
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.source.get(start..end).unwrap_or_default()
    }

    fn children(&mut self, node: &MarkupNode) {
        for child in &node.children {
            self.node(child);
        }
    }

    fn node(&mut self, node: &MarkupNode) {
        match node.kind {
            NodeKind::Root => self.children(node),
            NodeKind::Text => self.mapped(node.start, self.slice(node.start, node.end)),
            NodeKind::Comment => {
                let inner = self.slice(node.start, node.end).replace("*/", "* /");
                self.synthetic(&format!("{{/*{}*/}}", inner));
            }
            NodeKind::Element => self.element(node),
        }
    }

    fn element(&mut self, node: &MarkupNode) {
        let tag = node.tag.clone().unwrap_or_default();
        let Some(start_tag_end) = node.start_tag_end else {
            // Opening tag cut off by the end of input.
            self.mapped(node.start, self.slice(node.start, node.end));
            self.synthetic(" />");
            return;
        };
        let opening = self.slice(node.start, start_tag_end);

        if node.self_closing {
            self.mapped(node.start, opening);
            return;
        }
        if node.is_void() {
            // `<br>` becomes `<br/>`.
            let without_bracket = opening.strip_suffix('>').unwrap_or(opening);
            self.mapped(node.start, without_bracket);
            self.synthetic("/>");
            return;
        }

        self.mapped(node.start, opening);
        let is_raw = node.has_tag("script") || node.has_tag("style");
        if !is_raw {
            self.children(node);
        }
        match node.end_tag_start {
            Some(end_tag_start) if node.closed => {
                self.mapped(end_tag_start, self.slice(end_tag_start, node.end));
            }
            _ => self.synthetic(&format!("</{}>", tag)),
        }
    }
}
