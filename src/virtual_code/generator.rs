//! Synthetic source generation.
//!
//! Runs the markup compiler over a document, turns its source map into offset
//! mapping segments, and produces the per-script satellite sources and per-style
//! virtual files. Compiler failures never escape: they are replaced by an empty
//! primary source carrying one internal-error diagnostic.

use std::panic::{self, AssertUnwindSafe};

use crate::document::LineIndex;
use crate::error::{Error, Result};
use crate::parser::{BlockKind, EmbeddedBlock, FrontmatterStatus, MarkupTree, ScriptMode};

use super::compiler::{CompileDiagnostic, CompileOutput, MarkupCompiler};
use super::mapping::{Capabilities, MappingSegment, OffsetMapping};
use super::vlq::{parse_source_map, DecodedMappings};
use super::{SyntheticSource, VirtualFileKind};

/// The structural artifacts of one document version.
#[derive(Debug, Clone, Copy)]
pub struct SourceParts<'a> {
    pub text: &'a str,
    pub frontmatter: &'a FrontmatterStatus,
    pub tree: &'a MarkupTree,
    pub blocks: &'a [EmbeddedBlock],
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions<'a> {
    /// Name of the original document; virtual file names derive from it.
    pub file_name: &'a str,
    pub version: u64,
    pub inline_attributes: &'a [String],
    /// Declarations appended to the primary source after the compiled code.
    pub ambient_declarations: &'a str,
}

/// Everything generated for one document version.
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub primary: SyntheticSource,
    /// One isolated source per module script, in document order.
    pub satellites: Vec<SyntheticSource>,
    /// One virtual file per style block, in document order.
    pub styles: Vec<SyntheticSource>,
    pub diagnostics: Vec<CompileDiagnostic>,
}

impl GeneratedCode {
    /// Primary source first, then satellites, then styles.
    pub fn all(&self) -> impl Iterator<Item = &SyntheticSource> {
        std::iter::once(&self.primary)
            .chain(self.satellites.iter())
            .chain(self.styles.iter())
    }
}

/// Generate the synthetic sources for a document.
pub fn generate(
    compiler: &dyn MarkupCompiler,
    parts: SourceParts<'_>,
    options: GenerateOptions<'_>,
) -> GeneratedCode {
    let (primary, diagnostics) = match compile_primary(compiler, parts.text, options) {
        Ok((code, segments, diagnostics)) => (
            primary_source(code, segments, options),
            diagnostics,
        ),
        Err(e) => {
            tracing::warn!("compiling {} failed: {}", options.file_name, e);
            let fallback = primary_source(String::new(), Vec::new(), options);
            (fallback, vec![CompileDiagnostic::internal_error(&e.to_string())])
        }
    };

    let satellites = script_satellites(parts.blocks, options);
    let styles = style_files(parts.blocks, options);

    tracing::debug!(
        file = options.file_name,
        version = options.version,
        nodes = parts.tree.node_count(),
        segments = primary.mapping.len(),
        satellites = satellites.len(),
        "generated synthetic sources"
    );

    GeneratedCode {
        primary,
        satellites,
        styles,
        diagnostics,
    }
}

type Compiled = (String, Vec<MappingSegment>, Vec<CompileDiagnostic>);

fn compile_primary(
    compiler: &dyn MarkupCompiler,
    text: &str,
    options: GenerateOptions<'_>,
) -> Result<Compiled> {
    let CompileOutput {
        code,
        map,
        diagnostics,
    } = run_compiler(compiler, text, options.file_name)?;

    let decoded = parse_source_map(&map)?;
    let source_index = LineIndex::new(text.to_string());
    let generated_index = LineIndex::new(code.clone());
    let segments = segments_from_source_map(&source_index, &generated_index, &decoded);

    Ok((code, segments, diagnostics))
}

fn run_compiler(compiler: &dyn MarkupCompiler, text: &str, file_name: &str) -> Result<CompileOutput> {
    match panic::catch_unwind(AssertUnwindSafe(|| compiler.compile(text, file_name))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::CompilerPanic(message))
        }
    }
}

fn primary_source(
    code: String,
    mut segments: Vec<MappingSegment>,
    options: GenerateOptions<'_>,
) -> SyntheticSource {
    let anchor = first_statement_offset(&code);
    segments.push(MappingSegment::new(
        0..0,
        anchor..anchor,
        Capabilities::diagnostics_only(),
    ));

    let mut text = code;
    if !options.ambient_declarations.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(options.ambient_declarations);
    }

    SyntheticSource::new(
        format!("{}.tsx", options.file_name),
        VirtualFileKind::Primary,
        text,
        options.version,
        OffsetMapping::new(segments),
    )
}

/// Rebuild offset segments from decoded source map lines.
///
/// Each segment that points into the source starts a candidate mapping which the next
/// segment (on any line) ends. A candidate is kept only for the prefix where source and
/// generated text agree byte for byte, cut back to a character boundary; the rest is
/// synthesized and stays unmapped. Adjacent kept runs are merged. A candidate still
/// open after the last segment is dropped.
pub fn segments_from_source_map(
    source: &LineIndex,
    generated: &LineIndex,
    decoded: &DecodedMappings,
) -> Vec<MappingSegment> {
    let source_text = source.source();
    let generated_text = generated.source();
    let mut segments: Vec<MappingSegment> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (line, line_segments) in decoded.iter().enumerate() {
        for segment in line_segments {
            let Some(generated_offset) = generated.offset_at(line as u32, segment.generated_column)
            else {
                current = None;
                continue;
            };

            if let Some((generated_start, source_start)) = current.take() {
                let length = common_prefix_len(
                    source_text,
                    source_start,
                    generated_text,
                    generated_start,
                    generated_offset.saturating_sub(generated_start),
                );
                if length > 0 {
                    push_merged(&mut segments, source_start, generated_start, length);
                }
            }

            current = segment.source.and_then(|point| {
                source
                    .offset_at(point.line, point.column)
                    .map(|source_offset| (generated_offset, source_offset))
            });
        }
    }

    segments
}

/// Length of the common prefix of the two texts at the given offsets, at most `limit`
/// bytes, ending on a character boundary in both.
fn common_prefix_len(
    source: &str,
    source_start: usize,
    generated: &str,
    generated_start: usize,
    limit: usize,
) -> usize {
    let source_bytes = source.as_bytes().get(source_start..).unwrap_or_default();
    let generated_bytes = generated.as_bytes().get(generated_start..).unwrap_or_default();
    let mut length = source_bytes
        .iter()
        .zip(generated_bytes)
        .take(limit)
        .take_while(|(a, b)| a == b)
        .count();
    while length > 0
        && !(source.is_char_boundary(source_start + length)
            && generated.is_char_boundary(generated_start + length))
    {
        length -= 1;
    }
    length
}

fn push_merged(
    segments: &mut Vec<MappingSegment>,
    source_start: usize,
    generated_start: usize,
    length: usize,
) {
    if let Some(last) = segments.last_mut() {
        if last.source.end == source_start && last.generated.end == generated_start {
            last.source.end += length;
            last.generated.end += length;
            return;
        }
    }
    segments.push(MappingSegment::with_length(
        source_start,
        generated_start,
        length,
        Capabilities::unformattable(),
    ));
}

/// Offset of the first character that is neither whitespace nor inside a comment.
pub fn first_statement_offset(code: &str) -> usize {
    let mut rest = code;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("//") {
            rest = after.find('\n').map(|i| &after[i..]).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.find("*/").map(|i| &after[i + 2..]).unwrap_or("");
        } else {
            return code.len() - trimmed.len();
        }
    }
}

fn script_satellites(blocks: &[EmbeddedBlock], options: GenerateOptions<'_>) -> Vec<SyntheticSource> {
    blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Script)
        .enumerate()
        .filter(|(_, b)| b.script_mode(options.inline_attributes) == ScriptMode::Module)
        .map(|(index, block)| {
            SyntheticSource::new(
                format!("{}.__script_{}.mts", options.file_name, index),
                VirtualFileKind::Script { index },
                block.content.clone(),
                options.version,
                OffsetMapping::identity(block.content_span(), Capabilities::all()),
            )
        })
        .collect()
}

fn style_files(blocks: &[EmbeddedBlock], options: GenerateOptions<'_>) -> Vec<SyntheticSource> {
    blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Style)
        .enumerate()
        .map(|(index, block)| {
            let lang = block.lang().unwrap_or("css");
            SyntheticSource::new(
                format!("{}.__style_{}.{}", options.file_name, index, lang),
                VirtualFileKind::Style { index },
                block.content.clone(),
                options.version,
                OffsetMapping::identity(block.content_span(), Capabilities::all()),
            )
        })
        .collect()
}
