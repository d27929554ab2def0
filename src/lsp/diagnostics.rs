//! Diagnostics conversion from compiler and type-checker results to LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::checker::{CancellationToken, CheckerDiagnostic, TypeChecker};
use crate::document::{DocumentSnapshot, LineIndex};
use crate::virtual_code::{Capability, CompileDiagnostic, Severity, SyntheticSource};

pub(crate) fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

/// Convert compiler diagnostics, which are already in document coordinates.
///
/// File-level diagnostics land on the start of the document.
pub fn compile_to_diagnostics(
    diagnostics: &[CompileDiagnostic],
    line_index: &LineIndex,
) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .map(|diagnostic| {
            let span = diagnostic
                .location
                .and_then(|location| {
                    let start = line_index.offset_at_one_based(location.line, location.column)?;
                    let end_column = location.column.saturating_add(location.length);
                    let end = line_index
                        .offset_at_one_based(location.line, end_column)
                        .unwrap_or(start);
                    Some(start..end.max(start))
                })
                .unwrap_or(0..0);

            let mut message = diagnostic.message.clone();
            if let Some(hint) = &diagnostic.hint {
                message.push_str("\n\n");
                message.push_str(hint);
            }

            Diagnostic {
                range: line_index.span_to_range(&span),
                severity: Some(to_lsp_severity(diagnostic.severity)),
                code: Some(NumberOrString::Number(diagnostic.code as i32)),
                code_description: None,
                source: Some("astro".to_string()),
                message,
                related_information: None,
                tags: None,
                data: None,
            }
        })
        .collect()
}

/// Convert type-checker diagnostics reported against `source` to document ranges.
///
/// A span whose end falls outside the mapping collapses to its start; a span whose
/// start does not map is dropped.
pub fn checker_to_diagnostics(
    source: &SyntheticSource,
    diagnostics: &[CheckerDiagnostic],
    line_index: &LineIndex,
) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .filter_map(|diagnostic| {
            let mapping = &source.mapping;
            let span = mapping
                .range_to_original(diagnostic.span.clone(), Capability::Diagnostics)
                .or_else(|| {
                    let start = mapping.to_original_for(diagnostic.span.start, Capability::Diagnostics)?;
                    Some(start..start)
                });
            let Some(span) = span else {
                tracing::debug!(
                    "dropping unmappable diagnostic in {} at {:?}",
                    source.file_name,
                    diagnostic.span
                );
                return None;
            };

            Some(Diagnostic {
                range: line_index.span_to_range(&span),
                severity: Some(to_lsp_severity(diagnostic.severity)),
                code: diagnostic.code.map(|c| NumberOrString::Number(c as i32)),
                code_description: None,
                source: Some("ts".to_string()),
                message: diagnostic.message.clone(),
                related_information: None,
                tags: None,
                data: None,
            })
        })
        .collect()
}

/// All diagnostics of a document: the compiler's, then the type checker's for every
/// checked synthetic source.
///
/// Returns `None` if `cancel` fires between checker calls.
pub fn document_diagnostics(
    snapshot: &DocumentSnapshot,
    checker: &dyn TypeChecker,
    cancel: &CancellationToken,
) -> Option<Vec<Diagnostic>> {
    let mut diagnostics = compile_to_diagnostics(&snapshot.generated.diagnostics, &snapshot.line_index);

    for source in snapshot.generated.all().filter(|s| s.kind.is_checked()) {
        if cancel.is_cancelled() {
            tracing::debug!("diagnostics for {} cancelled", snapshot.file_name);
            return None;
        }
        let reported = checker.diagnostics(source);
        diagnostics.extend(checker_to_diagnostics(source, &reported, &snapshot.line_index));
    }

    if cancel.is_cancelled() {
        return None;
    }
    Some(diagnostics)
}
