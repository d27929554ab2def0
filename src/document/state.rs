//! Document state management for astrols.
//!
//! Every update re-derives the whole snapshot from the full text: frontmatter status,
//! markup tree, embedded blocks and synthetic sources. Readers hold an
//! `Arc<DocumentSnapshot>` and never observe a half-built version.

use std::sync::Arc;

use dashmap::DashMap;
use ropey::Rope;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::parser::{self, EmbeddedBlock, FrontmatterStatus, MarkupTree};
use crate::virtual_code::{
    Capability, GeneratedCode, LanguageKind, LanguageModule, SourceParts, SyntheticSource,
};

use super::text::LineIndex;

/// Immutable derived state of one document version.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub file_name: String,
    /// Incremented on every update, including ones that do not change the text.
    pub version: u64,
    /// Version reported by the client, echoed back when publishing diagnostics.
    pub client_version: i32,
    pub language: LanguageKind,
    pub line_index: LineIndex,
    pub frontmatter: FrontmatterStatus,
    pub tree: MarkupTree,
    pub blocks: Vec<EmbeddedBlock>,
    pub generated: GeneratedCode,
}

impl DocumentSnapshot {
    /// Run the whole derivation pipeline over `text`.
    pub fn derive(
        file_name: &str,
        text: String,
        version: u64,
        client_version: i32,
        language: &LanguageModule,
    ) -> Self {
        let kind = language.kind_of(file_name);
        let framework = match &kind {
            LanguageKind::Framework(extension) => {
                language.generate_framework(&text, file_name, extension, version)
            }
            LanguageKind::Astro => None,
        };

        let (frontmatter, tree, blocks, generated) = match framework {
            Some(generated) => (
                FrontmatterStatus::Absent,
                parser::parse(&text, text.len()),
                Vec::new(),
                generated,
            ),
            None => {
                let frontmatter = parser::scan(&text);
                let tree = parser::parse(&text, frontmatter.markup_start(text.len()));
                let blocks = parser::extract(&tree, &text);
                let generated = language.generate(
                    SourceParts {
                        text: &text,
                        frontmatter: &frontmatter,
                        tree: &tree,
                        blocks: &blocks,
                    },
                    file_name,
                    version,
                );
                (frontmatter, tree, blocks, generated)
            }
        };

        tracing::debug!(
            file = file_name,
            version,
            blocks = blocks.len(),
            "derived document snapshot"
        );

        Self {
            file_name: file_name.to_string(),
            version,
            client_version,
            language: kind,
            line_index: LineIndex::new(text),
            frontmatter,
            tree,
            blocks,
            generated,
        }
    }

    pub fn text(&self) -> &str {
        self.line_index.source()
    }

    pub fn primary(&self) -> &SyntheticSource {
        &self.generated.primary
    }

    /// Primary synthetic offset to document offset.
    pub fn map_to_original(&self, offset: usize) -> Option<usize> {
        self.generated.primary.mapping.to_original(offset)
    }

    /// Document offset to primary synthetic offset.
    pub fn map_to_generated(&self, offset: usize) -> Option<usize> {
        self.generated.primary.mapping.to_generated(offset)
    }

    /// The synthetic source serving `offset` for `capability`, with the offset in it.
    ///
    /// Satellites and style files are preferred over the primary source.
    pub fn locate(
        &self,
        offset: usize,
        capability: Capability,
    ) -> Option<(&SyntheticSource, usize)> {
        self.generated
            .satellites
            .iter()
            .chain(self.generated.styles.iter())
            .chain(std::iter::once(&self.generated.primary))
            .find_map(|source| {
                source
                    .mapping
                    .to_generated_for(offset, capability)
                    .map(|generated| (source, generated))
            })
    }

    /// A synthetic source of this snapshot by file name.
    pub fn virtual_file(&self, file_name: &str) -> Option<&SyntheticSource> {
        self.generated.all().find(|s| s.file_name == file_name)
    }

    /// The embedded block whose content holds `offset`.
    pub fn block_at(&self, offset: usize) -> Option<&EmbeddedBlock> {
        self.blocks.iter().find(|b| b.contains(offset))
    }

    /// Whether plain HTML tag and attribute completions make sense at `offset`.
    ///
    /// Not inside frontmatter, script or style content, or a component's opening tag.
    pub fn markup_completions_allowed(&self, offset: usize) -> bool {
        if self.language != LanguageKind::Astro {
            return false;
        }
        if self.frontmatter.contains(offset) || self.block_at(offset).is_some() {
            return false;
        }
        !self
            .tree
            .element_at(offset)
            .is_some_and(|node| node.is_component() && node.in_start_tag(offset))
    }
}

/// An open document: an editable buffer plus the snapshot derived from it.
#[derive(Debug)]
pub struct Document {
    file_name: String,
    content: Rope,
    version: u64,
    snapshot: Arc<DocumentSnapshot>,
}

impl Document {
    pub fn new(file_name: String, text: String, client_version: i32, language: &LanguageModule) -> Self {
        let content = Rope::from_str(&text);
        let snapshot = Arc::new(DocumentSnapshot::derive(&file_name, text, 1, client_version, language));
        Self {
            file_name,
            content,
            version: 1,
            snapshot,
        }
    }

    pub fn snapshot(&self) -> Arc<DocumentSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply edits in order, then re-derive. A change without a range replaces the text.
    pub fn update(
        &mut self,
        changes: &[TextDocumentContentChangeEvent],
        client_version: i32,
        language: &LanguageModule,
    ) -> Arc<DocumentSnapshot> {
        for change in changes {
            apply_change(&mut self.content, change);
        }
        self.rederive(client_version, language)
    }

    /// Re-derive from the current text, e.g. after settings changed.
    pub fn rederive(&mut self, client_version: i32, language: &LanguageModule) -> Arc<DocumentSnapshot> {
        self.version += 1;
        self.snapshot = Arc::new(DocumentSnapshot::derive(
            &self.file_name,
            self.content.to_string(),
            self.version,
            client_version,
            language,
        ));
        self.snapshot()
    }
}

fn apply_change(content: &mut Rope, change: &TextDocumentContentChangeEvent) {
    match change.range {
        Some(range) => {
            let start = position_to_char(content, range.start);
            let end = position_to_char(content, range.end).max(start);
            content.remove(start..end);
            content.insert(start, &change.text);
        }
        None => *content = Rope::from_str(&change.text),
    }
}

/// Char index of an editor position; the column is in UTF-16 code units and is
/// clamped to the line, the line to the end of the text.
fn position_to_char(content: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= content.len_lines() {
        return content.len_chars();
    }
    let line_start = content.line_to_char(line);
    let slice = content.line(line);
    let mut line_len = slice.len_chars();
    while line_len > 0 && matches!(slice.char(line_len - 1), '\n' | '\r') {
        line_len -= 1;
    }
    let character = (position.character as usize).min(slice.char_to_utf16_cu(line_len));
    line_start + slice.utf16_cu_to_char(character)
}

/// Thread-safe storage for open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, Document>,
}

impl DocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Open or replace a document.
    pub fn open(
        &self,
        uri: Url,
        text: String,
        client_version: i32,
        language: &LanguageModule,
    ) -> Arc<DocumentSnapshot> {
        let document = Document::new(file_name_of(&uri), text, client_version, language);
        let snapshot = document.snapshot();
        self.documents.insert(uri, document);
        snapshot
    }

    /// Apply changes to an open document. Returns `None` if it is not open.
    pub fn update(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        client_version: i32,
        language: &LanguageModule,
    ) -> Option<Arc<DocumentSnapshot>> {
        let mut document = self.documents.get_mut(uri)?;
        Some(document.update(changes, client_version, language))
    }

    /// Re-derive every open document, e.g. after the language module changed.
    pub fn rederive_all(&self, language: &LanguageModule) -> Vec<(Url, Arc<DocumentSnapshot>)> {
        self.documents
            .iter_mut()
            .map(|mut entry| {
                let client_version = entry.snapshot.client_version;
                let snapshot = entry.rederive(client_version, language);
                (entry.key().clone(), snapshot)
            })
            .collect()
    }

    /// Close a document.
    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    /// Get a document's current snapshot.
    pub fn get(&self, uri: &Url) -> Option<Arc<DocumentSnapshot>> {
        self.documents.get(uri).map(|d| d.snapshot())
    }

    pub fn uris(&self) -> Vec<Url> {
        self.documents.iter().map(|e| e.key().clone()).collect()
    }
}

/// Path of a `file:` URI, or the raw URI path for anything else.
pub fn file_name_of(uri: &Url) -> String {
    uri.to_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| uri.path().to_string())
}
