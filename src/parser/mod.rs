//! Structural parsing of component documents.
//!
//! This module provides:
//! - Frontmatter delimiter scanning
//! - A tolerant markup parser producing an element tree
//! - Extraction of embedded `<script>` and `<style>` blocks

pub mod blocks;
pub mod frontmatter;
pub mod markup;

pub use blocks::{extract, BlockKind, EmbeddedBlock, ScriptMode, INLINE_ATTRIBUTE};
pub use frontmatter::{scan, Delimiter, FrontmatterStatus};
pub use markup::{parse, MarkupNode, MarkupTree, NodeKind};
