//! Document state management and text utilities.
//!
//! This module provides:
//! - `LineIndex` for byte offset <-> LSP position conversion
//! - `DocumentSnapshot`, `Document` and `DocumentStore` for document lifecycle management

mod state;
mod text;

pub use state::{Document, DocumentSnapshot, DocumentStore};
pub(crate) use text::floor_char_boundary;
pub use text::LineIndex;
