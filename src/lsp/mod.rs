//! LSP protocol feature implementations.
//!
//! This module provides implementations for LSP features:
//! - Diagnostics from the compiler and the type checker, mapped to the document
//! - Hover information from the type checker
//! - Completion from the type checker and imported components

mod completion;
mod diagnostics;
mod hover;

pub use completion::completion_at_position;
pub use diagnostics::{checker_to_diagnostics, compile_to_diagnostics, document_diagnostics};
pub use hover::hover_at_position;
