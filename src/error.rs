//! Error type for fallible steps inside the pipeline.
//!
//! None of these escape the public entry points: the generator and the document
//! store turn them into fallback artifacts and diagnostics.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("compiler failed: {0}")]
    Compiler(String),

    #[error("compiler panicked: {0}")]
    CompilerPanic(String),

    #[error("malformed source map: {0}")]
    SourceMapJson(#[from] serde_json::Error),

    #[error("unsupported source map version {0}")]
    SourceMapVersion(u32),

    #[error("invalid VLQ mapping at byte {position}: {message}")]
    Vlq { position: usize, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
