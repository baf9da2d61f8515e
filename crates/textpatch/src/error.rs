//! Error types for the textpatch crate

use thiserror::Error;

/// Errors that can occur while patching text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A start marker was found without a matching end marker after it
    #[error("start marker {marker:?} on line {line} has no matching end marker")]
    UnterminatedBlock { marker: String, line: usize },

    /// The fragment contains one of the block markers, which would break re-patching
    #[error("fragment contains the marker line {0:?}")]
    MarkerInFragment(String),

    /// Nothing to insert
    #[error("fragment is empty")]
    EmptyFragment,
}

/// Result type for textpatch operations
pub type Result<T> = std::result::Result<T, Error>;
