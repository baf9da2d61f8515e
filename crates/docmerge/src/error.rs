//! Error types for the docmerge crate

use thiserror::Error;

/// Errors that can occur while merging into a structured document
#[derive(Error, Debug)]
pub enum Error {
    /// JSON document could not be parsed or written
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML document could not be parsed
    #[error("invalid TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML text could not be loaded for editing
    #[error("invalid TOML: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    /// The top-level value is not an object/table
    #[error("document root is not an object")]
    RootNotObject,

    /// A value on the merge path exists but is not an object
    #[error("`{key}` is not an object")]
    NotAnObject { key: String },

    /// The merge target exists but is not an array
    #[error("`{key}` is not an array")]
    NotAnArray { key: String },

    /// The fragment does not fit the target shape
    #[error("fragment for `{key}` must be {expected}")]
    BadFragment { key: String, expected: &'static str },

    /// Array fragments must be objects so they can carry the ownership marker
    #[error("entry {index} of the fragment for `{key}` is not an object")]
    UntaggableEntry { key: String, index: usize },

    /// The file extension does not map to a known format
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for docmerge operations
pub type Result<T> = std::result::Result<T, Error>;
