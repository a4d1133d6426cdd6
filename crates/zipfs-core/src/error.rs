use thiserror::Error;

/// Errors that can occur when working with virtual filesystems.
#[derive(Debug, Error)]
pub enum Error {
    /// The path string does not satisfy the path grammar.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The operation expects a file path but was given a directory path.
    #[error("not a file path: {0}")]
    NotAFile(String),

    /// The operation expects a directory path but was given a file path.
    #[error("not a directory path: {0}")]
    NotADirectory(String),

    /// No entity exists at the given path.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// An entity already exists at the given path.
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not supported by this filesystem or stream.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Error reported by the underlying archive container.
    #[error("archive error: {0}")]
    Archive(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;
