use thiserror::Error;

/// Errors of the surfaces around the graph: descriptions, building and exports.
/// Requests themselves never fail, they report through [`crate::CoordinateSystemEvent`]s.
#[derive(Error, Debug)]
pub enum FrameGraphError {
    #[error("Frame '{0}' does not exist")]
    FrameNotFound(String),

    #[error("Frame '{0}' is declared more than once")]
    DuplicateFrame(String),

    #[error("Link from '{child}' to parent '{parent}' was rejected: {reason}")]
    LinkRejected {
        parent: String,
        child: String,
        reason: String,
    },

    #[error("Invalid rotation: {0}")]
    InvalidRotation(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Syntax error in configuration: {0}")]
    ConfigSyntax(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FrameGraphResult<T> = Result<T, FrameGraphError>;
