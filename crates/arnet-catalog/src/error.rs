/// Errors that can occur while loading a catalog or coding message arguments.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A catalog document could not be loaded.
    #[error("failed to load catalog: {0}")]
    LoadFailed(String),

    /// A catalog document is not valid JSON or does not match the document shape.
    #[error("invalid catalog document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// A catalog document is well-formed but inconsistent.
    #[error("invalid catalog entry {path}: {reason}")]
    InvalidEntry { path: String, reason: String },

    /// Two messages share a path or a numeric identity.
    #[error("duplicate catalog entry: {0}")]
    Duplicate(String),

    /// An `expects.immediate` path does not name a catalog message.
    #[error("{path} expects unknown terminator {terminator}")]
    UnknownTerminator { path: String, terminator: String },

    /// Arguments were given in a shape the message cannot take.
    #[error("{path}: expected {expected} arguments, got {got}")]
    ArgumentCount {
        path: String,
        expected: usize,
        got: usize,
    },

    /// A named argument is missing.
    #[error("{path}: missing argument '{arg}'")]
    MissingArgument { path: String, arg: String },

    /// An argument value has the wrong JSON type or is out of range.
    #[error("{path}: invalid value for argument '{arg}' ({reason})")]
    InvalidArgument {
        path: String,
        arg: String,
        reason: String,
    },

    /// Argument bytes end before every declared argument was read.
    #[error("{path}: argument bytes truncated at '{arg}'")]
    TruncatedArguments { path: String, arg: String },
}

pub type Result<T> = std::result::Result<T, CatalogError>;
