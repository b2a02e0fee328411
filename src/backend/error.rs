/// Failures reported by a storage backend. Implementations should map their native errors onto
/// the specific kinds where one fits, the navigator relies on [`BackendError::NotFound`] to tell
/// missing entries apart from everything else.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// An error that couldn't be represented by one of the standard kinds, specific to the
    /// underlying implementation.
    #[error("implementation specific error: {0}")]
    Implementation(String),

    #[error("name is not usable as a directory entry: {0:?}")]
    InvalidName(String),

    #[error("I/O failure in the backend: {0}")]
    Io(#[from] std::io::Error),

    /// The named child does not exist and was not created.
    #[error("no entry named {0:?}")]
    NotFound(String),

    /// The permission system refused access to the entry.
    #[error("access to {0:?} was denied")]
    PermissionDenied(String),

    /// An entry with the requested name exists but is not of the requested kind.
    #[error("entry {0:?} exists but is the wrong kind of entry")]
    TypeMismatch(String),
}
