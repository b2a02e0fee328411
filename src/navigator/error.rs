use crate::backend::BackendError;
use crate::path::PathError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NavigatorError {
    /// Several concurrently launched operations failed, reported once all of them settled.
    #[error("{} concurrent operations failed, first failure: {}", .0.len(), first_failure(.0))]
    Aggregate(Vec<NavigatorError>),

    #[error("storage backend failed: {0}")]
    Backend(BackendError),

    #[error("path traverses above its starting directory: {0}")]
    InvalidTraversal(String),

    #[error("file content was not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("provided path or handle was not found: {0}")]
    NotFound(String),

    #[error("unable to make use of an empty path")]
    UnexpectedEmptyPath,
}

impl NavigatorError {
    /// Whether this error, or any error it aggregates, is a missing entry.
    pub fn is_not_found(&self) -> bool {
        match self {
            NavigatorError::NotFound(_) => true,
            NavigatorError::Aggregate(errors) => errors.iter().any(NavigatorError::is_not_found),
            _ => false,
        }
    }
}

impl From<BackendError> for NavigatorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(name) => NavigatorError::NotFound(name),
            err => NavigatorError::Backend(err),
        }
    }
}

impl From<PathError> for NavigatorError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidTraversal(path) => NavigatorError::InvalidTraversal(path),
        }
    }
}

fn first_failure(errors: &[NavigatorError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

/// Pools the outcome of sibling operations that were all awaited together. A single failure is
/// returned as-is, more than one becomes [`NavigatorError::Aggregate`].
pub(crate) fn settle<T>(
    results: impl IntoIterator<Item = Result<T, NavigatorError>>,
) -> Result<Vec<T>, NavigatorError> {
    let mut values = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => errors.push(err),
        }
    }

    match errors.len() {
        0 => Ok(values),
        1 => Err(errors.remove(0)),
        _ => Err(NavigatorError::Aggregate(errors)),
    }
}
