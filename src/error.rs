use std::fmt::{self, Display, Formatter};

use crate::backend::BackendError;
use crate::navigator::NavigatorError;
use crate::path::PathError;

#[derive(Debug)]
pub struct DirNavError(String);

impl From<&'static str> for DirNavError {
    fn from(val: &'static str) -> Self {
        Self(val.to_string())
    }
}

impl From<String> for DirNavError {
    fn from(val: String) -> Self {
        Self(val)
    }
}

impl From<BackendError> for DirNavError {
    fn from(error: BackendError) -> Self {
        Self(error.to_string())
    }
}

impl From<NavigatorError> for DirNavError {
    fn from(error: NavigatorError) -> Self {
        Self(error.to_string())
    }
}

impl From<PathError> for DirNavError {
    fn from(error: PathError) -> Self {
        Self(error.to_string())
    }
}

impl Display for DirNavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DirNavError {}

pub type DirNavResult<T> = Result<T, DirNavError>;
