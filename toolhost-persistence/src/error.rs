//! Grounded on `r2e-data::error::DataError`: a small taxonomy distinguishing
//! "not found" from a backend-level failure, with a `source()` that keeps
//! the original error around for logging.

use std::fmt;

#[derive(Debug)]
pub enum DataError {
    NotFound(String),
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl DataError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Backend(Box::new(err))
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::NotFound(id) => write!(f, "record not found: {id}"),
            DataError::Backend(err) => write!(f, "backend error: {err}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::NotFound(_) => None,
            DataError::Backend(err) => Some(err.as_ref()),
        }
    }
}
