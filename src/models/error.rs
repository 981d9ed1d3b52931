use std::fmt;

/// Failure of a persistence call.
///
/// No partial success: the caller either gets the full authoritative list
/// back or one of these.
#[derive(Debug)]
pub enum StoreError {
    /// Transport-level failure reaching the CRUD API.
    Http(reqwest::Error),
    /// Non-success HTTP status from the CRUD API.
    Status(u16),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Http(e) => write!(f, "Request error: {}", e),
            StoreError::Status(code) => write!(f, "Unexpected status code: {}", code),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Http(e) => Some(e),
            StoreError::Status(_) => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Http(e)
    }
}
