use serde::Deserialize;

use crate::nav::NavigationError;
use crate::store::StoreError;

/// Shape of error bodies returned by the backend.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, alias = "message")]
    pub error: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("unauthorized")] Unauthorized,
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")] Network(String),
    #[error("invalid response body: {0}")] Decode(String),
}

impl ApiError {
    /// Map a non-success HTTP status (and optional body) onto the taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            404 => ApiError::NotFound,
            409 => ApiError::Conflict,
            401 | 403 => ApiError::Unauthorized,
            _ => {
                let message = serde_json::from_str::<ApiErrorBody>(body)
                    .ok()
                    .and_then(|b| b.error)
                    .unwrap_or_else(|| body.trim().to_string());
                ApiError::Status { status, message }
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures of workspace-level operations.
#[derive(thiserror::Error, Debug)]
pub enum KbError {
    #[error(transparent)] Api(#[from] ApiError),
    #[error(transparent)] Navigation(#[from] NavigationError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error("authentication required")] AuthRequired,
    #[error("confirmation does not match: {0}")] Confirmation(String),
}

pub type KbResult<T> = Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::from_status(404, ""), ApiError::NotFound);
        assert_eq!(ApiError::from_status(409, "dup"), ApiError::Conflict);
        assert_eq!(ApiError::from_status(403, ""), ApiError::Unauthorized);
        assert_eq!(
            ApiError::from_status(500, r#"{"error":"boom"}"#),
            ApiError::Status { status: 500, message: "boom".into() }
        );
        assert_eq!(
            ApiError::from_status(502, "bad gateway"),
            ApiError::Status { status: 502, message: "bad gateway".into() }
        );
    }
}
