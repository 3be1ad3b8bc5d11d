//! Errors raised while talking to the backend

use std::error;

use reqwest::StatusCode;
use thiserror::Error;
use tuvino_tokens::store::StoreError;

/// The session can no longer be used and the user must sign in again
///
/// Raised when a request was rejected with `401 Unauthorized` and the stored
/// refresh token could not be exchanged for a new access token.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("session expired")]
pub struct SessionExpired;

/// An error performing an API request
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or no response was received
    #[error("error sending request to backend")]
    Network(#[source] reqwest::Error),
    /// The backend responded with a non-success status
    #[error("backend responded with {status}")]
    Status {
        /// The response status
        status: StatusCode,
        /// The response body, for diagnostics
        body: String,
    },
    /// The access token was rejected and could not be refreshed
    #[error(transparent)]
    SessionExpired(#[from] SessionExpired),
    /// The request path does not form a valid URL
    #[error("invalid request URL")]
    InvalidUrl(#[from] url::ParseError),
    /// The request body could not be serialized
    #[error("error serializing request body")]
    Body(#[source] serde_json::Error),
    /// The response could not be decoded into the expected type
    #[error("error decoding response body")]
    Decode(#[source] serde_json::Error),
    /// The token store could not be accessed
    #[error("error accessing stored tokens")]
    Store(#[from] StoreError),
    /// A middleware in the request stack failed
    #[error("error in request middleware")]
    Middleware(#[source] Box<dyn error::Error + Send + Sync + 'static>),
}

impl ApiError {
    /// The HTTP status the backend responded with, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the user must sign in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

impl From<reqwest_middleware::Error> for ApiError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => Self::Network(err),
            reqwest_middleware::Error::Middleware(err) => {
                if let Some(expired) = err.downcast_ref::<SessionExpired>() {
                    Self::SessionExpired(*expired)
                } else {
                    Self::Middleware(err.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expiry_survives_the_middleware_boundary() {
        let err = reqwest_middleware::Error::middleware(SessionExpired);

        let api_err = ApiError::from(err);

        assert!(api_err.is_session_expired());
        assert_eq!(api_err.to_string(), "session expired");
    }

    #[test]
    fn status_errors_carry_the_status() {
        let err = ApiError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(!err.is_session_expired());
    }
}
