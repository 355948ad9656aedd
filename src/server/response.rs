//! Uniform shaping of error responses.
//!
//! Every failure response is `text/plain` with a trailing newline. Errors
//! that occur after response headers are committed cannot be shaped this
//! way; the stream generators surface those as
//! [`Error::StreamAbort`](crate::Error::StreamAbort), which terminates the
//! chunked body instead of producing an [`ApiError`].

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::Error;

/// The fixed body served when a request runs out of memory or another
/// resource the store reports as exhausted.
const OOM_BODY: &str = "Out of memory.";

/// A request-phase failure, shaped into an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Bad range, bad query argument, missing cursor under discrete, bad seek.
    Parse(String),
    /// Unknown URL or unreadable static asset.
    NotFound(String),
    /// Journal or probe failure before streaming started.
    Server(String),
    /// Resource exhaustion reported by a collaborator.
    Oom,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Oom => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = match self {
            ApiError::Parse(message)
            | ApiError::NotFound(message)
            | ApiError::Server(message) => message,
            ApiError::Oom => OOM_BODY.to_string(),
        };
        if !body.ends_with('\n') {
            body.push('\n');
        }
        (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => ApiError::Parse(message),
            other => ApiError::Server(other.to_string()),
        }
    }
}
