//! Error types.
//!
//! Two families live here. [`Error`] surfaces infrastructure failures of the
//! server itself: binding a port, accepting a connection. [`HandlerError`] is
//! what handlers and middleware return when a request cannot be served; each
//! variant maps to one HTTP status.

use http::StatusCode;

/// The error type returned by the server's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A request-level failure.
///
/// Route handlers usually catch their domain errors and answer with a JSON
/// body themselves. Whatever they let through is translated by
/// [`ErrorHandler`](crate::middleware::ErrorHandler) or, on plain routes, by
/// the router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Bad or missing input.
    #[error("{0}")]
    Validation(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Lookup miss. Answered with 400, not 404: a token that matches nothing
    /// is a bad request from the caller's point of view.
    #[error("{0}")]
    NotFound(String),

    /// Anything unexpected. The message is shown to the caller verbatim, so it
    /// must never carry internal detail.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)    => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound(_)      => StatusCode::BAD_REQUEST,
            Self::Internal(_)      => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What every handler and middleware resolves to.
pub type HandlerResult = Result<crate::response::Response, HandlerError>;
