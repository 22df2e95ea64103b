//! Error types for the chaining dispatcher and its test server.
//!
//! Request-path failures never escape `ChainingHandler::handle`. They are
//! parked in the request's outcome as a [`ChainError`] and surface together
//! as one [`MultiCauseError`] from `assert_complete`.

use std::any::Any;
use std::sync::Arc;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

// region -- ChainError

#[derive(Debug, derive_more::From)]
pub enum ChainError {
    /// No handler in the chain claimed the request.
    #[from(ignore)]
    UnexpectedRequest { method: String, path: String },

    /// A handler failed while being asked whether it claims the request.
    #[from(ignore)]
    MatchFailed {
        method: String,
        path: String,
        source: BoxedError,
    },

    /// The claiming handler's writer failed while producing the response.
    #[from(ignore)]
    WriteFailed {
        method: String,
        path: String,
        source: BoxedError,
    },

    /// A handler's own end-of-run check failed.
    HandlerIncomplete(BoxedError),
}

impl ChainError {
    #[must_use]
    pub fn unexpected_request(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnexpectedRequest {
            method: method.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn match_failed(
        method: impl Into<String>,
        path: impl Into<String>,
        source: BoxedError,
    ) -> Self {
        Self::MatchFailed {
            method: method.into(),
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn write_failed(
        method: impl Into<String>,
        path: impl Into<String>,
        source: BoxedError,
    ) -> Self {
        Self::WriteFailed {
            method: method.into(),
            path: path.into(),
            source,
        }
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnexpectedRequest { .. } => None,
            Self::MatchFailed { source, .. }
            | Self::WriteFailed { source, .. }
            | Self::HandlerIncomplete(source) => Some(source.as_ref()),
        }
    }
}

impl core::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedRequest { method, path } => {
                write!(f, "Received unexpected request {method} {path}")
            }
            Self::MatchFailed { method, path, .. } | Self::WriteFailed { method, path, .. } => {
                write!(f, "Failed to handle {method} {path}")
            }
            Self::HandlerIncomplete(source) => write!(f, "{source}"),
        }
    }
}

// --- end region: ChainError

// region -- MultiCauseError

/// Every failure recorded over a run, kept as discrete causes.
#[derive(Debug, Clone)]
pub struct MultiCauseError {
    message: String,
    causes: Vec<Arc<ChainError>>,
}

impl MultiCauseError {
    #[must_use]
    pub fn new(message: impl Into<String>, causes: Vec<Arc<ChainError>>) -> Self {
        Self {
            message: message.into(),
            causes,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn causes(&self) -> &[Arc<ChainError>] {
        &self.causes
    }
}

impl std::error::Error for MultiCauseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes
            .first()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl core::fmt::Display for MultiCauseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for (index, cause) in self.causes.iter().enumerate() {
            write!(f, "\n  Cause {}: {cause}", index + 1)?;
            if let Some(inner) = std::error::Error::source(cause.as_ref()) {
                write!(f, " (caused by: {inner})")?;
            }
        }
        Ok(())
    }
}

// --- end region: MultiCauseError

// region -- ServerError

pub type ServerResult<T> = core::result::Result<T, ServerError>;

#[derive(Debug, derive_more::From)]
pub enum ServerError {
    Io(std::io::Error),

    #[from(ignore)]
    MalformedRequest(String),

    /// The request line and headers exceeded the configured limit.
    #[from(ignore)]
    RequestTooLarge(usize),

    /// The announced or streamed body exceeded the configured limit.
    #[from(ignore)]
    BodyTooLarge(usize),
}

impl ServerError {
    pub fn malformed<T>(val: T) -> Self
    where
        T: std::fmt::Display,
    {
        Self::MalformedRequest(val.to_string())
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::MalformedRequest(reason) => write!(f, "malformed request: {reason}"),
            Self::RequestTooLarge(limit) => {
                write!(f, "request head exceeds {limit} bytes")
            }
            Self::BodyTooLarge(limit) => write!(f, "request body exceeds {limit} bytes"),
        }
    }
}

// --- end region: ServerError

// region -- PanicError

/// A panic caught while running handler code, kept as an ordinary error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError(String);

impl PanicError {
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(message)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl std::error::Error for PanicError {}

impl core::fmt::Display for PanicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panicked: {}", self.0)
    }
}

/// Runs collaborator code, folding a panic into the returned error.
pub(crate) fn catch_panics<T, F>(call: F) -> Result<T, BoxedError>
where
    F: FnOnce() -> Result<T, BoxedError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(PanicError::from_payload(payload.as_ref()))),
    }
}

// --- end region: PanicError
