//! Error Module
//!
//! Error taxonomy shared by all endpoints. Failures coming from the operating
//! system are carried unmodified so callers can inspect the original errno.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::transport::TransportKind;

/// Endpoint error types
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint or handle is the zero value and wraps no connection
    #[error("invalid argument: endpoint is not initialized")]
    NotReady,
    /// An argument was rejected before any OS interaction
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The wrapped connection is not of the kind the endpoint requires
    #[error("invalid argument: expected {expected} transport, got {actual}")]
    WrongTransportKind {
        /// Kind the endpoint requires
        expected: &'static str,
        /// Kind the connection reported
        actual: TransportKind,
    },
    /// The wrapped connection could not yield a system file descriptor
    #[error("system file descriptor unavailable: {0}")]
    DescriptorUnavailable(#[source] io::Error),
    /// The OS rejected a socket option change
    #[error("socket option failed: {0}")]
    OsOption(#[source] io::Error),
    /// The wrapped connection failed a deadline or close request
    #[error("connection error: {0}")]
    Transport(#[source] io::Error),
}

impl EndpointError {
    /// The underlying OS error, if this error wraps one
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            EndpointError::DescriptorUnavailable(e)
            | EndpointError::OsOption(e)
            | EndpointError::Transport(e) => Some(e),
            _ => None,
        }
    }

    /// The raw errno of the underlying OS error
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// Whether this is one of the "invalid argument" failures raised locally
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            EndpointError::NotReady
                | EndpointError::InvalidArgument(_)
                | EndpointError::WrongTransportKind { .. }
        )
    }
}

impl From<EndpointError> for io::Error {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::DescriptorUnavailable(e)
            | EndpointError::OsOption(e)
            | EndpointError::Transport(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// Result type for endpoint operations
pub type Result<T> = std::result::Result<T, EndpointError>;

/// Failed endpoint construction
///
/// Carries the connection back to the caller, who still owns it and is
/// responsible for closing it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ConstructionError<T: fmt::Debug> {
    #[source]
    error: EndpointError,
    conn: T,
}

impl<T: fmt::Debug> ConstructionError<T> {
    pub(crate) fn new(error: EndpointError, conn: T) -> Self {
        Self { error, conn }
    }

    /// Why construction failed
    pub fn error(&self) -> &EndpointError {
        &self.error
    }

    /// The connection handed to the constructor, untouched
    pub fn into_inner(self) -> T {
        self.conn
    }

    /// Split into the failure and the connection
    pub fn into_parts(self) -> (EndpointError, T) {
        (self.error, self.conn)
    }
}

impl<T: fmt::Debug> From<ConstructionError<T>> for EndpointError {
    fn from(err: ConstructionError<T>) -> Self {
        err.error
    }
}

/// Result type for endpoint constructors
pub type ConstructionResult<E, T> = std::result::Result<E, ConstructionError<T>>;
