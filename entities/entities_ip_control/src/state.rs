//! Endpoint State Module
//!
//! Explicit lifecycle tag carried by every endpoint handle.

/// Lifecycle of an endpoint
///
/// `Uninitialized` is the zero value: a handle in this state wraps no
/// connection and every operation on it must fail before touching the OS.
/// `Closed` is informational only. The wrapped connection is kept, and any
/// operation after close is forwarded so the connection itself reports the
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Zero value, no connection attached
    #[default]
    Uninitialized,
    /// Connection attached and usable
    Ready,
    /// `close` has been forwarded to the connection successfully
    Closed,
}

impl EndpointState {
    /// Whether operations may be forwarded to the wrapped connection
    pub fn is_usable(&self) -> bool {
        !matches!(self, EndpointState::Uninitialized)
    }
}
