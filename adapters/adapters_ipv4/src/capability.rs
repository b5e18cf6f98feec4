//! Capability Traits
//!
//! Each endpoint type declares, through the traits it implements, exactly
//! which operations it supports. Every operation checks readiness first and
//! fails with [`EndpointError::NotReady`](crate::EndpointError::NotReady) on
//! a zero-value endpoint.

use std::net::Ipv4Addr;
use std::time::Instant;

use entities_ip_control::{ControlFlags, EndpointState};

use crate::error::Result;

/// Readiness of an endpoint
pub trait Readiness {
    /// True iff the endpoint wraps a connection
    fn is_ready(&self) -> bool;

    /// Lifecycle state
    fn state(&self) -> EndpointState;
}

/// Deadlines forwarded to the wrapped connection
///
/// `None` clears a deadline. An expired deadline makes pending and future
/// I/O fail with a timeout.
pub trait DeadlineControl: Readiness {
    /// Set the read and write deadlines
    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()>;

    /// Set the read deadline
    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()>;

    /// Set the write deadline
    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()>;
}

/// Per-packet control messages
pub trait ControlMessageControl: Readiness {
    /// Enable (`on == true`) or disable the control-message classes `cf`
    fn set_control_message(&mut self, cf: ControlFlags, on: bool) -> Result<()>;

    /// Classes currently enabled on this endpoint
    fn control_flags(&self) -> ControlFlags;
}

/// IP-level options every endpoint supports
pub trait GenericOptions: Readiness {
    /// Type-of-service field for outgoing packets
    fn tos(&self) -> Result<u32>;

    /// Set the type-of-service field for outgoing packets
    fn set_tos(&self, tos: u32) -> Result<()>;

    /// Time-to-live for outgoing packets
    fn ttl(&self) -> Result<u32>;

    /// Set the time-to-live for outgoing packets
    fn set_ttl(&self, ttl: u32) -> Result<()>;
}

/// Multicast options of packet-oriented endpoints
pub trait DatagramOptions: Readiness {
    /// Time-to-live for outgoing multicast packets
    fn multicast_ttl(&self) -> Result<u32>;

    /// Set the time-to-live for outgoing multicast packets
    fn set_multicast_ttl(&self, ttl: u32) -> Result<()>;

    /// Whether outgoing multicast packets are looped back
    fn multicast_loopback(&self) -> Result<bool>;

    /// Set whether outgoing multicast packets are looped back
    fn set_multicast_loopback(&self, on: bool) -> Result<()>;

    /// Join `group` on the interface with address `interface`
    /// (`Ipv4Addr::UNSPECIFIED` lets the OS choose)
    fn join_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()>;

    /// Leave `group` on the interface with address `interface`
    fn leave_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()>;
}

/// Lifecycle of an endpoint
pub trait Endpoint: DeadlineControl {
    /// Close the wrapped connection
    ///
    /// Calls made after a successful close are forwarded and fail with the
    /// connection's own "closed" error.
    fn close(&mut self) -> Result<()>;
}
