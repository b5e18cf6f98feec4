//! Adapters Layer: IPv4 Endpoints
//!
//! Provides a typed control surface over IPv4 sockets. Three endpoint shapes
//! are offered, each composed from a fixed set of capabilities:
//!
//! | Endpoint       | Generic options | Datagram options | Control messages | Header prepend |
//! |----------------|-----------------|------------------|------------------|----------------|
//! | [`Conn`]       | yes             |                  |                  |                |
//! | [`PacketConn`] | yes             | yes              | payload level    |                |
//! | [`RawConn`]    | yes             | yes              | packet level     | always on      |
//!
//! ## Overview
//!
//! - **[`transport`]**: The connection abstraction every endpoint wraps, and a
//!   `socket2`-backed implementation
//! - **[`sys`]**: The OS option collaborator. All platform-specific socket
//!   option codes live behind [`SysOptions`]
//! - **[`handle`]**: Capability handles that check readiness and resolve the
//!   system file descriptor before any OS interaction
//! - **[`capability`]**: Traits naming each capability an endpoint declares
//! - **[`conn`]**, **[`packet_conn`]**, **[`raw_conn`]**: The endpoint facades
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::net::UdpSocket;
//! use adapters_ipv4::{ControlFlags, ControlMessageControl, PacketConn, SocketTransport};
//!
//! let socket = UdpSocket::bind("127.0.0.1:0")?;
//! let mut conn = PacketConn::new(SocketTransport::from_udp(socket))?;
//! conn.set_control_message(ControlFlags::TTL | ControlFlags::INTERFACE, true)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## See Also
//!
//! - [`entities_ip_control`](../entities_ip_control/index.html): Control flags and endpoint state

pub mod capability;
pub mod conn;
pub mod error;
pub mod handle;
pub mod packet_conn;
pub mod raw_conn;
pub mod sys;
pub mod transport;

pub use capability::{
    ControlMessageControl, DatagramOptions, DeadlineControl, Endpoint, GenericOptions, Readiness,
};
pub use conn::Conn;
pub use entities_ip_control::{ControlFlags, EndpointState, RawOptionState};
pub use error::{ConstructionError, ConstructionResult, EndpointError, Result};
pub use handle::{DatagramCapability, PacketControlHandler, PayloadControlHandler, TransportHandle};
pub use packet_conn::PacketConn;
pub use raw_conn::RawConn;
pub use sys::{PlatformOptions, SysOptions};
pub use transport::{SocketTransport, Transport, TransportKind};
