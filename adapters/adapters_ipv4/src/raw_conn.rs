//! RawConn Module
//!
//! A packet endpoint over a raw IPv4 transport for higher layer protocols
//! that handle IPv4 datagrams directly, such as OSPF or GRE. The IPv4 header
//! is always supplied by the application: header prepend is enabled when the
//! endpoint is constructed, and construction fails if the OS refuses it.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use entities_ip_control::{ControlFlags, EndpointState};
use socket2::Socket;
use tracing::debug;

use crate::capability::{
    ControlMessageControl, DatagramOptions, DeadlineControl, Endpoint, GenericOptions, Readiness,
};
use crate::error::{ConstructionError, ConstructionResult, EndpointError, Result};
use crate::handle::{DatagramCapability, PacketControlHandler, TransportHandle};
use crate::sys::{PlatformOptions, SysOptions};
use crate::transport::{SocketTransport, Transport};

/// Raw IPv4 endpoint
#[derive(Debug)]
pub struct RawConn<T, S = PlatformOptions> {
    generic: TransportHandle<T>,
    dgram: DatagramCapability<T>,
    packet: PacketControlHandler<T>,
    sys: S,
}

impl<T, S: Default> Default for RawConn<T, S> {
    fn default() -> Self {
        Self {
            generic: TransportHandle::default(),
            dgram: DatagramCapability::default(),
            packet: PacketControlHandler::default(),
            sys: S::default(),
        }
    }
}

impl<T: Transport> RawConn<T, PlatformOptions> {
    /// Create a RawConn over `conn` using the platform's socket options
    ///
    /// # Returns
    ///
    /// * `Ok(RawConn)` - Ready endpoint with header prepend enabled
    /// * `Err(ConstructionError)` - `conn` is not raw, has no descriptor, or
    ///   header prepend was refused; the error hands `conn` back
    pub fn new(conn: T) -> ConstructionResult<Self, T> {
        Self::with_sys(conn, PlatformOptions)
    }
}

impl<T: Transport, S: SysOptions> RawConn<T, S> {
    /// Create a RawConn over `conn` using `sys` for OS option calls
    ///
    /// On failure no endpoint is returned and `conn` comes back inside the
    /// error.
    pub fn with_sys(conn: T, sys: S) -> ConstructionResult<Self, T> {
        if let Err(error) = Self::prepare(&conn, &sys) {
            return Err(ConstructionError::new(error, conn));
        }
        debug!(kind = %conn.kind(), "ipv4 raw conn created");
        let conn = Arc::new(conn);
        Ok(Self {
            generic: TransportHandle::new(Arc::clone(&conn)),
            dgram: DatagramCapability::from_checked(Arc::clone(&conn)),
            packet: PacketControlHandler::from_checked(conn),
            sys,
        })
    }

    fn prepare(conn: &T, sys: &S) -> Result<()> {
        let kind = conn.kind();
        PacketControlHandler::<T>::check_kind(kind)?;
        DatagramCapability::<T>::check_kind(kind)?;
        PacketControlHandler::enable_header_prepend(conn, sys)
    }
}

impl<S: SysOptions> RawConn<SocketTransport, S> {
    /// Run `f` against the wrapped socket
    ///
    /// The socket stays open for the duration of `f`.
    pub fn with_socket<R>(&self, f: impl FnOnce(&Socket) -> io::Result<R>) -> Result<R> {
        self.packet
            .handle()
            .conn()?
            .with_socket(f)
            .map_err(EndpointError::Transport)
    }
}

impl<T: Transport, S: SysOptions> Readiness for RawConn<T, S> {
    fn is_ready(&self) -> bool {
        self.packet.is_ready()
    }

    fn state(&self) -> EndpointState {
        self.packet.handle().state()
    }
}

impl<T: Transport, S: SysOptions> ControlMessageControl for RawConn<T, S> {
    fn set_control_message(&mut self, cf: ControlFlags, on: bool) -> Result<()> {
        self.packet.set_control_message(&self.sys, cf, on)
    }

    fn control_flags(&self) -> ControlFlags {
        self.packet.flags()
    }
}

impl<T: Transport, S: SysOptions> DeadlineControl for RawConn<T, S> {
    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.packet.handle().set_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.packet.handle().set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.packet.handle().set_write_deadline(deadline)
    }
}

impl<T: Transport, S: SysOptions> GenericOptions for RawConn<T, S> {
    fn tos(&self) -> Result<u32> {
        self.generic.tos(&self.sys)
    }

    fn set_tos(&self, tos: u32) -> Result<()> {
        self.generic.set_tos(&self.sys, tos)
    }

    fn ttl(&self) -> Result<u32> {
        self.generic.ttl(&self.sys)
    }

    fn set_ttl(&self, ttl: u32) -> Result<()> {
        self.generic.set_ttl(&self.sys, ttl)
    }
}

impl<T: Transport, S: SysOptions> DatagramOptions for RawConn<T, S> {
    fn multicast_ttl(&self) -> Result<u32> {
        self.dgram.multicast_ttl(&self.sys)
    }

    fn set_multicast_ttl(&self, ttl: u32) -> Result<()> {
        self.dgram.set_multicast_ttl(&self.sys, ttl)
    }

    fn multicast_loopback(&self) -> Result<bool> {
        self.dgram.multicast_loopback(&self.sys)
    }

    fn set_multicast_loopback(&self, on: bool) -> Result<()> {
        self.dgram.set_multicast_loopback(&self.sys, on)
    }

    fn join_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
        self.dgram.join_group(&self.sys, group, interface)
    }

    fn leave_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
        self.dgram.leave_group(&self.sys, group, interface)
    }
}

impl<T: Transport, S: SysOptions> Endpoint for RawConn<T, S> {
    fn close(&mut self) -> Result<()> {
        self.packet.handle_mut().close()?;
        self.generic.mark_closed();
        self.dgram.mark_closed();
        debug!("ipv4 raw conn closed");
        Ok(())
    }
}
