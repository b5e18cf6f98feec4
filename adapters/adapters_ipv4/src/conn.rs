//! Conn Module
//!
//! A network endpoint over any IPv4 transport, used to control basic
//! IP-level socket options such as TOS and TTL.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use entities_ip_control::EndpointState;
use socket2::Socket;
use tracing::debug;

use crate::capability::{DeadlineControl, Endpoint, GenericOptions, Readiness};
use crate::error::{EndpointError, Result};
use crate::handle::TransportHandle;
use crate::sys::{PlatformOptions, SysOptions};
use crate::transport::{SocketTransport, Transport};

/// IPv4 endpoint with generic options only
///
/// `Conn::default()` is the zero value; every operation on it fails with
/// `NotReady`.
#[derive(Debug)]
pub struct Conn<T, S = PlatformOptions> {
    generic: TransportHandle<T>,
    sys: S,
}

impl<T, S: Default> Default for Conn<T, S> {
    fn default() -> Self {
        Self {
            generic: TransportHandle::default(),
            sys: S::default(),
        }
    }
}

impl<T: Transport> Conn<T, PlatformOptions> {
    /// Create a Conn over `conn` using the platform's socket options
    pub fn new(conn: T) -> Self {
        Self::with_sys(conn, PlatformOptions)
    }
}

impl<T: Transport, S: SysOptions> Conn<T, S> {
    /// Create a Conn over `conn` using `sys` for OS option calls
    pub fn with_sys(conn: T, sys: S) -> Self {
        debug!(kind = %conn.kind(), "ipv4 conn created");
        Self {
            generic: TransportHandle::new(Arc::new(conn)),
            sys,
        }
    }
}

impl<S: SysOptions> Conn<SocketTransport, S> {
    /// Run `f` against the wrapped socket
    ///
    /// The socket stays open for the duration of `f`.
    pub fn with_socket<R>(&self, f: impl FnOnce(&Socket) -> io::Result<R>) -> Result<R> {
        self.generic
            .conn()?
            .with_socket(f)
            .map_err(EndpointError::Transport)
    }
}

impl<T: Transport, S: SysOptions> Readiness for Conn<T, S> {
    fn is_ready(&self) -> bool {
        self.generic.is_ready()
    }

    fn state(&self) -> EndpointState {
        self.generic.state()
    }
}

impl<T: Transport, S: SysOptions> DeadlineControl for Conn<T, S> {
    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.generic.set_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.generic.set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.generic.set_write_deadline(deadline)
    }
}

impl<T: Transport, S: SysOptions> GenericOptions for Conn<T, S> {
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

impl<T: Transport, S: SysOptions> Endpoint for Conn<T, S> {
    fn close(&mut self) -> Result<()> {
        self.generic.close()?;
        debug!("ipv4 conn closed");
        Ok(())
    }
}
