//! PacketConn Module
//!
//! A packet endpoint over a datagram (or raw) IPv4 transport. On top of the
//! generic options it controls multicasting and per-packet control messages
//! for higher layer protocols such as UDP.

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
use crate::handle::{DatagramCapability, PayloadControlHandler, TransportHandle};
use crate::sys::{PlatformOptions, SysOptions};
use crate::transport::{SocketTransport, Transport};

/// IPv4 packet endpoint
///
/// Composed of a generic handle, a datagram view and a payload-level
/// control-message handler, all over the same connection. Deadlines and
/// close go through the control handler's connection.
#[derive(Debug)]
pub struct PacketConn<T, S = PlatformOptions> {
    generic: TransportHandle<T>,
    dgram: DatagramCapability<T>,
    payload: PayloadControlHandler<T>,
    sys: S,
}

impl<T, S: Default> Default for PacketConn<T, S> {
    fn default() -> Self {
        Self {
            generic: TransportHandle::default(),
            dgram: DatagramCapability::default(),
            payload: PayloadControlHandler::default(),
            sys: S::default(),
        }
    }
}

impl<T: Transport> PacketConn<T, PlatformOptions> {
    /// Create a PacketConn over `conn` using the platform's socket options
    ///
    /// # Returns
    ///
    /// * `Ok(PacketConn)` - Ready endpoint
    /// * `Err(ConstructionError)` - `conn` is a stream; the error hands it back
    pub fn new(conn: T) -> ConstructionResult<Self, T> {
        Self::with_sys(conn, PlatformOptions)
    }
}

impl<T: Transport, S: SysOptions> PacketConn<T, S> {
    /// Create a PacketConn over `conn` using `sys` for OS option calls
    pub fn with_sys(conn: T, sys: S) -> ConstructionResult<Self, T> {
        if let Err(error) = DatagramCapability::<T>::check_kind(conn.kind()) {
            return Err(ConstructionError::new(error, conn));
        }
        debug!(kind = %conn.kind(), "ipv4 packet conn created");
        let conn = Arc::new(conn);
        Ok(Self {
            generic: TransportHandle::new(Arc::clone(&conn)),
            dgram: DatagramCapability::from_checked(Arc::clone(&conn)),
            payload: PayloadControlHandler::new(conn),
            sys,
        })
    }
}

impl<S: SysOptions> PacketConn<SocketTransport, S> {
    /// Run `f` against the wrapped socket
    ///
    /// The socket stays open for the duration of `f`.
    pub fn with_socket<R>(&self, f: impl FnOnce(&Socket) -> io::Result<R>) -> Result<R> {
        self.payload
            .handle()
            .conn()?
            .with_socket(f)
            .map_err(EndpointError::Transport)
    }
}

impl<T: Transport, S: SysOptions> Readiness for PacketConn<T, S> {
    fn is_ready(&self) -> bool {
        self.payload.is_ready()
    }

    fn state(&self) -> EndpointState {
        self.payload.handle().state()
    }
}

impl<T: Transport, S: SysOptions> ControlMessageControl for PacketConn<T, S> {
    fn set_control_message(&mut self, cf: ControlFlags, on: bool) -> Result<()> {
        self.payload.set_control_message(&self.sys, cf, on)
    }

    fn control_flags(&self) -> ControlFlags {
        self.payload.flags()
    }
}

impl<T: Transport, S: SysOptions> DeadlineControl for PacketConn<T, S> {
    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.payload.handle().set_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.payload.handle().set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.payload.handle().set_write_deadline(deadline)
    }
}

impl<T: Transport, S: SysOptions> GenericOptions for PacketConn<T, S> {
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

impl<T: Transport, S: SysOptions> DatagramOptions for PacketConn<T, S> {
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

impl<T: Transport, S: SysOptions> Endpoint for PacketConn<T, S> {
    fn close(&mut self) -> Result<()> {
        self.payload.handle_mut().close()?;
        self.generic.mark_closed();
        self.dgram.mark_closed();
        debug!("ipv4 packet conn closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::MockSysOptions;
    use crate::transport::{MockTransport, TransportKind};
    use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

    fn datagram(fd: i32) -> MockTransport {
        let mut conn = MockTransport::new();
        conn.expect_kind().return_const(TransportKind::Datagram);
        conn.expect_sysfd().returning(move || Ok(fd));
        conn
    }

    #[test]
    fn test_zero_value_packet_conn() {
        let mut conn = PacketConn::<MockTransport, MockSysOptions>::default();
        assert!(!conn.is_ready());
        assert!(matches!(
            conn.set_control_message(ControlFlags::TTL, true),
            Err(EndpointError::NotReady)
        ));
        assert!(matches!(conn.set_deadline(None), Err(EndpointError::NotReady)));
        assert!(matches!(conn.multicast_ttl(), Err(EndpointError::NotReady)));
        assert!(matches!(
            conn.join_group(Ipv4Addr::new(224, 0, 0, 1), Ipv4Addr::UNSPECIFIED),
            Err(EndpointError::NotReady)
        ));
        assert!(matches!(conn.close(), Err(EndpointError::NotReady)));
        assert!(conn.control_flags().is_empty());
    }

    #[test]
    fn test_rejects_stream_transport() {
        let mut transport = MockTransport::new();
        transport.expect_kind().return_const(TransportKind::Stream);
        let sys = MockSysOptions::new();

        let err = PacketConn::with_sys(transport, sys).unwrap_err();
        assert!(matches!(err.error(), EndpointError::WrongTransportKind { .. }));
    }

    #[test]
    fn test_rejected_stream_is_handed_back_open() {
        let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let err = PacketConn::new(SocketTransport::from_tcp(stream)).unwrap_err();
        let transport = err.into_inner();
        assert!(!transport.is_closed());
        transport.set_deadline(None).unwrap();
        transport.close().unwrap();
    }

    #[test]
    fn test_with_socket_until_closed() {
        let socket = UdpSocket::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).unwrap();
        let addr = socket.local_addr().unwrap();
        let mut conn = PacketConn::new(SocketTransport::from_udp(socket)).unwrap();

        let local = conn.with_socket(|s| s.local_addr()).unwrap();
        assert_eq!(local.as_socket(), Some(addr));

        conn.close().unwrap();
        let err = conn.with_socket(|s| s.local_addr()).unwrap_err();
        assert!(matches!(err, EndpointError::Transport(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }

    #[test]
    fn test_set_control_message_on_then_off() {
        let mut sys = MockSysOptions::new();
        let cf = ControlFlags::TTL | ControlFlags::INTERFACE;
        sys.expect_set_control_message()
            .withf(move |_, current, flags, on| current.is_empty() && *flags == cf && *on)
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        sys.expect_set_control_message()
            .withf(move |_, current, flags, on| *current == cf && *flags == cf && !*on)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut conn = PacketConn::with_sys(datagram(3), sys).unwrap();
        conn.set_control_message(cf, true).unwrap();
        assert_eq!(conn.control_flags(), cf);
        conn.set_control_message(cf, false).unwrap();
        assert!(conn.control_flags().is_empty());
    }

    #[test]
    fn test_failed_call_keeps_previous_flags() {
        let mut sys = MockSysOptions::new();
        let mut seq = mockall::Sequence::new();
        sys.expect_set_control_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        sys.expect_set_control_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Err(io::Error::from_raw_os_error(92)));

        let mut conn = PacketConn::with_sys(datagram(3), sys).unwrap();
        conn.set_control_message(ControlFlags::TTL, true).unwrap();
        let err = conn
            .set_control_message(ControlFlags::TTL, false)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(92));
        assert_eq!(conn.control_flags(), ControlFlags::TTL);
    }

    #[test]
    fn test_close_then_operations_report_closed() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport.expect_kind().return_const(TransportKind::Datagram);
        transport
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        transport
            .expect_set_deadline()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotConnected, "closed")));
        transport
            .expect_sysfd()
            .returning(|| Err(io::Error::new(io::ErrorKind::NotConnected, "closed")));
        let sys = MockSysOptions::new();

        let mut conn = PacketConn::with_sys(transport, sys).unwrap();
        conn.close().unwrap();
        assert_eq!(conn.state(), EndpointState::Closed);

        assert!(matches!(conn.set_deadline(None), Err(EndpointError::Transport(_))));
        assert!(matches!(
            conn.set_control_message(ControlFlags::DST, true),
            Err(EndpointError::DescriptorUnavailable(_))
        ));
    }

    #[test]
    fn test_multicast_options_forwarded() {
        let mut sys = MockSysOptions::new();
        sys.expect_set_multicast_ttl()
            .withf(|fd, ttl| *fd == 3 && *ttl == 8)
            .times(1)
            .returning(|_, _| Ok(()));
        sys.expect_multicast_loopback()
            .times(1)
            .returning(|_| Ok(true));
        let group = Ipv4Addr::new(239, 1, 2, 3);
        sys.expect_leave_group()
            .withf(move |_, g, _| *g == group)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let conn = PacketConn::with_sys(datagram(3), sys).unwrap();
        conn.set_multicast_ttl(8).unwrap();
        assert!(conn.multicast_loopback().unwrap());
        conn.leave_group(group, Ipv4Addr::UNSPECIFIED).unwrap();
    }
}
