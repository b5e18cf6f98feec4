//! Capability Handle Module
//!
//! The building blocks the endpoint facades are composed from. Each handle
//! carries an explicit [`EndpointState`] tag next to its connection reference
//! and checks it before touching the connection, so a zero-value handle fails
//! with [`EndpointError::NotReady`] without any OS interaction.
//!
//! - [`TransportHandle`]: generic connection ops (deadlines, close, TOS/TTL)
//! - [`DatagramCapability`]: packet-oriented view (multicast options)
//! - [`PayloadControlHandler`]: per-packet control messages for datagram endpoints
//! - [`PacketControlHandler`]: per-packet control messages for raw endpoints,
//!   plus one-time header prepend enablement

use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Instant;

use entities_ip_control::{ControlFlags, EndpointState, RawOptionState};
use tracing::{debug, trace};

use crate::error::{EndpointError, Result};
use crate::sys::SysOptions;
use crate::transport::{Transport, TransportKind};

/// Generic connection handle
///
/// Holds one reference to the wrapped connection. The handle owns no OS
/// resource itself; closing goes through the connection.
#[derive(Debug)]
pub struct TransportHandle<T> {
    state: EndpointState,
    conn: Option<Arc<T>>,
}

impl<T> Default for TransportHandle<T> {
    fn default() -> Self {
        Self {
            state: EndpointState::Uninitialized,
            conn: None,
        }
    }
}

impl<T: Transport> TransportHandle<T> {
    /// Create a ready handle over `conn`
    pub fn new(conn: Arc<T>) -> Self {
        Self {
            state: EndpointState::Ready,
            conn: Some(conn),
        }
    }

    /// True iff the handle is initialized and wraps a connection
    pub fn is_ready(&self) -> bool {
        self.state.is_usable() && self.conn.is_some()
    }

    /// Lifecycle state
    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// The wrapped connection, or `NotReady` for a zero-value handle
    pub fn conn(&self) -> Result<&T> {
        if !self.state.is_usable() {
            return Err(EndpointError::NotReady);
        }
        self.conn.as_deref().ok_or(EndpointError::NotReady)
    }

    /// Resolve the system file descriptor of the wrapped connection
    pub fn sysfd(&self) -> Result<RawFd> {
        self.conn()?
            .sysfd()
            .map_err(EndpointError::DescriptorUnavailable)
    }

    /// Forward a read+write deadline to the connection
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.conn()?
            .set_deadline(deadline)
            .map_err(EndpointError::Transport)
    }

    /// Forward a read deadline to the connection
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.conn()?
            .set_read_deadline(deadline)
            .map_err(EndpointError::Transport)
    }

    /// Forward a write deadline to the connection
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.conn()?
            .set_write_deadline(deadline)
            .map_err(EndpointError::Transport)
    }

    /// Close the wrapped connection and mark the handle closed
    ///
    /// The connection reference is kept, so later calls reach the connection
    /// and report its "closed" error.
    pub fn close(&mut self) -> Result<()> {
        self.conn()?.close().map_err(EndpointError::Transport)?;
        self.mark_closed();
        Ok(())
    }

    pub(crate) fn mark_closed(&mut self) {
        if self.conn.is_some() {
            self.state = EndpointState::Closed;
        }
    }

    /// Run an OS option call against the resolved descriptor
    pub(crate) fn with_fd<R>(&self, f: impl FnOnce(RawFd) -> std::io::Result<R>) -> Result<R> {
        let fd = self.sysfd()?;
        f(fd).map_err(EndpointError::OsOption)
    }

    /// Type-of-service field for outgoing packets
    pub fn tos<S: SysOptions + ?Sized>(&self, sys: &S) -> Result<u32> {
        self.with_fd(|fd| sys.tos(fd))
    }

    /// Set the type-of-service field for outgoing packets
    pub fn set_tos<S: SysOptions + ?Sized>(&self, sys: &S, tos: u32) -> Result<()> {
        self.with_fd(|fd| sys.set_tos(fd, tos))
    }

    /// Time-to-live for outgoing packets
    pub fn ttl<S: SysOptions + ?Sized>(&self, sys: &S) -> Result<u32> {
        self.with_fd(|fd| sys.ttl(fd))
    }

    /// Set the time-to-live for outgoing packets
    pub fn set_ttl<S: SysOptions + ?Sized>(&self, sys: &S, ttl: u32) -> Result<()> {
        self.with_fd(|fd| sys.set_ttl(fd, ttl))
    }
}

/// Packet-oriented view of a connection
///
/// Structurally parallel to [`TransportHandle`], but only constructible over
/// a datagram or raw connection.
#[derive(Debug)]
pub struct DatagramCapability<T> {
    handle: TransportHandle<T>,
}

impl<T> Default for DatagramCapability<T> {
    fn default() -> Self {
        Self {
            handle: TransportHandle::default(),
        }
    }
}

impl<T: Transport> DatagramCapability<T> {
    /// Create a ready packet-oriented view over `conn`
    ///
    /// # Returns
    ///
    /// * `Ok(DatagramCapability)` - View over a datagram or raw connection
    /// * `Err(EndpointError::WrongTransportKind)` - `conn` is a stream
    pub fn new(conn: Arc<T>) -> Result<Self> {
        Self::check_kind(conn.kind())?;
        Ok(Self::from_checked(conn))
    }

    /// Reject connections that do not deliver discrete packets
    pub fn check_kind(actual: TransportKind) -> Result<()> {
        if !actual.is_packet_oriented() {
            return Err(EndpointError::WrongTransportKind {
                expected: "packet-oriented",
                actual,
            });
        }
        Ok(())
    }

    /// Wrap a connection whose kind has already passed [`check_kind`]
    ///
    /// [`check_kind`]: DatagramCapability::check_kind
    pub(crate) fn from_checked(conn: Arc<T>) -> Self {
        Self {
            handle: TransportHandle::new(conn),
        }
    }

    /// True iff the view is initialized and wraps a connection
    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    pub(crate) fn mark_closed(&mut self) {
        self.handle.mark_closed();
    }

    /// Time-to-live for outgoing multicast packets
    pub fn multicast_ttl<S: SysOptions + ?Sized>(&self, sys: &S) -> Result<u32> {
        self.handle.with_fd(|fd| sys.multicast_ttl(fd))
    }

    /// Set the time-to-live for outgoing multicast packets
    pub fn set_multicast_ttl<S: SysOptions + ?Sized>(&self, sys: &S, ttl: u32) -> Result<()> {
        self.handle.with_fd(|fd| sys.set_multicast_ttl(fd, ttl))
    }

    /// Whether outgoing multicast packets are looped back
    pub fn multicast_loopback<S: SysOptions + ?Sized>(&self, sys: &S) -> Result<bool> {
        self.handle.with_fd(|fd| sys.multicast_loopback(fd))
    }

    /// Set whether outgoing multicast packets are looped back
    pub fn set_multicast_loopback<S: SysOptions + ?Sized>(&self, sys: &S, on: bool) -> Result<()> {
        self.handle.with_fd(|fd| sys.set_multicast_loopback(fd, on))
    }

    /// Join a multicast group
    pub fn join_group<S: SysOptions + ?Sized>(
        &self,
        sys: &S,
        group: Ipv4Addr,
        interface: Ipv4Addr,
    ) -> Result<()> {
        self.check_group(group)?;
        self.handle.with_fd(|fd| sys.join_group(fd, group, interface))
    }

    /// Leave a multicast group
    pub fn leave_group<S: SysOptions + ?Sized>(
        &self,
        sys: &S,
        group: Ipv4Addr,
        interface: Ipv4Addr,
    ) -> Result<()> {
        self.check_group(group)?;
        self.handle.with_fd(|fd| sys.leave_group(fd, group, interface))
    }

    fn check_group(&self, group: Ipv4Addr) -> Result<()> {
        self.handle.conn()?;
        if !group.is_multicast() {
            return Err(EndpointError::InvalidArgument(
                "group address is not a multicast address",
            ));
        }
        Ok(())
    }
}

/// Shared state of both control handler variants
#[derive(Debug)]
struct ControlCore<T> {
    handle: TransportHandle<T>,
    raw_opt: RawOptionState,
}

impl<T> Default for ControlCore<T> {
    fn default() -> Self {
        Self {
            handle: TransportHandle::default(),
            raw_opt: RawOptionState::new(),
        }
    }
}

impl<T: Transport> ControlCore<T> {
    fn new(conn: Arc<T>) -> Self {
        Self {
            handle: TransportHandle::new(conn),
            raw_opt: RawOptionState::new(),
        }
    }

    fn set_control_message<S: SysOptions + ?Sized>(
        &mut self,
        sys: &S,
        cf: ControlFlags,
        on: bool,
    ) -> Result<()> {
        let fd = self.handle.sysfd()?;
        sys.set_control_message(fd, self.raw_opt.flags(), cf, on)
            .map_err(EndpointError::OsOption)?;
        self.raw_opt.apply(cf, on);
        trace!(fd, flags = %cf, on, enabled = %self.raw_opt.flags(), "control messages updated");
        Ok(())
    }
}

/// Per-packet control-message handler for datagram endpoints
#[derive(Debug)]
pub struct PayloadControlHandler<T> {
    core: ControlCore<T>,
}

impl<T> Default for PayloadControlHandler<T> {
    fn default() -> Self {
        Self {
            core: ControlCore::default(),
        }
    }
}

impl<T: Transport> PayloadControlHandler<T> {
    /// Create a ready handler over `conn` with nothing requested
    pub fn new(conn: Arc<T>) -> Self {
        Self {
            core: ControlCore::new(conn),
        }
    }

    /// True iff the handler is initialized and wraps a connection
    pub fn is_ready(&self) -> bool {
        self.core.handle.is_ready()
    }

    /// Generic view of the connection this handler controls
    pub fn handle(&self) -> &TransportHandle<T> {
        &self.core.handle
    }

    pub(crate) fn handle_mut(&mut self) -> &mut TransportHandle<T> {
        &mut self.core.handle
    }

    /// Classes currently recorded as enabled
    pub fn flags(&self) -> ControlFlags {
        self.core.raw_opt.flags()
    }

    /// Enable or disable per-packet control-message classes
    ///
    /// The recorded flags change only when the OS accepted the request.
    pub fn set_control_message<S: SysOptions + ?Sized>(
        &mut self,
        sys: &S,
        cf: ControlFlags,
        on: bool,
    ) -> Result<()> {
        self.core.set_control_message(sys, cf, on)
    }
}

/// Per-packet control-message handler for raw IPv4 endpoints
#[derive(Debug)]
pub struct PacketControlHandler<T> {
    core: ControlCore<T>,
}

impl<T> Default for PacketControlHandler<T> {
    fn default() -> Self {
        Self {
            core: ControlCore::default(),
        }
    }
}

impl<T: Transport> PacketControlHandler<T> {
    /// Create a ready handler over a raw connection
    ///
    /// # Returns
    ///
    /// * `Ok(PacketControlHandler)` - Handler over `conn`
    /// * `Err(EndpointError::WrongTransportKind)` - `conn` is not raw
    pub fn new(conn: Arc<T>) -> Result<Self> {
        Self::check_kind(conn.kind())?;
        Ok(Self::from_checked(conn))
    }

    /// Reject anything but a raw connection
    pub fn check_kind(actual: TransportKind) -> Result<()> {
        if actual != TransportKind::Raw {
            return Err(EndpointError::WrongTransportKind {
                expected: "raw",
                actual,
            });
        }
        Ok(())
    }

    /// Wrap a connection whose kind has already passed [`check_kind`]
    ///
    /// [`check_kind`]: PacketControlHandler::check_kind
    pub(crate) fn from_checked(conn: Arc<T>) -> Self {
        Self {
            core: ControlCore::new(conn),
        }
    }

    /// True iff the handler is initialized and wraps a connection
    pub fn is_ready(&self) -> bool {
        self.core.handle.is_ready()
    }

    /// Generic view of the connection this handler controls
    pub fn handle(&self) -> &TransportHandle<T> {
        &self.core.handle
    }

    pub(crate) fn handle_mut(&mut self) -> &mut TransportHandle<T> {
        &mut self.core.handle
    }

    /// Classes currently recorded as enabled
    pub fn flags(&self) -> ControlFlags {
        self.core.raw_opt.flags()
    }

    /// Ask the OS to expect and deliver the IPv4 header explicitly on `conn`
    ///
    /// Runs against a borrowed connection so a refusal leaves it with the
    /// caller.
    pub fn enable_header_prepend<S: SysOptions + ?Sized>(conn: &T, sys: &S) -> Result<()> {
        let fd = conn.sysfd().map_err(EndpointError::DescriptorUnavailable)?;
        sys.set_header_prepend(fd, true)
            .map_err(EndpointError::OsOption)?;
        debug!(fd, "ipv4 header prepend enabled");
        Ok(())
    }

    /// Enable or disable per-packet control-message classes
    ///
    /// The recorded flags change only when the OS accepted the request.
    pub fn set_control_message<S: SysOptions + ?Sized>(
        &mut self,
        sys: &S,
        cf: ControlFlags,
        on: bool,
    ) -> Result<()> {
        self.core.set_control_message(sys, cf, on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::MockSysOptions;
    use crate::transport::MockTransport;
    use std::io;

    fn transport(kind: TransportKind, fd: RawFd) -> Arc<MockTransport> {
        let mut conn = MockTransport::new();
        conn.expect_kind().return_const(kind);
        conn.expect_sysfd().returning(move || Ok(fd));
        Arc::new(conn)
    }

    #[test]
    fn test_zero_value_handles_not_ready() {
        let handle = TransportHandle::<MockTransport>::default();
        assert!(!handle.is_ready());
        assert_eq!(handle.state(), EndpointState::Uninitialized);
        assert!(matches!(handle.sysfd(), Err(EndpointError::NotReady)));

        let dgram = DatagramCapability::<MockTransport>::default();
        assert!(!dgram.is_ready());

        let payload = PayloadControlHandler::<MockTransport>::default();
        assert!(!payload.is_ready());
        assert!(payload.flags().is_empty());

        let packet = PacketControlHandler::<MockTransport>::default();
        assert!(!packet.is_ready());
    }

    #[test]
    fn test_zero_value_control_handler_skips_os() {
        let sys = MockSysOptions::new();
        let mut payload = PayloadControlHandler::<MockTransport>::default();
        let err = payload
            .set_control_message(&sys, ControlFlags::TTL, true)
            .unwrap_err();
        assert!(matches!(err, EndpointError::NotReady));
    }

    #[test]
    fn test_datagram_capability_rejects_stream() {
        let err = DatagramCapability::new(transport(TransportKind::Stream, 3)).unwrap_err();
        assert!(matches!(
            err,
            EndpointError::WrongTransportKind {
                actual: TransportKind::Stream,
                ..
            }
        ));
        assert!(DatagramCapability::new(transport(TransportKind::Datagram, 3)).is_ok());
        assert!(DatagramCapability::new(transport(TransportKind::Raw, 3)).is_ok());
    }

    #[test]
    fn test_packet_handler_requires_raw() {
        let err = PacketControlHandler::new(transport(TransportKind::Datagram, 3)).unwrap_err();
        assert!(matches!(
            err,
            EndpointError::WrongTransportKind {
                expected: "raw",
                ..
            }
        ));
    }

    #[test]
    fn test_set_control_message_records_on_success() {
        let mut sys = MockSysOptions::new();
        sys.expect_set_control_message()
            .withf(|fd, current, cf, on| {
                *fd == 7 && current.is_empty() && *cf == ControlFlags::TTL && *on
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut payload = PayloadControlHandler::new(transport(TransportKind::Datagram, 7));
        payload
            .set_control_message(&sys, ControlFlags::TTL, true)
            .unwrap();
        assert_eq!(payload.flags(), ControlFlags::TTL);
    }

    #[test]
    fn test_set_control_message_failure_keeps_flags() {
        let mut sys = MockSysOptions::new();
        sys.expect_set_control_message()
            .times(1)
            .returning(|_, _, _, _| Err(io::Error::from_raw_os_error(1)));

        let mut payload = PayloadControlHandler::new(transport(TransportKind::Datagram, 7));
        let err = payload
            .set_control_message(&sys, ControlFlags::DST, true)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(1));
        assert!(payload.flags().is_empty());
    }

    #[test]
    fn test_descriptor_failure_skips_os() {
        let mut conn = MockTransport::new();
        conn.expect_kind().return_const(TransportKind::Datagram);
        conn.expect_sysfd()
            .returning(|| Err(io::Error::new(io::ErrorKind::NotConnected, "closed")));
        let sys = MockSysOptions::new();

        let mut payload = PayloadControlHandler::new(Arc::new(conn));
        let err = payload
            .set_control_message(&sys, ControlFlags::TTL, true)
            .unwrap_err();
        assert!(matches!(err, EndpointError::DescriptorUnavailable(_)));
    }

    #[test]
    fn test_enable_header_prepend() {
        let mut sys = MockSysOptions::new();
        sys.expect_set_header_prepend()
            .withf(|fd, on| *fd == 9 && *on)
            .times(1)
            .returning(|_, _| Ok(()));

        let conn = transport(TransportKind::Raw, 9);
        PacketControlHandler::enable_header_prepend(&*conn, &sys).unwrap();
    }

    #[test]
    fn test_header_prepend_without_descriptor() {
        let mut conn = MockTransport::new();
        conn.expect_sysfd()
            .returning(|| Err(io::Error::from_raw_os_error(9)));
        let sys = MockSysOptions::new();

        let err = PacketControlHandler::enable_header_prepend(&conn, &sys).unwrap_err();
        assert!(matches!(err, EndpointError::DescriptorUnavailable(_)));
    }

    #[test]
    fn test_kind_checks() {
        assert!(DatagramCapability::<MockTransport>::check_kind(TransportKind::Datagram).is_ok());
        assert!(DatagramCapability::<MockTransport>::check_kind(TransportKind::Stream).is_err());
        assert!(PacketControlHandler::<MockTransport>::check_kind(TransportKind::Raw).is_ok());
        assert!(PacketControlHandler::<MockTransport>::check_kind(TransportKind::Datagram).is_err());
    }

    #[test]
    fn test_join_group_rejects_unicast() {
        let sys = MockSysOptions::new();
        let dgram = DatagramCapability::new(transport(TransportKind::Datagram, 4)).unwrap();
        let err = dgram
            .join_group(&sys, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::UNSPECIFIED)
            .unwrap_err();
        assert!(matches!(err, EndpointError::InvalidArgument(_)));
    }

    #[test]
    fn test_join_group_forwards() {
        let mut sys = MockSysOptions::new();
        let group = Ipv4Addr::new(224, 0, 0, 5);
        sys.expect_join_group()
            .withf(move |fd, g, i| *fd == 4 && *g == group && i.is_unspecified())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dgram = DatagramCapability::new(transport(TransportKind::Datagram, 4)).unwrap();
        dgram
            .join_group(&sys, group, Ipv4Addr::UNSPECIFIED)
            .unwrap();
    }

    #[test]
    fn test_close_marks_closed() {
        let mut conn = MockTransport::new();
        conn.expect_close().times(1).returning(|| Ok(()));
        let mut handle = TransportHandle::new(Arc::new(conn));
        handle.close().unwrap();
        assert_eq!(handle.state(), EndpointState::Closed);
        assert!(handle.is_ready());
    }

    #[test]
    fn test_close_failure_keeps_ready() {
        let mut conn = MockTransport::new();
        conn.expect_close()
            .times(1)
            .returning(|| Err(io::Error::from_raw_os_error(9)));
        let mut handle = TransportHandle::new(Arc::new(conn));
        let err = handle.close().unwrap_err();
        assert!(matches!(err, EndpointError::Transport(_)));
        assert_eq!(handle.state(), EndpointState::Ready);
    }
}
