//! System Options Module
//!
//! The OS collaborator behind every endpoint. Endpoints hand it a resolved
//! file descriptor and never touch platform-specific option codes themselves.
//!
//! [`PlatformOptions`] is the production implementation:
//!
//! | Flags                  | Linux / Android | macOS / iOS / FreeBSD |
//! |------------------------|-----------------|-----------------------|
//! | `TTL`                  | `IP_RECVTTL`    | `IP_RECVTTL`          |
//! | `SRC`                  | `IP_PKTINFO`    | (always available)    |
//! | `DST`                  | `IP_PKTINFO`    | `IP_RECVDSTADDR`      |
//! | `INTERFACE`            | `IP_PKTINFO`    | `IP_RECVIF`           |
//! | header prepend         | `IP_HDRINCL`    | `IP_HDRINCL`          |
//!
//! On Linux a single packet-info option carries source, destination and
//! interface together, so it stays enabled while any of the three is still
//! requested.

use std::io;
use std::net::Ipv4Addr;
use std::os::unix::io::{BorrowedFd, RawFd};

use entities_ip_control::ControlFlags;
use socket2::SockRef;

/// OS-level socket option primitives
#[cfg_attr(test, mockall::automock)]
pub trait SysOptions: Send + Sync {
    /// Apply (`on == true`) or clear the control-message classes `cf` on `fd`
    ///
    /// `current` is the set of classes the endpoint has recorded as enabled
    /// before this call. The caller records the change only if this returns
    /// `Ok`.
    fn set_control_message(
        &self,
        fd: RawFd,
        current: ControlFlags,
        cf: ControlFlags,
        on: bool,
    ) -> io::Result<()>;

    /// Toggle whether the IPv4 header is supplied by the application on a
    /// raw socket
    fn set_header_prepend(&self, fd: RawFd, on: bool) -> io::Result<()>;

    /// Type-of-service field for outgoing packets
    fn tos(&self, fd: RawFd) -> io::Result<u32>;

    /// Set the type-of-service field for outgoing packets
    fn set_tos(&self, fd: RawFd, tos: u32) -> io::Result<()>;

    /// Time-to-live for outgoing unicast packets
    fn ttl(&self, fd: RawFd) -> io::Result<u32>;

    /// Set the time-to-live for outgoing unicast packets
    fn set_ttl(&self, fd: RawFd, ttl: u32) -> io::Result<()>;

    /// Time-to-live for outgoing multicast packets
    fn multicast_ttl(&self, fd: RawFd) -> io::Result<u32>;

    /// Set the time-to-live for outgoing multicast packets
    fn set_multicast_ttl(&self, fd: RawFd, ttl: u32) -> io::Result<()>;

    /// Whether outgoing multicast packets are looped back locally
    fn multicast_loopback(&self, fd: RawFd) -> io::Result<bool>;

    /// Set whether outgoing multicast packets are looped back locally
    fn set_multicast_loopback(&self, fd: RawFd, on: bool) -> io::Result<()>;

    /// Join `group` on the interface with address `interface`
    fn join_group(&self, fd: RawFd, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()>;

    /// Leave `group` on the interface with address `interface`
    fn leave_group(&self, fd: RawFd, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()>;
}

/// Socket options of the running platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformOptions;

fn set_int_option(fd: RawFd, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    // SAFETY: `value` outlives the call and the length matches its type
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_IP,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn with_sock_ref<R>(fd: RawFd, f: impl FnOnce(SockRef<'_>) -> io::Result<R>) -> io::Result<R> {
    if fd < 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    // SAFETY: the descriptor was resolved from an open transport and is only
    // borrowed for the duration of `f`
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    f(SockRef::from(&borrowed))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn apply_control_message(
    fd: RawFd,
    current: ControlFlags,
    cf: ControlFlags,
    on: bool,
) -> io::Result<()> {
    apply_control_message_with(fd, current, cf, on, set_int_option)
}

/// Linux option sequence over an arbitrary setter
///
/// A packet-info failure restores `IP_RECVTTL` to its recorded value, so the
/// kernel matches the record the caller keeps on error.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn apply_control_message_with(
    fd: RawFd,
    current: ControlFlags,
    cf: ControlFlags,
    on: bool,
    mut set: impl FnMut(RawFd, libc::c_int, libc::c_int) -> io::Result<()>,
) -> io::Result<()> {
    let ttl = cf.contains(ControlFlags::TTL);
    if ttl {
        set(fd, libc::IP_RECVTTL, on as libc::c_int)?;
    }
    if cf.intersects(ControlFlags::PACKET_INFO) {
        let desired = if on { current | cf } else { current - cf };
        let enable = desired.intersects(ControlFlags::PACKET_INFO);
        if let Err(err) = set(fd, libc::IP_PKTINFO, enable as libc::c_int) {
            if ttl {
                let previous = current.contains(ControlFlags::TTL);
                // the packet-info error is the one reported
                let _ = set(fd, libc::IP_RECVTTL, previous as libc::c_int);
            }
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn apply_control_message(
    fd: RawFd,
    _current: ControlFlags,
    cf: ControlFlags,
    on: bool,
) -> io::Result<()> {
    let value = on as libc::c_int;
    if cf.contains(ControlFlags::TTL) {
        set_int_option(fd, libc::IP_RECVTTL, value)?;
    }
    if cf.contains(ControlFlags::DST) {
        set_int_option(fd, libc::IP_RECVDSTADDR, value)?;
    }
    if cf.contains(ControlFlags::INTERFACE) {
        set_int_option(fd, libc::IP_RECVIF, value)?;
    }
    Ok(())
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn apply_control_message(
    _fd: RawFd,
    _current: ControlFlags,
    cf: ControlFlags,
    _on: bool,
) -> io::Result<()> {
    if cf.is_empty() {
        return Ok(());
    }
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "per-packet control messages are not supported on this platform",
    ))
}

impl SysOptions for PlatformOptions {
    fn set_control_message(
        &self,
        fd: RawFd,
        current: ControlFlags,
        cf: ControlFlags,
        on: bool,
    ) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        apply_control_message(fd, current, cf, on)
    }

    fn set_header_prepend(&self, fd: RawFd, on: bool) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        set_int_option(fd, libc::IP_HDRINCL, on as libc::c_int)
    }

    fn tos(&self, fd: RawFd) -> io::Result<u32> {
        with_sock_ref(fd, |s| s.tos())
    }

    fn set_tos(&self, fd: RawFd, tos: u32) -> io::Result<()> {
        with_sock_ref(fd, |s| s.set_tos(tos))
    }

    fn ttl(&self, fd: RawFd) -> io::Result<u32> {
        with_sock_ref(fd, |s| s.ttl())
    }

    fn set_ttl(&self, fd: RawFd, ttl: u32) -> io::Result<()> {
        with_sock_ref(fd, |s| s.set_ttl(ttl))
    }

    fn multicast_ttl(&self, fd: RawFd) -> io::Result<u32> {
        with_sock_ref(fd, |s| s.multicast_ttl_v4())
    }

    fn set_multicast_ttl(&self, fd: RawFd, ttl: u32) -> io::Result<()> {
        with_sock_ref(fd, |s| s.set_multicast_ttl_v4(ttl))
    }

    fn multicast_loopback(&self, fd: RawFd) -> io::Result<bool> {
        with_sock_ref(fd, |s| s.multicast_loop_v4())
    }

    fn set_multicast_loopback(&self, fd: RawFd, on: bool) -> io::Result<()> {
        with_sock_ref(fd, |s| s.set_multicast_loop_v4(on))
    }

    fn join_group(&self, fd: RawFd, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
        with_sock_ref(fd, |s| s.join_multicast_v4(&group, &interface))
    }

    fn leave_group(&self, fd: RawFd, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
        with_sock_ref(fd, |s| s.leave_multicast_v4(&group, &interface))
    }
}
