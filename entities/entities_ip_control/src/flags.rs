//! Control Flags Module
//!
//! Per-packet control-message classes and the raw option state record that
//! tracks which of them are enabled on a socket.

use std::fmt;

bitflags::bitflags! {
    /// Classes of per-packet IP-level metadata that can be requested
    /// alongside received payloads.
    ///
    /// The flags are opaque to the endpoint layer; only the OS option
    /// collaborator knows which socket options they translate to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u32 {
        /// Time-to-live of the received datagram
        const TTL = 1 << 0;
        /// Source address
        const SRC = 1 << 1;
        /// Destination address
        const DST = 1 << 2;
        /// Index of the receiving interface
        const INTERFACE = 1 << 3;

        /// Classes delivered together by a single packet-info option
        const PACKET_INFO = Self::SRC.bits() | Self::DST.bits() | Self::INTERFACE.bits();
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ControlFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            // PACKET_INFO is an alias, its members are printed individually
            if name == "PACKET_INFO" {
                continue;
            }
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name.to_ascii_lowercase())?;
            first = false;
        }
        Ok(())
    }
}

/// Raw option state
///
/// Records which control-message classes are currently enabled for one
/// endpoint. The record itself performs no I/O; callers update it only after
/// the corresponding socket option change has succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawOptionState {
    flags: ControlFlags,
}

impl RawOptionState {
    /// Create an empty record (nothing requested)
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently enabled classes
    pub fn flags(&self) -> ControlFlags {
        self.flags
    }

    /// Check whether every class in `cf` is enabled
    pub fn is_set(&self, cf: ControlFlags) -> bool {
        self.flags.contains(cf)
    }

    /// Mark the classes in `cf` as enabled
    pub fn set(&mut self, cf: ControlFlags) {
        self.flags.insert(cf);
    }

    /// Mark the classes in `cf` as disabled
    pub fn clear(&mut self, cf: ControlFlags) {
        self.flags.remove(cf);
    }

    /// Enable or disable `cf` depending on `on`
    pub fn apply(&mut self, cf: ControlFlags, on: bool) {
        if on {
            self.set(cf);
        } else {
            self.clear(cf);
        }
    }

    /// The flag set that `apply(cf, on)` would produce, without mutating
    pub fn desired(&self, cf: ControlFlags, on: bool) -> ControlFlags {
        if on {
            self.flags | cf
        } else {
            self.flags - cf
        }
    }
}
