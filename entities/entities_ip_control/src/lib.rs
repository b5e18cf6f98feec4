//! Entities Layer: IPv4 Control State
//!
//! Provides the platform-independent value types shared by every IPv4 endpoint:
//! which classes of per-packet metadata are requested, and where an endpoint is
//! in its lifecycle.
//!
//! ## Overview
//!
//! The `entities_ip_control` crate contains no socket code. It defines:
//! - **[`ControlFlags`]**: The set of per-packet control-message classes
//!   (TTL, source address, destination address, interface index)
//! - **[`RawOptionState`]**: The record of which classes an endpoint currently
//!   has enabled at the socket level
//! - **[`EndpointState`]**: The explicit lifecycle tag carried by every handle
//!
//! ## See Also
//!
//! - [`adapters_ipv4`](../adapters_ipv4/index.html): Endpoints built on these types

pub mod flags;
pub mod state;

pub use flags::{ControlFlags, RawOptionState};
pub use state::EndpointState;
