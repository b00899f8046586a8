//! Core types, wire formats, and packet buffers for the ingress4 IPv4 stack.
//!
//! This crate defines the protocol newtypes, the fixed-offset IPv4 header
//! view, the internet checksum, options parsing, and the reference-counted
//! packet buffer that the ingress pipeline threads through its stages.

pub mod buffer;
pub mod checksum;
pub mod error;
pub mod header;
pub mod options;
pub mod types;

pub use buffer::{ControlBlock, PacketBuf};
pub use error::PacketError;
pub use header::{Ipv4Header, IPV4_MIN_HEADER_LEN, IPV4_MIN_IHL, IPV4_VERSION};
pub use options::{OptionEntry, ParsedOptions, SourceRouteKind, SourceRouteOption};
pub use types::{
    Disposition, EgressHandle, IfaceId, LinkKind, NetnsId, Protocol, RouteDecision, Tos,
};
