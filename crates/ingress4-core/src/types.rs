//! Newtype wrappers for pipeline-facing identifiers.
//!
//! These types keep interface indices, namespace identifiers, and protocol
//! numbers from being accidentally mixed, and give each a stable `Display`
//! for log fields.

use core::fmt;

/// Identifier of the network interface a packet arrived on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct IfaceId(pub u32);

impl IfaceId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

impl fmt::Debug for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IfaceId({})", self.0)
    }
}

/// Network namespace scope of an interface or a registered consumer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct NetnsId(pub u32);

impl NetnsId {
    /// The initial namespace every process starts in.
    pub const DEFAULT: NetnsId = NetnsId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Whether this is the initial namespace.
    pub const fn is_default(self) -> bool {
        self.0 == Self::DEFAULT.0
    }
}

impl fmt::Display for NetnsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netns{}", self.0)
    }
}

impl fmt::Debug for NetnsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetnsId({})", self.0)
    }
}

/// An IP protocol number (0-255) as carried in the header protocol field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct Protocol(pub u8);

impl Protocol {
    pub const ICMP: Protocol = Protocol(1);
    pub const TCP: Protocol = Protocol(6);
    pub const UDP: Protocol = Protocol(17);

    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proto{}", self.0)
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protocol({})", self.0)
    }
}

/// Type-of-service byte from the IPv4 header, passed through to routing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct Tos(pub u8);

impl Tos {
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn byte(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Tos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tos({:#04x})", self.0)
    }
}

/// Link-layer classification of a received frame.
///
/// Set by the device layer before the packet reaches the pipeline. Frames
/// addressed to another host are dropped at the front door without further
/// analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    Host,
    Broadcast,
    Multicast,
    /// Captured in promiscuous mode but addressed elsewhere.
    OtherHost,
}

/// How routing resolution classified a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    LocalDeliver,
    Forward,
    Multicast,
    Broadcast,
}

/// Opaque handle into the egress machinery, minted by the routing
/// collaborator. The pipeline never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct EgressHandle(pub u64);

/// A forwarding descriptor attached to a packet after a successful
/// routing lookup. At most one is attached per packet; once present,
/// later stages must not re-resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub disposition: Disposition,
    pub egress: EgressHandle,
}

impl RouteDecision {
    pub const fn new(disposition: Disposition, egress: EgressHandle) -> Self {
        Self {
            disposition,
            egress,
        }
    }
}
