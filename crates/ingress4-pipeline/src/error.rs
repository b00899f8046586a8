//! Pipeline error taxonomy.
//!
//! Every variant is terminal and local: the packet is discarded (or
//! ownership was transferred) and the only externally visible effects are
//! a counter increment and an optional tracing event. Nothing here
//! propagates to the sender.

use ingress4_core::{NetnsId, PacketError, Protocol};

/// Why a packet left the pipeline without being delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("datagram truncated")]
    Truncated,

    #[error("malformed header")]
    Malformed,

    #[error("header checksum mismatch")]
    ChecksumMismatch,

    #[error("header options error")]
    HeaderError,

    #[error("no route to host")]
    HostUnreachable,

    #[error("no route to network")]
    NetworkUnreachable,

    #[error("handler for {protocol} is not namespace-aware in {netns}")]
    UnsupportedInNamespace { protocol: Protocol, netns: NetnsId },

    #[error("transient resource exhaustion")]
    ResourceExhausted,

    #[error("resubmission loop exceeded {limit} iterations")]
    ProtocolLoop { limit: usize },

    /// Policy-based rejection: silent by agreement, no notification.
    #[error("dropped by policy")]
    PolicyDrop,
}

impl From<PacketError> for DropReason {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::TooShort { .. } => DropReason::Truncated,
            PacketError::BadHeaderLength { .. }
            | PacketError::BadVersion { .. }
            | PacketError::BadTotalLength { .. } => DropReason::Malformed,
            PacketError::ChecksumMismatch => DropReason::ChecksumMismatch,
            PacketError::BadOption { .. } => DropReason::HeaderError,
            PacketError::TrimOutOfRange { .. } | PacketError::DupBudgetExhausted => {
                DropReason::ResourceExhausted
            }
        }
    }
}
