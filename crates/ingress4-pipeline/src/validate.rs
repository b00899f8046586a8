//! Structural validation of an arriving datagram.
//!
//! All acceptance tests run before any stateful work, in a fixed order
//! where the first failure wins. A datagram that fails here is
//! irrecoverably bad and is never retried.

use ingress4_core::checksum;
use ingress4_core::{PacketBuf, IPV4_MIN_HEADER_LEN, IPV4_MIN_IHL, IPV4_VERSION};

use crate::error::DropReason;

/// Run the acceptance gates against `packet`.
///
/// On accept the buffer has been trimmed to the declared total length and
/// the per-packet control block is reset. On reject the packet must be
/// released by the caller; no gate has side effects before the trim.
pub fn validate(packet: &mut PacketBuf) -> Result<(), DropReason> {
    // 1. The fixed header must be present and byte-addressable.
    if !packet.may_pull(IPV4_MIN_HEADER_LEN) {
        return Err(DropReason::Truncated);
    }

    let (header_len, total_len) = {
        let header = packet.ipv4_header().map_err(|_| DropReason::Truncated)?;

        // 2. Declared header length sanity.
        if header.ihl() < IPV4_MIN_IHL {
            return Err(DropReason::Malformed);
        }

        // 3. Version gate.
        if header.version() != IPV4_VERSION {
            return Err(DropReason::Malformed);
        }

        (header.header_len(), header.total_len())
    };

    // 4. The declared header, options included, must be present.
    if !packet.may_pull(header_len) {
        return Err(DropReason::Truncated);
    }

    // 5. Header checksum over the declared header length.
    if !checksum::verify(&packet.bytes()[..header_len]) {
        return Err(DropReason::ChecksumMismatch);
    }

    // 6. Total-length sanity against the actual buffer.
    if packet.len() < total_len {
        return Err(DropReason::Truncated);
    }
    if total_len < header_len {
        return Err(DropReason::Malformed);
    }

    // 7. Trim link-layer padding down to the declared datagram.
    packet
        .trim(total_len)
        .map_err(|_| DropReason::ResourceExhausted)?;

    // Accept: clear out any debris in the control block.
    packet.control_block_mut().reset();
    Ok(())
}
