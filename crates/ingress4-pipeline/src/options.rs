//! The options processing stage.
//!
//! Only invoked when the header declares more than the minimum length, so
//! the common case pays nothing. Not every option requires mangling the
//! packet, but the region is made writable up front; options combined
//! with shared buffers is a rare enough condition that the single CoW is
//! the simplest correct policy.

use ingress4_core::{PacketBuf, ParsedOptions, SourceRouteOption};

use crate::config::IngressConfig;
use crate::error::DropReason;

/// Why the source-route collaborator refused a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SourceRouteError {
    #[error("source route rejected")]
    Rejected,
}

/// Applies the address-rewrite semantics of a source-route option. The
/// routing-options logic behind this seam is external.
pub trait SourceRouteHandler: Send + Sync {
    fn apply(
        &self,
        packet: &mut PacketBuf,
        option: &SourceRouteOption,
    ) -> Result<(), SourceRouteError>;
}

/// Parse and act on the header options. On success the parsed options
/// are stored in the packet's control block.
pub fn process_options(
    packet: &mut PacketBuf,
    config: &IngressConfig,
    source_routes: &dyn SourceRouteHandler,
) -> Result<(), DropReason> {
    let has_options = packet
        .ipv4_header()
        .map_err(|_| DropReason::Truncated)?
        .has_options();
    if !has_options {
        return Ok(());
    }

    // The options region may be rewritten (source routing, timestamps);
    // privatize shared storage before anything touches it.
    packet
        .make_writable()
        .map_err(|_| DropReason::ResourceExhausted)?;

    let parsed = {
        let header = packet.ipv4_header().map_err(|_| DropReason::Truncated)?;
        let region = header.options_region().map_err(|_| DropReason::Truncated)?;
        ParsedOptions::parse(region).map_err(DropReason::from)?
    };

    if let Some(srr) = parsed.source_route.clone() {
        if !config.source_route_permitted(packet.iface()) {
            let header = packet.ipv4_header().map_err(|_| DropReason::Truncated)?;
            tracing::warn!(
                iface = %packet.iface(),
                src = %header.source(),
                dst = %header.destination(),
                "source route option on interface with source routing disabled"
            );
            return Err(DropReason::HeaderError);
        }
        source_routes
            .apply(packet, &srr)
            .map_err(|_| DropReason::HeaderError)?;
    }

    packet.control_block_mut().options = Some(parsed);
    Ok(())
}
