//! Routing resolution stage.
//!
//! Thin: the lookup itself belongs to the routing collaborator. This
//! stage attaches the returned descriptor to the packet, classifies the
//! disposition counters, and skips the lookup entirely when a descriptor
//! is already attached (a reassembly requeue, for instance).

use std::net::Ipv4Addr;

use ingress4_core::{Disposition, IfaceId, PacketBuf, RouteDecision, Tos};

use crate::error::DropReason;
use crate::stats::{Counter, IngressStats};

/// Failure outcomes of a routing lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("host unreachable")]
    HostUnreachable,
    #[error("network unreachable")]
    NetworkUnreachable,
}

/// The external routing engine.
pub trait RouteResolver: Send + Sync {
    fn resolve(
        &self,
        dst: Ipv4Addr,
        src: Ipv4Addr,
        tos: Tos,
        ingress: IfaceId,
    ) -> Result<RouteDecision, ResolveError>;
}

/// Egress hand-off for packets whose disposition is Forward. Route
/// computation and TTL handling live behind this seam.
pub trait ForwardSink: Send + Sync {
    fn forward(&self, packet: PacketBuf);
}

/// Attach a forwarding descriptor if none is present, returning the
/// packet's disposition.
///
/// Unreachable outcomes increment their counters and discard; response
/// generation (host/network unreachable signalling) is not this
/// component's job. Multicast and broadcast dispositions are counted
/// here, at the point the classification becomes known.
pub fn ensure_resolved(
    packet: &mut PacketBuf,
    resolver: &dyn RouteResolver,
    stats: &IngressStats,
) -> Result<Disposition, DropReason> {
    if let Some(route) = packet.route() {
        return Ok(route.disposition);
    }

    let (dst, src, tos) = {
        let header = packet.ipv4_header().map_err(|_| DropReason::Truncated)?;
        (header.destination(), header.source(), header.tos())
    };

    let decision = resolver
        .resolve(dst, src, tos, packet.iface())
        .map_err(|err| match err {
            ResolveError::HostUnreachable => DropReason::HostUnreachable,
            ResolveError::NetworkUnreachable => DropReason::NetworkUnreachable,
        })?;

    match decision.disposition {
        Disposition::Multicast => stats.increment(Counter::InMcastPkts),
        Disposition::Broadcast => stats.increment(Counter::InBcastPkts),
        Disposition::LocalDeliver | Disposition::Forward => {}
    }

    tracing::trace!(
        iface = %packet.iface(),
        disposition = ?decision.disposition,
        "route resolved"
    );
    let disposition = decision.disposition;
    packet.attach_route(decision);
    Ok(disposition)
}
