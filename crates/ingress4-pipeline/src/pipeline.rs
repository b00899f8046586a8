//! Pipeline assembly and the receive entry point.
//!
//! [`IngressPipeline`] wires the stage functions together with the
//! registration surfaces and the external collaborators, and owns the
//! counter block. [`IngressPipeline::receive`] runs one packet through
//! the whole chain; "handled" means ownership was consumed somewhere,
//! never that delivery succeeded.

use std::sync::Arc;

use ingress4_core::{Disposition, LinkKind, PacketBuf};

use crate::config::IngressConfig;
use crate::demux::{
    self, DemuxContext, PolicyCheck, ProtocolTable, Reassembler, UnreachableNotifier,
};
use crate::error::DropReason;
use crate::hooks::{Checkpoint, HookRegistry, Verdict};
use crate::options::{self, SourceRouteHandler};
use crate::ra_chain::{FanOut, ObserverChain};
use crate::route::{self, ForwardSink, RouteResolver};
use crate::stats::{Counter, IngressStats, StatsSnapshot};
use crate::validate;

/// The external engines the pipeline delegates to. Each seam is a trait
/// object so hosts can swap implementations without touching the
/// pipeline itself.
pub struct Collaborators {
    pub resolver: Arc<dyn RouteResolver>,
    pub forward: Arc<dyn ForwardSink>,
    pub reassembler: Arc<dyn Reassembler>,
    pub policy: Arc<dyn PolicyCheck>,
    pub notifier: Arc<dyn UnreachableNotifier>,
    pub source_routes: Arc<dyn SourceRouteHandler>,
}

/// The assembled ingress pipeline.
pub struct IngressPipeline {
    config: IngressConfig,
    collaborators: Collaborators,
    handlers: ProtocolTable,
    observers: ObserverChain,
    hooks: HookRegistry,
    stats: IngressStats,
}

impl IngressPipeline {
    pub fn new(config: IngressConfig, collaborators: Collaborators) -> Self {
        let stats = if config.stats_shards == 0 {
            IngressStats::default()
        } else {
            IngressStats::new(config.stats_shards)
        };
        Self {
            config,
            collaborators,
            handlers: ProtocolTable::new(),
            observers: ObserverChain::new(),
            hooks: HookRegistry::new(),
            stats,
        }
    }

    /// Protocol handler registration surface.
    pub fn handlers(&self) -> &ProtocolTable {
        &self.handlers
    }

    /// Observer registration surface.
    pub fn observers(&self) -> &ObserverChain {
        &self.observers
    }

    /// Inspection checkpoint registration surface.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one raw datagram through the pipeline. The packet is always
    /// consumed; drops are counted and logged, not reported to the
    /// caller.
    pub fn receive(&self, packet: PacketBuf) {
        if let Err(reason) = self.ingest(packet) {
            self.stats.increment(Counter::for_drop(&reason));
            tracing::debug!(%reason, "packet dropped");
        }
    }

    /// Re-enter at the local-delivery stage with a completed datagram
    /// from the reassembly collaborator. The collaborator keeps the head
    /// fragment's route descriptor and control block on the datagram it
    /// builds, so routing is not repeated and the router-alert flag
    /// survives reassembly.
    pub fn resume_local_delivery(&self, packet: PacketBuf) {
        if let Err(reason) = self.local_deliver(packet) {
            self.stats.increment(Counter::for_drop(&reason));
            tracing::debug!(%reason, "reinjected packet dropped");
        }
    }

    fn ingest(&self, mut packet: PacketBuf) -> Result<(), DropReason> {
        // Promiscuous-mode frames addressed elsewhere are released
        // before any accounting.
        if packet.link_kind() == LinkKind::OtherHost {
            tracing::trace!(iface = %packet.iface(), "frame addressed to another host");
            return Ok(());
        }

        self.stats.increment(Counter::InReceives);

        // Downstream stages may rewrite the header in place; a buffer
        // still shared with a capture path has to be privatized first.
        if packet.is_shared() {
            packet
                .make_writable()
                .map_err(|_| DropReason::ResourceExhausted)?;
        }

        validate::validate(&mut packet)?;

        packet = match self.hooks.run(Checkpoint::PreRouting, packet) {
            Verdict::Proceed(p) => p,
            Verdict::Drop => return Err(DropReason::PolicyDrop),
            Verdict::Steal => return Ok(()),
        };

        let disposition = route::ensure_resolved(
            &mut packet,
            self.collaborators.resolver.as_ref(),
            &self.stats,
        )?;

        options::process_options(
            &mut packet,
            &self.config,
            self.collaborators.source_routes.as_ref(),
        )?;

        match disposition {
            Disposition::Forward => {
                self.stats.increment(Counter::ForwDatagrams);
                self.collaborators.forward.forward(packet);
                Ok(())
            }
            Disposition::LocalDeliver | Disposition::Broadcast | Disposition::Multicast => {
                self.local_deliver(packet)
            }
        }
    }

    fn local_deliver(&self, packet: PacketBuf) -> Result<(), DropReason> {
        // Router-alert datagrams are offered to the observer chain
        // before anything else; a handled fan-out ends the traversal.
        let packet = if self.has_router_alert(&packet) {
            match self
                .observers
                .fan_out(packet, self.collaborators.reassembler.as_ref())
            {
                FanOut::Handled => {
                    self.stats.increment(Counter::InDelivers);
                    return Ok(());
                }
                FanOut::NotHandled(packet) => packet,
            }
        } else {
            packet
        };

        let packet = match self.hooks.run(Checkpoint::LocalIn, packet) {
            Verdict::Proceed(p) => p,
            Verdict::Drop => return Err(DropReason::PolicyDrop),
            Verdict::Steal => return Ok(()),
        };

        let ctx = DemuxContext {
            table: &self.handlers,
            observers: &self.observers,
            reassembler: self.collaborators.reassembler.as_ref(),
            policy: self.collaborators.policy.as_ref(),
            notifier: self.collaborators.notifier.as_ref(),
            stats: &self.stats,
            max_resubmits: self.config.max_resubmits,
        };
        demux::deliver_local(&ctx, packet)
    }

    fn has_router_alert(&self, packet: &PacketBuf) -> bool {
        packet
            .control_block()
            .options
            .as_ref()
            .map_or(false, |options| options.router_alert)
    }
}
