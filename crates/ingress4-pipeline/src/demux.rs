//! Local-delivery demultiplexing.
//!
//! Once a packet's disposition is local-deliver, this stage strips the
//! network header and hands the payload to the registered consumer for
//! its protocol number. A handler may answer with an alternate protocol
//! identifier to unwrap an encapsulated payload; that re-enters the
//! lookup as an explicit bounded loop rather than recursion, so stack
//! use is constant and termination is testable.

use std::sync::{Arc, RwLock};

use ingress4_core::{NetnsId, PacketBuf, Protocol};

use crate::error::DropReason;
use crate::ra_chain::ObserverChain;
use crate::stats::{Counter, IngressStats};

/// Size of the handler table: one slot per possible protocol number, so
/// indexing by `protocol % TABLE_SIZE` cannot collide. The exact-match
/// check on lookup stays anyway; the table is not a hash map.
pub const TABLE_SIZE: usize = 256;

/// Which pipeline entry submitted a fragment for reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyContext {
    LocalDeliver,
    RouterAlertChain,
}

/// Result of handing a fragment to the reassembly collaborator.
pub enum ReassemblyOutcome {
    /// All fragments arrived; here is the complete datagram.
    Complete(PacketBuf),
    /// Ownership transferred; the collaborator will re-inject the
    /// completed datagram at the local-delivery entry later.
    Pending,
}

/// The external fragment-reassembly engine.
pub trait Reassembler: Send + Sync {
    fn submit(&self, packet: PacketBuf, context: ReassemblyContext) -> ReassemblyOutcome;
}

/// The external security/policy gate run before a handler sees a packet.
pub trait PolicyCheck: Send + Sync {
    fn permits(&self, packet: &PacketBuf) -> bool;
}

/// Delegated error signalling for the no-consumer path.
pub trait UnreachableNotifier: Send + Sync {
    fn protocol_unreachable(&self, packet: &PacketBuf);
}

/// What a protocol handler did with a packet it was given.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// The handler took the packet; delivery is complete.
    Consumed,
    /// The payload was an encapsulation; the handler returns the packet
    /// so demultiplexing re-runs with this protocol identifier.
    Resubmit(Protocol, PacketBuf),
}

/// A registered upper-layer protocol handler.
pub trait ProtocolHandler: Send + Sync {
    fn handle(&self, packet: PacketBuf) -> HandlerOutcome;
}

/// Registration-time policy flags for a handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerFlags {
    /// Whether the handler understands packets from non-default
    /// namespaces.
    pub namespace_aware: bool,
    /// Run fragment reassembly before delivery.
    pub needs_reassembly: bool,
    /// Run the external policy check before delivery.
    pub needs_policy_check: bool,
}

impl Default for HandlerFlags {
    fn default() -> Self {
        Self {
            namespace_aware: false,
            needs_reassembly: true,
            needs_policy_check: true,
        }
    }
}

#[derive(Clone)]
struct TableEntry {
    protocol: Protocol,
    flags: HandlerFlags,
    handler: Arc<dyn ProtocolHandler>,
}

/// Protocol registration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("handler already registered for {0}")]
    Occupied(Protocol),
}

/// Fixed-size mapping from protocol number to handler descriptor.
///
/// Lookups are the hot path and clone the `Arc` handle out under the
/// read lock; registration is rare and takes the write lock.
pub struct ProtocolTable {
    slots: RwLock<Box<[Option<TableEntry>]>>,
}

impl ProtocolTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(vec![None; TABLE_SIZE].into_boxed_slice()),
        }
    }

    pub fn register(
        &self,
        protocol: Protocol,
        flags: HandlerFlags,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), TableError> {
        let mut slots = self.slots.write().expect("protocol table lock poisoned");
        let slot = &mut slots[usize::from(protocol.number()) % TABLE_SIZE];
        if slot.is_some() {
            return Err(TableError::Occupied(protocol));
        }
        *slot = Some(TableEntry {
            protocol,
            flags,
            handler,
        });
        Ok(())
    }

    /// Remove the handler for `protocol`. Returns whether one existed.
    pub fn unregister(&self, protocol: Protocol) -> bool {
        let mut slots = self.slots.write().expect("protocol table lock poisoned");
        let slot = &mut slots[usize::from(protocol.number()) % TABLE_SIZE];
        match slot {
            Some(entry) if entry.protocol == protocol => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn lookup(&self, protocol: Protocol) -> Option<TableEntry> {
        let slots = self.slots.read().expect("protocol table lock poisoned");
        slots[usize::from(protocol.number()) % TABLE_SIZE]
            .as_ref()
            .filter(|entry| entry.protocol == protocol)
            .cloned()
    }
}

impl Default for ProtocolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the demultiplexer needs from the surrounding pipeline.
pub struct DemuxContext<'a> {
    pub table: &'a ProtocolTable,
    pub observers: &'a ObserverChain,
    pub reassembler: &'a dyn Reassembler,
    pub policy: &'a dyn PolicyCheck,
    pub notifier: &'a dyn UnreachableNotifier,
    pub stats: &'a IngressStats,
    pub max_resubmits: usize,
}

/// Demultiplex a local-delivery packet to its consumer.
///
/// Terminal on every path: the packet is consumed by a handler, an
/// observer, the reassembly collaborator, or the release path. `Ok(())`
/// means the traversal ended in a consumer or an accounted terminal
/// discard; `Err` means a counted drop the caller releases.
pub fn deliver_local(ctx: &DemuxContext<'_>, mut packet: PacketBuf) -> Result<(), DropReason> {
    strip_if_needed(&mut packet)?;

    let mut protocol = packet
        .ipv4_header()
        .map_err(|_| DropReason::Truncated)?
        .protocol();

    let mut resubmits = 0usize;
    loop {
        if resubmits > ctx.max_resubmits {
            return Err(DropReason::ProtocolLoop {
                limit: ctx.max_resubmits,
            });
        }

        // Interest-registered observers see the packet first, whether or
        // not a primary handler exists. Each gets its own duplicate; the
        // original continues down the primary path.
        let observed = ctx.observers.observe_clones(&mut packet, protocol);

        let Some(entry) = ctx.table.lookup(protocol) else {
            return if observed {
                ctx.stats.increment(Counter::InDelivers);
                Ok(())
            } else if ctx.policy.permits(&packet) {
                ctx.notifier.protocol_unreachable(&packet);
                ctx.stats.increment(Counter::InUnknownProtos);
                tracing::debug!(%protocol, "no handler registered, unreachable signalled");
                Ok(())
            } else {
                Err(DropReason::PolicyDrop)
            };
        };

        if !entry.flags.namespace_aware && !packet.netns().is_default() {
            tracing::warn!(%protocol, netns = %packet.netns(), "handler is not namespace-aware");
            return Err(DropReason::UnsupportedInNamespace {
                protocol,
                netns: packet.netns(),
            });
        }

        if entry.flags.needs_reassembly && is_fragment(&packet)? {
            match ctx
                .reassembler
                .submit(packet, ReassemblyContext::LocalDeliver)
            {
                // Ownership transferred; the traversal ends here and the
                // completed datagram comes back through the local-delivery
                // entry point.
                ReassemblyOutcome::Pending => return Ok(()),
                ReassemblyOutcome::Complete(complete) => {
                    packet = complete;
                    strip_if_needed(&mut packet)?;
                }
            }
        }

        if entry.flags.needs_policy_check && !ctx.policy.permits(&packet) {
            return Err(DropReason::PolicyDrop);
        }

        match entry.handler.handle(packet) {
            HandlerOutcome::Consumed => {
                ctx.stats.increment(Counter::InDelivers);
                return Ok(());
            }
            HandlerOutcome::Resubmit(next, returned) => {
                tracing::trace!(from = %protocol, to = %next, "handler resubmitted packet");
                packet = returned;
                protocol = next;
                resubmits += 1;
            }
        }
    }
}

fn strip_if_needed(packet: &mut PacketBuf) -> Result<(), DropReason> {
    if packet.transport_payload().is_none() {
        let header_len = packet
            .ipv4_header()
            .map_err(|_| DropReason::Truncated)?
            .header_len();
        packet
            .strip_network_header(header_len)
            .map_err(|_| DropReason::Truncated)?;
    }
    Ok(())
}

fn is_fragment(packet: &PacketBuf) -> Result<bool, DropReason> {
    Ok(packet
        .ipv4_header()
        .map_err(|_| DropReason::Truncated)?
        .is_fragment())
}
