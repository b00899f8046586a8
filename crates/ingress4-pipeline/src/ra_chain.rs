//! Router-alert observer chain.
//!
//! Subscribed observers receive copies of packets whose header carries
//! a router-alert option, and of any packet matching their declared
//! protocol interest during local delivery. Entries are traversed in
//! registration order; the last matching observer receives the original
//! buffer while earlier matches receive accounted duplicates, so the
//! common single-observer case never copies.

use std::sync::{Arc, RwLock};

use ingress4_core::{IfaceId, NetnsId, PacketBuf, Protocol};

use crate::demux::{Reassembler, ReassemblyContext, ReassemblyOutcome};

/// Identity of the process that registered an observer, used to tear
/// the registration down when that process goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

/// A packet consumer subscribed to the chain.
pub trait Observer: Send + Sync {
    fn deliver(&self, packet: PacketBuf);
}

/// One registration in the chain.
#[derive(Clone)]
pub struct ObserverEntry {
    pub owner: OwnerId,
    /// Protocol interest for the demultiplexer path.
    pub protocol: Protocol,
    /// Bound ingress interface, or wildcard.
    pub iface: Option<IfaceId>,
    pub netns: NetnsId,
    pub observer: Arc<dyn Observer>,
}

impl ObserverEntry {
    fn matches(&self, packet: &PacketBuf, protocol: Protocol) -> bool {
        self.protocol == protocol
            && self.netns == packet.netns()
            && self.iface.map_or(true, |bound| bound == packet.iface())
    }
}

/// Result of a router-alert fan-out.
pub enum FanOut {
    /// At least one observer matched and the packet was consumed.
    Handled,
    /// No observer matched; the caller proceeds with the packet.
    NotHandled(PacketBuf),
}

/// Registration-ordered observer list.
///
/// Traversal snapshots the matching handles under the read lock and
/// delivers outside it, so an observer may legally re-enter the chain.
pub struct ObserverChain {
    entries: RwLock<Vec<ObserverEntry>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, entry: ObserverEntry) {
        let mut entries = self.entries.write().expect("observer chain lock poisoned");
        entries.push(entry);
    }

    /// Remove every registration owned by `owner`. Returns how many
    /// were removed.
    pub fn unregister(&self, owner: OwnerId) -> usize {
        let mut entries = self.entries.write().expect("observer chain lock poisoned");
        let before = entries.len();
        entries.retain(|entry| entry.owner != owner);
        before - entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .expect("observer chain lock poisoned")
            .is_empty()
    }

    fn matching(&self, packet: &PacketBuf, protocol: Protocol) -> Vec<Arc<dyn Observer>> {
        self.entries
            .read()
            .expect("observer chain lock poisoned")
            .iter()
            .filter(|entry| entry.matches(packet, protocol))
            .map(|entry| Arc::clone(&entry.observer))
            .collect()
    }

    /// Fan a router-alert packet out to every matching observer,
    /// consuming it. A fragment is reassembled before any observer sees
    /// it; a pending reassembly still counts as handled because the
    /// chain keeps ownership of the eventual datagram.
    pub fn fan_out(&self, mut packet: PacketBuf, reassembler: &dyn Reassembler) -> FanOut {
        let protocol = match packet.ipv4_header() {
            Ok(header) => header.protocol(),
            Err(_) => return FanOut::NotHandled(packet),
        };
        let matched = self.matching(&packet, protocol);
        if matched.is_empty() {
            return FanOut::NotHandled(packet);
        }

        let is_fragment = packet
            .ipv4_header()
            .map(|header| header.is_fragment())
            .unwrap_or(false);
        if is_fragment {
            match reassembler.submit(packet, ReassemblyContext::RouterAlertChain) {
                ReassemblyOutcome::Pending => return FanOut::Handled,
                ReassemblyOutcome::Complete(complete) => packet = complete,
            }
        }

        let last = matched.len() - 1;
        for observer in &matched[..last] {
            match packet.try_duplicate() {
                Ok(copy) => observer.deliver(copy),
                Err(err) => {
                    tracing::debug!(%protocol, %err, "duplication failed, observer skipped");
                }
            }
        }
        matched[last].deliver(packet);
        FanOut::Handled
    }

    /// Deliver duplicates to every observer whose interest matches
    /// `protocol`, keeping the original with the caller. Returns whether
    /// any observer matched, even if duplication failed for all of them.
    pub fn observe_clones(&self, packet: &mut PacketBuf, protocol: Protocol) -> bool {
        let matched = self.matching(packet, protocol);
        for observer in &matched {
            match packet.try_duplicate() {
                Ok(copy) => observer.deliver(copy),
                Err(err) => {
                    tracing::debug!(%protocol, %err, "duplication failed, observer skipped");
                }
            }
        }
        !matched.is_empty()
    }
}

impl Default for ObserverChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ingress4_core::LinkKind;

    use super::*;

    struct Recording {
        delivered: AtomicUsize,
        refs_seen: Mutex<Vec<usize>>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: AtomicUsize::new(0),
                refs_seen: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.delivered.load(Ordering::SeqCst)
        }
    }

    impl Observer for Recording {
        fn deliver(&self, packet: PacketBuf) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.refs_seen.lock().unwrap().push(packet.storage_refs());
        }
    }

    struct NoReassembly;

    impl Reassembler for NoReassembly {
        fn submit(&self, _packet: PacketBuf, _context: ReassemblyContext) -> ReassemblyOutcome {
            panic!("unexpected reassembly submission");
        }
    }

    struct Swallow;

    impl Reassembler for Swallow {
        fn submit(&self, _packet: PacketBuf, _context: ReassemblyContext) -> ReassemblyOutcome {
            ReassemblyOutcome::Pending
        }
    }

    fn datagram(protocol: Protocol, fragment: bool) -> PacketBuf {
        let mut bytes = vec![0u8; 28];
        bytes[0] = 0x45;
        bytes[2..4].copy_from_slice(&28u16.to_be_bytes());
        if fragment {
            bytes[6..8].copy_from_slice(&0x2000u16.to_be_bytes());
        }
        bytes[8] = 64;
        bytes[9] = protocol.number();
        bytes[12..16].copy_from_slice(&Ipv4Addr::new(10, 0, 0, 1).octets());
        bytes[16..20].copy_from_slice(&Ipv4Addr::new(10, 0, 0, 2).octets());
        let check = ingress4_core::checksum::checksum(&bytes[..20]);
        bytes[10..12].copy_from_slice(&check.to_be_bytes());
        let mut packet = PacketBuf::new(bytes, IfaceId::new(1), NetnsId::DEFAULT, LinkKind::Host);
        packet.control_block_mut().dup_allowance = Some(8);
        packet
    }

    fn entry(owner: u64, protocol: Protocol, observer: Arc<dyn Observer>) -> ObserverEntry {
        ObserverEntry {
            owner: OwnerId(owner),
            protocol,
            iface: None,
            netns: NetnsId::DEFAULT,
            observer,
        }
    }

    #[test]
    fn fan_out_without_match_returns_packet() {
        let chain = ObserverChain::new();
        let packet = datagram(Protocol::UDP, false);
        match chain.fan_out(packet, &NoReassembly) {
            FanOut::NotHandled(_) => {}
            FanOut::Handled => panic!("empty chain claimed the packet"),
        }
    }

    #[test]
    fn last_observer_receives_original_buffer() {
        let chain = ObserverChain::new();
        let first = Recording::new();
        let second = Recording::new();
        chain.register(entry(1, Protocol::UDP, first.clone()));
        chain.register(entry(2, Protocol::UDP, second.clone()));

        let packet = datagram(Protocol::UDP, false);
        assert!(matches!(chain.fan_out(packet, &NoReassembly), FanOut::Handled));
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        // The first observer saw a duplicate (storage shared with the
        // original still in flight); the last got the original.
        assert!(first.refs_seen.lock().unwrap()[0] >= 2);
    }

    #[test]
    fn protocol_and_namespace_filters_apply() {
        let chain = ObserverChain::new();
        let udp = Recording::new();
        let tcp = Recording::new();
        let other_ns = Recording::new();
        chain.register(entry(1, Protocol::UDP, udp.clone()));
        chain.register(entry(2, Protocol::TCP, tcp.clone()));
        chain.register(ObserverEntry {
            owner: OwnerId(3),
            protocol: Protocol::UDP,
            iface: None,
            netns: NetnsId::new(7),
            observer: other_ns.clone(),
        });

        let packet = datagram(Protocol::UDP, false);
        assert!(matches!(chain.fan_out(packet, &NoReassembly), FanOut::Handled));
        assert_eq!(udp.count(), 1);
        assert_eq!(tcp.count(), 0);
        assert_eq!(other_ns.count(), 0);
    }

    #[test]
    fn bound_interface_excludes_other_ingress() {
        let chain = ObserverChain::new();
        let bound = Recording::new();
        chain.register(ObserverEntry {
            owner: OwnerId(1),
            protocol: Protocol::UDP,
            iface: Some(IfaceId::new(9)),
            netns: NetnsId::DEFAULT,
            observer: bound.clone(),
        });

        let packet = datagram(Protocol::UDP, false);
        match chain.fan_out(packet, &NoReassembly) {
            FanOut::NotHandled(_) => {}
            FanOut::Handled => panic!("interface filter did not apply"),
        }
        assert_eq!(bound.count(), 0);
    }

    #[test]
    fn fragment_is_reassembled_before_delivery() {
        let chain = ObserverChain::new();
        let observer = Recording::new();
        chain.register(entry(1, Protocol::UDP, observer.clone()));

        let packet = datagram(Protocol::UDP, true);
        assert!(matches!(chain.fan_out(packet, &Swallow), FanOut::Handled));
        // Pending reassembly: handled, but nothing delivered yet.
        assert_eq!(observer.count(), 0);
    }

    #[test]
    fn duplication_failure_skips_observer_but_delivers_rest() {
        let chain = ObserverChain::new();
        let first = Recording::new();
        let second = Recording::new();
        chain.register(entry(1, Protocol::UDP, first.clone()));
        chain.register(entry(2, Protocol::UDP, second.clone()));

        let mut packet = datagram(Protocol::UDP, false);
        packet.control_block_mut().dup_allowance = Some(0);
        assert!(matches!(chain.fan_out(packet, &NoReassembly), FanOut::Handled));
        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn unregister_removes_only_owned_entries() {
        let chain = ObserverChain::new();
        let keep = Recording::new();
        let gone = Recording::new();
        chain.register(entry(1, Protocol::UDP, gone.clone()));
        chain.register(entry(1, Protocol::TCP, gone.clone()));
        chain.register(entry(2, Protocol::UDP, keep.clone()));

        assert_eq!(chain.unregister(OwnerId(1)), 2);
        let packet = datagram(Protocol::UDP, false);
        assert!(matches!(chain.fan_out(packet, &NoReassembly), FanOut::Handled));
        assert_eq!(keep.count(), 1);
        assert_eq!(gone.count(), 0);
    }

    #[test]
    fn observe_clones_keeps_original_with_caller() {
        let chain = ObserverChain::new();
        let observer = Recording::new();
        chain.register(entry(1, Protocol::TCP, observer.clone()));

        let mut packet = datagram(Protocol::TCP, false);
        assert!(chain.observe_clones(&mut packet, Protocol::TCP));
        assert_eq!(observer.count(), 1);
        assert!(!chain.observe_clones(&mut packet, Protocol::UDP));
    }
}
