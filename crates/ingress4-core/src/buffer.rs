//! The packet buffer threaded through the ingress pipeline.
//!
//! A [`PacketBuf`] owns its metadata (offsets, interface, control block)
//! while the underlying byte storage is reference-counted and may be
//! shared between explicit duplicates. Payload bytes are shared until a
//! mutation privatizes the storage (copy-on-write); header and offset
//! state are always per-copy.
//!
//! Ownership discipline: the pipeline borrows a `PacketBuf` through each
//! stage and transfers ownership exactly once, to a consumer or to the
//! release path. Additional copies exist only through
//! [`PacketBuf::try_duplicate`], which is accounted.

use std::sync::Arc;

use crate::error::PacketError;
use crate::header::Ipv4Header;
use crate::options::ParsedOptions;
use crate::types::{IfaceId, LinkKind, NetnsId, RouteDecision};

/// Per-packet scratch state, zeroed by the validator on accept.
///
/// The duplication allowance is accounting state rather than scratch and
/// survives a reset.
#[derive(Debug, Clone, Default)]
pub struct ControlBlock {
    /// Options parsed by the options processor, if the header carried any.
    pub options: Option<ParsedOptions>,
    /// Remaining explicit-duplication allowance for this traversal.
    /// `None` means unlimited.
    pub dup_allowance: Option<u32>,
}

impl ControlBlock {
    /// Clear scratch state, keeping the duplication allowance.
    pub fn reset(&mut self) {
        self.options = None;
    }

    /// Consume one unit of duplication allowance.
    pub fn consume_dup_allowance(&mut self) -> Result<(), PacketError> {
        match &mut self.dup_allowance {
            None => Ok(()),
            Some(0) => Err(PacketError::DupBudgetExhausted),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
        }
    }
}

/// One datagram plus per-packet pipeline state.
#[derive(Debug, Clone)]
pub struct PacketBuf {
    storage: Arc<Vec<u8>>,
    /// Logical start of the current layer's data within `storage`.
    start: usize,
    /// Logical end (exclusive) within `storage`; moved left by `trim`.
    end: usize,
    /// Offset of the network-layer header within `storage`.
    network_header: usize,
    /// Offset of the transport-layer payload, set when the network header
    /// is stripped.
    transport_header: Option<usize>,
    iface: IfaceId,
    netns: NetnsId,
    link_kind: LinkKind,
    route: Option<RouteDecision>,
    cb: ControlBlock,
}

impl PacketBuf {
    /// Wrap bytes received from the link layer. The buffer is assumed to
    /// start at the network-layer header.
    pub fn new(bytes: Vec<u8>, iface: IfaceId, netns: NetnsId, link_kind: LinkKind) -> Self {
        Self::from_shared(Arc::new(bytes), iface, netns, link_kind)
    }

    /// Wrap storage that may already be shared with other holders (a
    /// capturing tap, for instance). The pipeline privatizes it before
    /// any mutation.
    pub fn from_shared(
        storage: Arc<Vec<u8>>,
        iface: IfaceId,
        netns: NetnsId,
        link_kind: LinkKind,
    ) -> Self {
        let end = storage.len();
        Self {
            storage,
            start: 0,
            end,
            network_header: 0,
            transport_header: None,
            iface,
            netns,
            link_kind,
            route: None,
            cb: ControlBlock::default(),
        }
    }

    // -- Geometry --

    /// Current logical bytes, from the layer start to the trimmed end.
    pub fn bytes(&self) -> &[u8] {
        &self.storage[self.start..self.end]
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the first `count` logical bytes are present and
    /// byte-addressable. Must be checked before dereferencing header
    /// fields.
    pub fn may_pull(&self, count: usize) -> bool {
        self.len() >= count
    }

    /// Reduce the logical length to `len`, discarding link-layer padding.
    /// The storage is not reallocated.
    pub fn trim(&mut self, len: usize) -> Result<(), PacketError> {
        if len > self.len() {
            return Err(PacketError::TrimOutOfRange {
                target: len,
                len: self.len(),
            });
        }
        self.end = self.start + len;
        Ok(())
    }

    /// Advance the logical start past the network header and record the
    /// transport-layer offset.
    pub fn strip_network_header(&mut self, header_len: usize) -> Result<(), PacketError> {
        if !self.may_pull(header_len) {
            return Err(PacketError::TooShort {
                min: header_len,
                actual: self.len(),
            });
        }
        self.start += header_len;
        self.transport_header = Some(self.start);
        Ok(())
    }

    // -- Header access --

    /// View of the network-layer header. The header offset is cached and
    /// stays valid across `strip_network_header`.
    pub fn ipv4_header(&self) -> Result<Ipv4Header<'_>, PacketError> {
        Ipv4Header::new(&self.storage[self.network_header..self.end])
    }

    /// Transport payload, once the network header has been stripped.
    pub fn transport_payload(&self) -> Option<&[u8]> {
        self.transport_header
            .map(|offset| &self.storage[offset..self.end])
    }

    // -- Identity & attached state --

    pub fn iface(&self) -> IfaceId {
        self.iface
    }

    pub fn netns(&self) -> NetnsId {
        self.netns
    }

    pub fn link_kind(&self) -> LinkKind {
        self.link_kind
    }

    pub fn route(&self) -> Option<&RouteDecision> {
        self.route.as_ref()
    }

    /// Attach a forwarding descriptor. Later stages skip resolution when
    /// one is already present.
    pub fn attach_route(&mut self, decision: RouteDecision) {
        debug_assert!(self.route.is_none(), "route descriptor attached twice");
        self.route = Some(decision);
    }

    pub fn control_block(&self) -> &ControlBlock {
        &self.cb
    }

    pub fn control_block_mut(&mut self) -> &mut ControlBlock {
        &mut self.cb
    }

    // -- Sharing & mutation --

    /// Number of holders of the underlying storage, this copy included.
    pub fn storage_refs(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    /// Whether the storage is shared beyond this copy.
    pub fn is_shared(&self) -> bool {
        self.storage_refs() > 1
    }

    /// Make the storage private to this copy, cloning it if shared, and
    /// return the writable logical bytes. Privatization counts against
    /// the duplication allowance.
    pub fn make_writable(&mut self) -> Result<&mut [u8], PacketError> {
        if self.is_shared() {
            self.cb.consume_dup_allowance()?;
            self.storage = Arc::new((*self.storage).clone());
        }
        let start = self.start;
        let end = self.end;
        let storage = Arc::get_mut(&mut self.storage).expect("storage is private after clone");
        Ok(&mut storage[start..end])
    }

    /// Create an accounted duplicate: independent metadata and control
    /// block, shared payload storage.
    pub fn try_duplicate(&mut self) -> Result<PacketBuf, PacketError> {
        self.cb.consume_dup_allowance()?;
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Disposition, EgressHandle};

    fn buf(bytes: Vec<u8>) -> PacketBuf {
        PacketBuf::new(bytes, IfaceId::new(1), NetnsId::DEFAULT, LinkKind::Host)
    }

    #[test]
    fn geometry_after_trim_and_strip() {
        let mut p = buf(vec![0u8; 64]);
        assert_eq!(p.len(), 64);

        p.trim(40).unwrap();
        assert_eq!(p.len(), 40);

        p.strip_network_header(20).unwrap();
        assert_eq!(p.len(), 20);
        assert_eq!(p.transport_payload().unwrap().len(), 20);
    }

    #[test]
    fn trim_rejects_growth() {
        let mut p = buf(vec![0u8; 10]);
        let err = p.trim(11).unwrap_err();
        assert_eq!(err, PacketError::TrimOutOfRange { target: 11, len: 10 });
    }

    #[test]
    fn may_pull_bounds() {
        let p = buf(vec![0u8; 20]);
        assert!(p.may_pull(20));
        assert!(!p.may_pull(21));
    }

    #[test]
    fn strip_requires_pulled_header() {
        let mut p = buf(vec![0u8; 10]);
        assert!(p.strip_network_header(20).is_err());
    }

    #[test]
    fn header_view_survives_strip() {
        let mut bytes = vec![0u8; 40];
        bytes[0] = 0x45;
        bytes[9] = 17;
        let mut p = buf(bytes);
        p.strip_network_header(20).unwrap();
        let hdr = p.ipv4_header().unwrap();
        assert_eq!(hdr.protocol().number(), 17);
    }

    #[test]
    fn duplicate_shares_payload_until_write() {
        let mut p = buf(vec![1u8; 32]);
        let mut copy = p.try_duplicate().unwrap();
        assert_eq!(p.storage_refs(), 2);
        assert!(p.is_shared());

        // Writing privatizes the copy; the original is untouched.
        copy.make_writable().unwrap()[0] = 9;
        assert_eq!(copy.bytes()[0], 9);
        assert_eq!(p.bytes()[0], 1);
        assert_eq!(p.storage_refs(), 1);
    }

    #[test]
    fn releasing_one_copy_keeps_the_other_valid() {
        let mut p = buf(vec![7u8; 16]);
        let copy = p.try_duplicate().unwrap();
        drop(p);
        assert_eq!(copy.bytes(), &[7u8; 16]);
        assert_eq!(copy.storage_refs(), 1);
    }

    #[test]
    fn dup_allowance_exhaustion() {
        let mut p = buf(vec![0u8; 8]);
        p.control_block_mut().dup_allowance = Some(1);
        assert!(p.try_duplicate().is_ok());
        assert_eq!(
            p.try_duplicate().unwrap_err(),
            PacketError::DupBudgetExhausted
        );
    }

    #[test]
    fn control_block_reset_keeps_allowance() {
        let mut p = buf(vec![0u8; 8]);
        p.control_block_mut().dup_allowance = Some(3);
        p.control_block_mut().options = Some(ParsedOptions::default());
        p.control_block_mut().reset();
        assert!(p.control_block().options.is_none());
        assert_eq!(p.control_block().dup_allowance, Some(3));
    }

    #[test]
    fn route_attaches_once() {
        let mut p = buf(vec![0u8; 8]);
        assert!(p.route().is_none());
        p.attach_route(RouteDecision::new(
            Disposition::LocalDeliver,
            EgressHandle(1),
        ));
        assert_eq!(p.route().unwrap().disposition, Disposition::LocalDeliver);
    }
}
