//! Fixed-offset IPv4 header view.
//!
//! The header layout is an external fixed-format contract: version and
//! header length share byte 0, lengths and the fragment field are
//! big-endian 16-bit words, addresses sit at bytes 12 and 16. The view
//! borrows the buffer; it never owns bytes.

use std::net::Ipv4Addr;

use crate::error::PacketError;
use crate::types::{Protocol, Tos};

/// Minimum IPv4 header length in bytes (five 32-bit words, no options).
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Minimum value of the header-length field, in 32-bit words.
pub const IPV4_MIN_IHL: u8 = 5;

/// The only version this stack accepts.
pub const IPV4_VERSION: u8 = 4;

/// More-fragments flag in the fragment field.
const FRAG_MF: u16 = 0x2000;

/// Don't-fragment flag in the fragment field.
const FRAG_DF: u16 = 0x4000;

/// Fragment offset mask (units of 8 bytes).
const FRAG_OFFSET_MASK: u16 = 0x1fff;

/// A borrowed view of an IPv4 header.
///
/// Construction only checks that the minimum header is present; callers
/// that need the full declared header (options included) gate on
/// [`Ipv4Header::header_len`] themselves.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    bytes: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    /// Create a view over `bytes`, which must start at the version byte.
    pub fn new(bytes: &'a [u8]) -> Result<Self, PacketError> {
        if bytes.len() < IPV4_MIN_HEADER_LEN {
            return Err(PacketError::TooShort {
                min: IPV4_MIN_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn version(&self) -> u8 {
        self.bytes[0] >> 4
    }

    /// Header length field, in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.bytes[0] & 0x0f
    }

    /// Declared header length in bytes (`ihl * 4`).
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl()) * 4
    }

    pub fn tos(&self) -> Tos {
        Tos::new(self.bytes[1])
    }

    /// Declared total datagram length in bytes.
    pub fn total_len(&self) -> usize {
        usize::from(u16::from_be_bytes([self.bytes[2], self.bytes[3]]))
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    fn frag_field(&self) -> u16 {
        u16::from_be_bytes([self.bytes[6], self.bytes[7]])
    }

    pub fn more_fragments(&self) -> bool {
        self.frag_field() & FRAG_MF != 0
    }

    pub fn dont_fragment(&self) -> bool {
        self.frag_field() & FRAG_DF != 0
    }

    /// Fragment offset in bytes.
    pub fn fragment_offset(&self) -> usize {
        usize::from(self.frag_field() & FRAG_OFFSET_MASK) * 8
    }

    /// Whether this datagram is any part of a fragment train: the
    /// more-fragments flag set, or a nonzero offset.
    pub fn is_fragment(&self) -> bool {
        self.frag_field() & (FRAG_MF | FRAG_OFFSET_MASK) != 0
    }

    pub fn ttl(&self) -> u8 {
        self.bytes[8]
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::new(self.bytes[9])
    }

    pub fn checksum_field(&self) -> u16 {
        u16::from_be_bytes([self.bytes[10], self.bytes[11]])
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[12], self.bytes[13], self.bytes[14], self.bytes[15])
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19])
    }

    /// Whether the header declares options beyond the fixed part.
    pub fn has_options(&self) -> bool {
        self.ihl() > IPV4_MIN_IHL
    }

    /// The options region, if the buffer covers the declared header.
    pub fn options_region(&self) -> Result<&'a [u8], PacketError> {
        let header_len = self.header_len();
        if self.bytes.len() < header_len {
            return Err(PacketError::TooShort {
                min: header_len,
                actual: self.bytes.len(),
            });
        }
        Ok(&self.bytes[IPV4_MIN_HEADER_LEN..header_len])
    }
}
