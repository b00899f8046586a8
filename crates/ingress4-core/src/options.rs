//! IPv4 options region parsing.
//!
//! Options are rare; the pipeline only parses them when the header length
//! field exceeds the minimum. Every TLV length is validated against the
//! region before any payload byte is read, so a malformed option can never
//! cause an over-read.

use crate::error::PacketError;

/// Option numbers (type byte with copied/class bits included).
const OPT_END: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_LSRR: u8 = 131;
const OPT_SSRR: u8 = 137;
const OPT_RECORD_ROUTE: u8 = 7;
const OPT_TIMESTAMP: u8 = 68;
const OPT_ROUTER_ALERT: u8 = 148;

/// Loose vs strict source routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRouteKind {
    Loose,
    Strict,
}

/// A parsed source-route option (LSRR or SSRR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRouteOption {
    pub kind: SourceRouteKind,
    /// Offset of the option's type byte within the options region.
    pub offset: usize,
    /// The pointer field: index of the next route entry, 4-based.
    pub pointer: u8,
    /// Remaining route data (addresses), raw.
    pub route: Vec<u8>,
}

/// One recognized option occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionEntry {
    RouterAlert { value: u16 },
    RecordRoute,
    Timestamp,
    SourceRoute(SourceRouteOption),
    /// An option this stack does not interpret but whose framing was valid.
    Unrecognized { kind: u8 },
}

/// Structured result of walking the options region once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub entries: Vec<OptionEntry>,
    pub router_alert: bool,
    pub source_route: Option<SourceRouteOption>,
}

impl ParsedOptions {
    /// Parse the options region of a header (the bytes between the fixed
    /// header and the declared header length).
    pub fn parse(region: &[u8]) -> Result<Self, PacketError> {
        let mut parsed = ParsedOptions::default();
        let mut offset = 0;

        while offset < region.len() {
            let kind = region[offset];
            match kind {
                OPT_END => break,
                OPT_NOP => {
                    offset += 1;
                    continue;
                }
                _ => {}
            }

            if offset + 1 >= region.len() {
                return Err(PacketError::BadOption {
                    offset,
                    reason: "option truncated before length byte",
                });
            }
            let len = usize::from(region[offset + 1]);
            if len < 2 {
                return Err(PacketError::BadOption {
                    offset,
                    reason: "length field below option minimum",
                });
            }
            if offset + len > region.len() {
                return Err(PacketError::BadOption {
                    offset,
                    reason: "length field runs past region",
                });
            }
            let body = &region[offset + 2..offset + len];

            match kind {
                OPT_LSRR | OPT_SSRR => {
                    if len < 3 {
                        return Err(PacketError::BadOption {
                            offset,
                            reason: "source route without pointer",
                        });
                    }
                    let pointer = body[0];
                    if pointer < 4 {
                        return Err(PacketError::BadOption {
                            offset,
                            reason: "source route pointer below 4",
                        });
                    }
                    // Route data is whole addresses only.
                    if (len - 3) % 4 != 0 {
                        return Err(PacketError::BadOption {
                            offset,
                            reason: "source route data not address-aligned",
                        });
                    }
                    let opt = SourceRouteOption {
                        kind: if kind == OPT_SSRR {
                            SourceRouteKind::Strict
                        } else {
                            SourceRouteKind::Loose
                        },
                        offset,
                        pointer,
                        route: body[1..].to_vec(),
                    };
                    if parsed.source_route.is_none() {
                        parsed.source_route = Some(opt.clone());
                    }
                    parsed.entries.push(OptionEntry::SourceRoute(opt));
                }
                OPT_ROUTER_ALERT => {
                    if len != 4 {
                        return Err(PacketError::BadOption {
                            offset,
                            reason: "router alert must be 4 bytes",
                        });
                    }
                    parsed.router_alert = true;
                    parsed.entries.push(OptionEntry::RouterAlert {
                        value: u16::from_be_bytes([body[0], body[1]]),
                    });
                }
                OPT_RECORD_ROUTE => parsed.entries.push(OptionEntry::RecordRoute),
                OPT_TIMESTAMP => parsed.entries.push(OptionEntry::Timestamp),
                _ => parsed.entries.push(OptionEntry::Unrecognized { kind }),
            }

            offset += len;
        }

        Ok(parsed)
    }

    pub fn has_source_route(&self) -> bool {
        self.source_route.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_parses_empty() {
        let parsed = ParsedOptions::parse(&[]).unwrap();
        assert!(parsed.entries.is_empty());
        assert!(!parsed.router_alert);
        assert!(!parsed.has_source_route());
    }

    #[test]
    fn nop_padding_and_end() {
        let parsed = ParsedOptions::parse(&[1, 1, 0, 0xff]).unwrap();
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn router_alert_recognized() {
        let parsed = ParsedOptions::parse(&[148, 4, 0, 0]).unwrap();
        assert!(parsed.router_alert);
        assert_eq!(parsed.entries, vec![OptionEntry::RouterAlert { value: 0 }]);
    }

    #[test]
    fn router_alert_bad_length_rejected() {
        let err = ParsedOptions::parse(&[148, 6, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, PacketError::BadOption { offset: 0, .. }));
    }

    #[test]
    fn loose_source_route_parsed() {
        // LSRR, len 7, pointer 4, one address
        let region = [131, 7, 4, 10, 0, 0, 1, 0];
        let parsed = ParsedOptions::parse(&region).unwrap();
        let srr = parsed.source_route.expect("source route");
        assert_eq!(srr.kind, SourceRouteKind::Loose);
        assert_eq!(srr.pointer, 4);
        assert_eq!(srr.route, vec![10, 0, 0, 1]);
    }

    #[test]
    fn strict_source_route_parsed() {
        let region = [137, 3, 4, 0];
        let parsed = ParsedOptions::parse(&region).unwrap();
        assert_eq!(
            parsed.source_route.unwrap().kind,
            SourceRouteKind::Strict
        );
    }

    #[test]
    fn source_route_bad_pointer_rejected() {
        let err = ParsedOptions::parse(&[131, 3, 2, 0]).unwrap_err();
        assert!(matches!(err, PacketError::BadOption { .. }));
    }

    #[test]
    fn overlong_length_rejected() {
        let err = ParsedOptions::parse(&[7, 40, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            PacketError::BadOption {
                reason: "length field runs past region",
                ..
            }
        ));
    }

    #[test]
    fn zero_length_tlv_rejected() {
        let err = ParsedOptions::parse(&[7, 1, 0, 0]).unwrap_err();
        assert!(matches!(err, PacketError::BadOption { .. }));
    }

    #[test]
    fn truncated_before_length_rejected() {
        let err = ParsedOptions::parse(&[7]).unwrap_err();
        assert!(matches!(err, PacketError::BadOption { .. }));
    }

    #[test]
    fn unrecognized_option_kept() {
        let parsed = ParsedOptions::parse(&[94, 2, 0, 0]).unwrap();
        assert_eq!(parsed.entries, vec![OptionEntry::Unrecognized { kind: 94 }]);
    }
}
