//! Wire-level error types.

/// Errors from parsing or manipulating a single packet buffer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too short: need {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("header length field below minimum: {ihl} words")]
    BadHeaderLength { ihl: u8 },

    #[error("unsupported protocol version: {version}")]
    BadVersion { version: u8 },

    #[error("header checksum mismatch")]
    ChecksumMismatch,

    #[error("declared total length {total} below header length {header}")]
    BadTotalLength { total: usize, header: usize },

    #[error("malformed option at offset {offset}: {reason}")]
    BadOption { offset: usize, reason: &'static str },

    #[error("trim target {target} exceeds buffer length {len}")]
    TrimOutOfRange { target: usize, len: usize },

    #[error("duplication allowance exhausted")]
    DupBudgetExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PacketError::TooShort { min: 20, actual: 7 };
        assert_eq!(err.to_string(), "buffer too short: need 20 bytes, got 7");

        let err = PacketError::BadOption {
            offset: 22,
            reason: "length field runs past region",
        };
        assert!(err.to_string().contains("offset 22"));
    }
}
