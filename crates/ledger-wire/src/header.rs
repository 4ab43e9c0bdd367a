//! Frame header for the ledger wire protocol
//!
//! The header is 8 bytes:
//! - Bytes 0-1: Magic (`LG`)
//! - Byte 2: Version
//! - Byte 3: Message kind
//! - Bytes 4-7: Body length (LE)

use ledger_core::{LedgerError, LedgerResult};

/// Header size in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Frame magic
pub const FRAME_MAGIC: [u8; 2] = *b"LG";

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Largest accepted body (full-log snapshots included)
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Message kind carried in byte 3
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    // User requests
    CreateAccount = 0x01,
    DeleteAccount = 0x02,
    TransferTo = 0x03,
    Balance = 0x04,

    // Admin requests
    Activate = 0x10,
    Deactivate = 0x11,
    DumpLedgerState = 0x12,
    TriggerGossip = 0x13,

    // Replica-to-replica
    PushLedgerSnapshot = 0x20,

    // Responses
    ClockReply = 0x80,
    BalanceReply = 0x81,
    Ack = 0x82,
    LedgerStateReply = 0x83,
    GossipReply = 0x84,
    ErrorReply = 0xFF,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageKind::CreateAccount),
            0x02 => Some(MessageKind::DeleteAccount),
            0x03 => Some(MessageKind::TransferTo),
            0x04 => Some(MessageKind::Balance),
            0x10 => Some(MessageKind::Activate),
            0x11 => Some(MessageKind::Deactivate),
            0x12 => Some(MessageKind::DumpLedgerState),
            0x13 => Some(MessageKind::TriggerGossip),
            0x20 => Some(MessageKind::PushLedgerSnapshot),
            0x80 => Some(MessageKind::ClockReply),
            0x81 => Some(MessageKind::BalanceReply),
            0x82 => Some(MessageKind::Ack),
            0x83 => Some(MessageKind::LedgerStateReply),
            0x84 => Some(MessageKind::GossipReply),
            0xFF => Some(MessageKind::ErrorReply),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Is this a response (vs request)?
    pub fn is_response(self) -> bool {
        (self as u8) >= 0x80
    }
}

/// Frame header structure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: MessageKind,
    pub body_len: u32,
}

impl FrameHeader {
    pub fn new(kind: MessageKind, body_len: u32) -> Self {
        FrameHeader {
            version: WIRE_VERSION,
            kind,
            body_len,
        }
    }

    /// Parse header from bytes
    pub fn parse(buf: &[u8]) -> LedgerResult<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(LedgerError::BufferTooShort {
                expected: FRAME_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        if buf[0..2] != FRAME_MAGIC {
            return Err(LedgerError::InvalidWireFormat("Bad frame magic".into()));
        }

        let version = buf[2];
        if version != WIRE_VERSION {
            return Err(LedgerError::InvalidWireFormat(format!(
                "Unsupported wire version: {}",
                version
            )));
        }

        let kind = MessageKind::from_byte(buf[3]).ok_or(LedgerError::UnknownMessageKind(buf[3]))?;
        let body_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        if body_len as usize > MAX_BODY_SIZE {
            return Err(LedgerError::InvalidWireFormat(format!(
                "Body too large: {} > {}",
                body_len, MAX_BODY_SIZE
            )));
        }

        Ok(FrameHeader {
            version,
            kind,
            body_len,
        })
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&FRAME_MAGIC);
        buf[2] = self.version;
        buf[3] = self.kind.to_byte();
        buf[4..8].copy_from_slice(&self.body_len.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(MessageKind::PushLedgerSnapshot, 0x0001_0203);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[4..8], &[0x03, 0x02, 0x01, 0x00]);

        let parsed = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.body_len, 0x0001_0203);
    }

    #[test]
    fn test_body_size_limit_is_inclusive() {
        let at_limit = FrameHeader::new(MessageKind::Ack, MAX_BODY_SIZE as u32).to_bytes();
        assert_eq!(
            FrameHeader::parse(&at_limit).unwrap().body_len as usize,
            MAX_BODY_SIZE
        );

        let over = FrameHeader::new(MessageKind::Ack, (MAX_BODY_SIZE + 1) as u32).to_bytes();
        assert!(matches!(
            FrameHeader::parse(&over),
            Err(LedgerError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_header_too_short() {
        let buf = [0u8; 4];
        let result = FrameHeader::parse(&buf);
        assert!(matches!(result, Err(LedgerError::BufferTooShort { .. })));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = FrameHeader::new(MessageKind::Ack, 0).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            FrameHeader::parse(&bytes),
            Err(LedgerError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let mut bytes = FrameHeader::new(MessageKind::Ack, 0).to_bytes();
        bytes[3] = 0x55;
        assert_eq!(
            FrameHeader::parse(&bytes),
            Err(LedgerError::UnknownMessageKind(0x55))
        );
    }

    #[test]
    fn test_oversized_body() {
        let bytes = FrameHeader::new(MessageKind::Ack, (MAX_BODY_SIZE + 1) as u32).to_bytes();
        assert!(FrameHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_response_kinds() {
        assert!(MessageKind::ErrorReply.is_response());
        assert!(!MessageKind::PushLedgerSnapshot.is_response());
    }
}
