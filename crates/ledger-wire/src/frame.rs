//! Complete frame structure for the ledger wire protocol
//!
//! Frame = Header + Body

use bytes::{BufMut, Bytes, BytesMut};

use ledger_core::{LedgerError, LedgerResult};

use crate::{FrameHeader, MessageKind, FRAME_HEADER_SIZE, MAX_BODY_SIZE};

/// Complete ledger frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub body: Bytes,
}

impl Frame {
    pub fn new(kind: MessageKind, body: impl Into<Bytes>) -> Self {
        Frame {
            kind,
            body: body.into(),
        }
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.kind, self.body.len() as u32)
    }

    /// Parse a complete frame from bytes
    pub fn parse(buf: &[u8]) -> LedgerResult<Self> {
        let header = FrameHeader::parse(buf)?;
        let total = FRAME_HEADER_SIZE + header.body_len as usize;

        if buf.len() < total {
            return Err(LedgerError::BufferTooShort {
                expected: total,
                actual: buf.len(),
            });
        }
        if buf.len() > total {
            return Err(LedgerError::InvalidWireFormat(
                "Trailing bytes after frame body".into(),
            ));
        }

        Ok(Frame {
            kind: header.kind,
            body: Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..total]),
        })
    }

    /// Assemble a frame from a parsed header and its body
    pub fn from_parts(header: FrameHeader, body: Vec<u8>) -> LedgerResult<Self> {
        if body.len() != header.body_len as usize {
            return Err(LedgerError::BufferTooShort {
                expected: header.body_len as usize,
                actual: body.len(),
            });
        }
        Ok(Frame {
            kind: header.kind,
            body: Bytes::from(body),
        })
    }

    /// Serialize frame to bytes
    pub fn serialize(&self) -> LedgerResult<Bytes> {
        if self.body.len() > MAX_BODY_SIZE {
            return Err(LedgerError::InvalidWireFormat(format!(
                "Frame too large: {} > {}",
                self.body.len(),
                MAX_BODY_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.header().to_bytes());
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Calculate total frame size
    pub fn size(&self) -> usize {
        FRAME_HEADER_SIZE + self.body.len()
    }
}
