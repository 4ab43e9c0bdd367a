//! Field codecs shared by every message
//!
//! Layouts (all integers little-endian):
//! - String: u16 length + UTF-8 bytes
//! - Clock: u16 entry count + (String replica, u64 counter) per entry, sorted by replica
//! - Operation: u8 kind, String origin, String account, [String destination, i64 amount]
//!   for transfers, Clock causal context, Clock origin timestamp, u8 stable flag

use bytes::{Buf, BufMut};

use ledger_core::{LedgerError, LedgerResult, LogicalClock, OpKind, OpType, Operation, ReplicaId};

/// Longest string a u16 length prefix can carry
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Bounds-checked reader over a received buffer
pub struct WireReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, consumed: 0 }
    }

    /// Bytes read so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> LedgerResult<()> {
        if self.buf.remaining() < n {
            return Err(LedgerError::BufferTooShort {
                expected: self.consumed + n,
                actual: self.consumed + self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> LedgerResult<u8> {
        self.need(1)?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> LedgerResult<u16> {
        self.need(2)?;
        self.consumed += 2;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> LedgerResult<u32> {
        self.need(4)?;
        self.consumed += 4;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> LedgerResult<u64> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_i64(&mut self) -> LedgerResult<i64> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_bool(&mut self) -> LedgerResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(LedgerError::InvalidWireFormat(format!(
                "Invalid boolean byte: {}",
                b
            ))),
        }
    }

    pub fn read_string(&mut self) -> LedgerResult<String> {
        let len = self.read_u16()? as usize;
        self.need(len)?;
        let s = std::str::from_utf8(&self.buf[..len])
            .map_err(|e| LedgerError::InvalidWireFormat(format!("Invalid UTF-8: {}", e)))?
            .to_owned();
        self.buf.advance(len);
        self.consumed += len;
        Ok(s)
    }

    pub fn read_clock(&mut self) -> LedgerResult<LogicalClock> {
        let count = self.read_u16()? as usize;
        let mut entries = Vec::with_capacity(count.min(self.remaining() / 10 + 1));
        for _ in 0..count {
            let replica = self.read_string()?;
            let counter = self.read_u64()?;
            entries.push((replica, counter));
        }
        Ok(LogicalClock::from_entries(entries))
    }

    pub fn read_operation(&mut self) -> LedgerResult<Operation> {
        let tag = self.read_u8()?;
        let op_type = OpType::from_byte(tag).ok_or(LedgerError::UnknownOperationKind(tag))?;
        let origin = ReplicaId::new(self.read_string()?);
        let account = self.read_string()?.into();

        let kind = match op_type {
            OpType::CreateAccount => OpKind::CreateAccount { account },
            OpType::DeleteAccount => OpKind::DeleteAccount { account },
            OpType::Transfer => {
                let to = self.read_string()?.into();
                let amount = self.read_i64()?;
                OpKind::Transfer {
                    from: account,
                    to,
                    amount,
                }
            }
        };

        let causal_context = self.read_clock()?;
        let origin_timestamp = self.read_clock()?;
        let stable = self.read_bool()?;

        Ok(Operation::new(kind, origin, causal_context, origin_timestamp).with_stable(stable))
    }

    pub fn read_operations(&mut self) -> LedgerResult<Vec<Operation>> {
        let count = self.read_u32()? as usize;
        let mut ops = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ops.push(self.read_operation()?);
        }
        Ok(ops)
    }

    /// Fail if trailing bytes remain
    pub fn finish(self) -> LedgerResult<()> {
        if self.buf.has_remaining() {
            return Err(LedgerError::InvalidWireFormat(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

pub fn put_string<B: BufMut>(buf: &mut B, s: &str) -> LedgerResult<()> {
    if s.len() > MAX_STRING_LEN {
        return Err(LedgerError::InvalidWireFormat(format!(
            "String too long: {} > {}",
            s.len(),
            MAX_STRING_LEN
        )));
    }
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn put_clock<B: BufMut>(buf: &mut B, clock: &LogicalClock) -> LedgerResult<()> {
    if clock.len() > u16::MAX as usize {
        return Err(LedgerError::InvalidWireFormat("Clock has too many entries".into()));
    }
    buf.put_u16_le(clock.len() as u16);
    for (replica, counter) in clock.iter() {
        put_string(buf, replica.as_str())?;
        buf.put_u64_le(counter);
    }
    Ok(())
}

pub fn put_operation<B: BufMut>(buf: &mut B, op: &Operation) -> LedgerResult<()> {
    buf.put_u8(op.kind.op_type().to_byte());
    put_string(buf, op.origin.as_str())?;
    match &op.kind {
        OpKind::CreateAccount { account } | OpKind::DeleteAccount { account } => {
            put_string(buf, account.as_str())?;
        }
        OpKind::Transfer { from, to, amount } => {
            put_string(buf, from.as_str())?;
            put_string(buf, to.as_str())?;
            buf.put_i64_le(*amount);
        }
    }
    put_clock(buf, &op.causal_context)?;
    put_clock(buf, &op.origin_timestamp)?;
    buf.put_u8(op.is_stable() as u8);
    Ok(())
}

pub fn put_operations<B: BufMut>(buf: &mut B, ops: &[Operation]) -> LedgerResult<()> {
    if ops.len() > u32::MAX as usize {
        return Err(LedgerError::InvalidWireFormat("Too many operations".into()));
    }
    buf.put_u32_le(ops.len() as u32);
    for op in ops {
        put_operation(buf, op)?;
    }
    Ok(())
}

/// Encode a single operation into a fresh buffer
pub fn encode_operation(op: &Operation) -> LedgerResult<Vec<u8>> {
    let mut buf = Vec::new();
    put_operation(&mut buf, op)?;
    Ok(buf)
}

/// Decode exactly one operation
pub fn decode_operation(buf: &[u8]) -> LedgerResult<Operation> {
    let mut reader = WireReader::new(buf);
    let op = reader.read_operation()?;
    reader.finish()?;
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> Operation {
        Operation::new(
            OpKind::Transfer {
                from: "broker".into(),
                to: "u1".into(),
                amount: 25,
            },
            "A".into(),
            LogicalClock::from_entries([("A", 1), ("B", 3)]),
            LogicalClock::from_entries([("A", 2), ("B", 3)]),
        )
        .with_stable(true)
    }

    #[test]
    fn test_operation_roundtrip() {
        let op = transfer();
        let decoded = decode_operation(&encode_operation(&op).unwrap()).unwrap();

        assert_eq!(decoded, op);
        assert!(decoded.is_stable());
        assert_eq!(decoded.causal_context.get("B"), 3);
    }

    #[test]
    fn test_truncated_operation() {
        let bytes = encode_operation(&transfer()).unwrap();
        for cut in [0, 1, 5, bytes.len() - 1] {
            let result = decode_operation(&bytes[..cut]);
            assert!(matches!(result, Err(LedgerError::BufferTooShort { .. })));
        }
    }

    #[test]
    fn test_unknown_operation_kind() {
        let mut bytes = encode_operation(&transfer()).unwrap();
        bytes[0] = 0x42;
        assert_eq!(
            decode_operation(&bytes),
            Err(LedgerError::UnknownOperationKind(0x42))
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_operation(&transfer()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_operation(&bytes),
            Err(LedgerError::InvalidWireFormat(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..256)) {
            let _ = decode_operation(&bytes);
            let _ = WireReader::new(&bytes).read_operations();
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Vec::new();
        buf.put_u16_le(2);
        buf.put_slice(&[0xff, 0xfe]);
        let mut reader = WireReader::new(&buf);
        assert!(matches!(
            reader.read_string(),
            Err(LedgerError::InvalidWireFormat(_))
        ));
    }
}
