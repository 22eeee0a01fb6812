//! Cursor over a binary frame, shared by the codec modules.

use crate::ProtocolError;

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, ProtocolError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("slice length checked");
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, ProtocolError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("slice length checked");
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_i64_be(&mut self) -> Result<i64, ProtocolError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn read_f64_be(&mut self) -> Result<f64, ProtocolError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(f64::from_be_bytes(bytes))
    }

    /// String with a u8 length prefix, bounded by `limit`.
    pub fn read_str_u8(&mut self, limit: usize, what: &'static str) -> Result<String, ProtocolError> {
        let len = self.read_u8()? as usize;
        if len > limit {
            return Err(ProtocolError::LimitExceeded(what));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidField(what))
    }

    /// String with a u16 length prefix, bounded by `limit`.
    pub fn read_str_u16(&mut self, limit: usize, what: &'static str) -> Result<String, ProtocolError> {
        let len = self.read_u16_be()? as usize;
        if len > limit {
            return Err(ProtocolError::LimitExceeded(what));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidField(what))
    }
}

/// Append a u8-length-prefixed string, bounded by `limit`.
pub(crate) fn write_str_u8(
    out: &mut Vec<u8>,
    s: &str,
    limit: usize,
    what: &'static str,
) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    if bytes.len() > limit.min(u8::MAX as usize) {
        return Err(ProtocolError::LimitExceeded(what));
    }
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Append a u16-length-prefixed string, bounded by `limit`.
pub(crate) fn write_str_u16(
    out: &mut Vec<u8>,
    s: &str,
    limit: usize,
    what: &'static str,
) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    if bytes.len() > limit.min(u16::MAX as usize) {
        return Err(ProtocolError::LimitExceeded(what));
    }
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}
