//! Self-describing structured-record encoding.
//!
//! Record payloads are routed by the server without static typing, so
//! every value carries a tag byte:
//!
//! ```text
//! value:
//!   [0] tag
//!   tag 0 Null   : no body
//!   tag 1 Bool   : [1] 0/1
//!   tag 2 Int    : i64 BE
//!   tag 3 Float  : f64 bits BE
//!   tag 4 Str    : u16 BE length + UTF-8 bytes
//!   tag 5 Bytes  : u32 BE length + bytes
//!   tag 6 List   : u16 BE count + values
//!   tag 7 Map    : u16 BE count + (key, value)*
//!   tag 8 Msg    : record (below)
//!
//! map key:
//!   [0] 0 = Int (i64 BE), 1 = Str (u16 BE length + UTF-8)
//!
//! record:
//!   u16 BE field count + (field name: u8 length + UTF-8, value)*
//! ```
//!
//! Decoding bounds nesting at [`MAX_RECORD_DEPTH`] so a malicious frame
//! cannot blow the stack.

use std::collections::BTreeMap;

use router_core::{FieldValue, MapKey, Record};

use crate::reader::{write_str_u8, write_str_u16, Reader};
use crate::wire_types::{MAX_FIELD_NAME_LEN, MAX_RECORD_DEPTH};
use crate::ProtocolError;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;
const TAG_MSG: u8 = 8;

const KEY_INT: u8 = 0;
const KEY_STR: u8 = 1;

const MAX_STR_LEN: usize = u16::MAX as usize;
const MAX_BYTES_LEN: usize = 1 << 20;
const MAX_CONTAINER_LEN: usize = u16::MAX as usize;

/// Encode a record (field count + named values) into `out`.
pub fn encode_record(record: &Record, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if record.len() > MAX_CONTAINER_LEN {
        return Err(ProtocolError::LimitExceeded("record fields"));
    }
    out.extend_from_slice(&(record.len() as u16).to_be_bytes());
    for (name, value) in record {
        write_str_u8(out, name, MAX_FIELD_NAME_LEN, "field name")?;
        encode_value(value, out)?;
    }
    Ok(())
}

/// Decode a record from a buffer containing exactly one record.
pub fn decode_record(buf: &[u8]) -> Result<Record, ProtocolError> {
    let mut r = Reader::new(buf);
    let record = read_record(&mut r, 0)?;
    Ok(record)
}

/// Encode one tagged value into `out`.
pub fn encode_value(value: &FieldValue, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    match value {
        FieldValue::Null => out.push(TAG_NULL),
        FieldValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        FieldValue::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        FieldValue::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        FieldValue::Str(s) => {
            out.push(TAG_STR);
            write_str_u16(out, s, MAX_STR_LEN, "string")?;
        }
        FieldValue::Bytes(b) => {
            if b.len() > MAX_BYTES_LEN {
                return Err(ProtocolError::LimitExceeded("bytes"));
            }
            out.push(TAG_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        FieldValue::List(items) => {
            if items.len() > MAX_CONTAINER_LEN {
                return Err(ProtocolError::LimitExceeded("list"));
            }
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u16).to_be_bytes());
            for item in items {
                encode_value(item, out)?;
            }
        }
        FieldValue::Map(entries) => {
            if entries.len() > MAX_CONTAINER_LEN {
                return Err(ProtocolError::LimitExceeded("map"));
            }
            out.push(TAG_MAP);
            out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
            for (key, value) in entries {
                match key {
                    MapKey::Int(i) => {
                        out.push(KEY_INT);
                        out.extend_from_slice(&i.to_be_bytes());
                    }
                    MapKey::Str(s) => {
                        out.push(KEY_STR);
                        write_str_u16(out, s, MAX_STR_LEN, "map key")?;
                    }
                }
                encode_value(value, out)?;
            }
        }
        FieldValue::Msg(record) => {
            out.push(TAG_MSG);
            encode_record(record, out)?;
        }
    }
    Ok(())
}

pub(crate) fn read_record(r: &mut Reader<'_>, depth: usize) -> Result<Record, ProtocolError> {
    if depth > MAX_RECORD_DEPTH {
        return Err(ProtocolError::TooDeep);
    }
    let count = r.read_u16_be()? as usize;
    let mut record = Record::new();
    for _ in 0..count {
        let name = r.read_str_u8(MAX_FIELD_NAME_LEN, "field name")?;
        let value = read_value(r, depth + 1)?;
        record.insert(name, value);
    }
    Ok(record)
}

fn read_value(r: &mut Reader<'_>, depth: usize) -> Result<FieldValue, ProtocolError> {
    if depth > MAX_RECORD_DEPTH {
        return Err(ProtocolError::TooDeep);
    }
    let tag = r.read_u8()?;
    match tag {
        TAG_NULL => Ok(FieldValue::Null),
        TAG_BOOL => match r.read_u8()? {
            0 => Ok(FieldValue::Bool(false)),
            1 => Ok(FieldValue::Bool(true)),
            _ => Err(ProtocolError::InvalidField("bool")),
        },
        TAG_INT => Ok(FieldValue::Int(r.read_i64_be()?)),
        TAG_FLOAT => Ok(FieldValue::Float(r.read_f64_be()?)),
        TAG_STR => Ok(FieldValue::Str(r.read_str_u16(MAX_STR_LEN, "string")?)),
        TAG_BYTES => {
            let len = r.read_u32_be()? as usize;
            if len > MAX_BYTES_LEN {
                return Err(ProtocolError::LimitExceeded("bytes"));
            }
            Ok(FieldValue::Bytes(r.take(len)?.to_vec()))
        }
        TAG_LIST => {
            let count = r.read_u16_be()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_value(r, depth + 1)?);
            }
            Ok(FieldValue::List(items))
        }
        TAG_MAP => {
            let count = r.read_u16_be()? as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key = match r.read_u8()? {
                    KEY_INT => MapKey::Int(r.read_i64_be()?),
                    KEY_STR => MapKey::Str(r.read_str_u16(MAX_STR_LEN, "map key")?),
                    _ => return Err(ProtocolError::InvalidField("map key")),
                };
                entries.insert(key, read_value(r, depth + 1)?);
            }
            Ok(FieldValue::Map(entries))
        }
        TAG_MSG => Ok(FieldValue::Msg(read_record(r, depth + 1)?)),
        _ => Err(ProtocolError::InvalidField("value tag")),
    }
}
