//! PackStream decoder.
//!
//! Input comes straight off the wire, so every size header is checked
//! against the bytes actually left before anything is allocated, and
//! nesting is capped at [`MAX_DEPTH`].

use std::collections::HashMap;

use bytes::Buf;

use super::marker::{self, Family, SizeHeader};
use super::value::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Maximum nesting of lists, maps and structures.
pub const MAX_DEPTH: usize = 64;

/// Decoder over a borrowed byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        self.value(0)
    }

    fn value(&mut self, depth: usize) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.take_u8()?;

        if let Some(header) = marker::size_header(marker) {
            let (family, size) = match header {
                SizeHeader::Tiny(family, size) => (family, size),
                SizeHeader::Explicit(family, width) => (family, self.take_size(width)?),
            };
            return self.sized(family, size, depth);
        }

        if marker::is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        let value = match marker {
            marker::NULL => PackStreamValue::Null,
            marker::TRUE => PackStreamValue::Boolean(true),
            marker::FALSE => PackStreamValue::Boolean(false),
            marker::FLOAT_64 => {
                self.need(8)?;
                PackStreamValue::Float(self.data.get_f64())
            }
            marker::INT_8 => {
                self.need(1)?;
                PackStreamValue::Integer(self.data.get_i8() as i64)
            }
            marker::INT_16 => {
                self.need(2)?;
                PackStreamValue::Integer(self.data.get_i16() as i64)
            }
            marker::INT_32 => {
                self.need(4)?;
                PackStreamValue::Integer(self.data.get_i32() as i64)
            }
            marker::INT_64 => {
                self.need(8)?;
                PackStreamValue::Integer(self.data.get_i64())
            }
            other => return Err(PackStreamError::UnknownMarker(other)),
        };
        Ok(value)
    }

    fn sized(
        &mut self,
        family: Family,
        size: usize,
        depth: usize,
    ) -> Result<PackStreamValue, PackStreamError> {
        match family {
            Family::Bytes => Ok(PackStreamValue::Bytes(self.take_slice(size)?.to_vec())),
            Family::String => Ok(PackStreamValue::String(self.take_string(size)?)),
            Family::List => {
                let depth = self.descend(depth, size)?;
                let mut items = Vec::with_capacity(size);
                for _ in 0..size {
                    items.push(self.value(depth)?);
                }
                Ok(PackStreamValue::List(items))
            }
            Family::Map => {
                // Every entry needs at least a key marker and a value marker.
                let depth = self.descend(depth, size.saturating_mul(2))?;
                let mut map = HashMap::with_capacity(size);
                for _ in 0..size {
                    let key = match self.value(depth)? {
                        PackStreamValue::String(s) => s,
                        _ => return Err(PackStreamError::InvalidMapKey),
                    };
                    let item = self.value(depth)?;
                    map.insert(key, item);
                }
                Ok(PackStreamValue::Map(map))
            }
            Family::Struct => {
                let depth = self.descend(depth, size)?;
                let tag = self.take_u8()?;
                let mut fields = Vec::with_capacity(size);
                for _ in 0..size {
                    fields.push(self.value(depth)?);
                }
                Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
            }
        }
    }

    /// Enter a container whose elements need at least `min_bytes` more input.
    fn descend(&self, depth: usize, min_bytes: usize) -> Result<usize, PackStreamError> {
        if depth >= MAX_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_DEPTH));
        }
        self.need(min_bytes)?;
        Ok(depth + 1)
    }

    fn need(&self, n: usize) -> Result<(), PackStreamError> {
        if self.data.remaining() < n {
            return Err(PackStreamError::UnexpectedEof);
        }
        Ok(())
    }

    fn take_u8(&mut self) -> Result<u8, PackStreamError> {
        self.need(1)?;
        Ok(self.data.get_u8())
    }

    fn take_size(&mut self, width: usize) -> Result<usize, PackStreamError> {
        self.need(width)?;
        Ok(self.data.get_uint(width) as usize)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        self.need(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn take_string(&mut self, len: usize) -> Result<String, PackStreamError> {
        let bytes = self.take_slice(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))
    }
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if decoder.remaining() != 0 {
        return Err(PackStreamError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::encode;

    #[test]
    fn test_scalars() {
        assert_eq!(decode(&[0xC0]).unwrap(), PackStreamValue::Null);
        assert_eq!(decode(&[0xC3]).unwrap(), PackStreamValue::Boolean(true));
        assert_eq!(decode(&[0xFF]).unwrap(), PackStreamValue::Integer(-1));
        assert_eq!(decode(&[0xC9, 0x03, 0xE8]).unwrap(), PackStreamValue::Integer(1000));
    }

    #[test]
    fn test_run_message_shape() {
        // RUN "RETURN 1" {} {}
        let mut data = vec![0xB3, 0x10, 0x88];
        data.extend_from_slice(b"RETURN 1");
        data.extend_from_slice(&[0xA0, 0xA0]);

        let s = decode(&data).unwrap().into_structure().unwrap();
        assert_eq!(s.tag, 0x10);
        assert_eq!(s.fields[0].as_str(), Some("RETURN 1"));
        assert!(s.fields[1].as_map().unwrap().is_empty());
    }

    #[test]
    fn test_nested_values_survive() {
        let mut inner = HashMap::new();
        inner.insert("k".to_string(), PackStreamValue::List(vec![1i64.into(), "two".into()]));
        let value = PackStreamValue::List(vec![PackStreamValue::Map(inner), PackStreamValue::Float(0.5)]);

        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[0xC9, 0x03]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x85, b'a']), Err(PackStreamError::UnexpectedEof)));
    }

    #[test]
    fn test_oversized_header_rejected_before_allocation() {
        // LIST_32 claiming four billion elements with nothing behind it.
        let data = [0xD6, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(decode(&data), Err(PackStreamError::UnexpectedEof)));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = vec![0x91; MAX_DEPTH + 1];
        data.push(0x00);
        assert!(matches!(decode(&data), Err(PackStreamError::NestingTooDeep(_))));

        let mut ok = vec![0x91; MAX_DEPTH];
        ok.push(0x00);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_non_string_map_key() {
        assert!(matches!(decode(&[0xA1, 0x01, 0x02]), Err(PackStreamError::InvalidMapKey)));
    }

    #[test]
    fn test_unknown_marker_and_trailing_bytes() {
        assert!(matches!(decode(&[0xC4]), Err(PackStreamError::UnknownMarker(0xC4))));
        assert!(matches!(decode(&[0x01, 0x02]), Err(PackStreamError::TrailingBytes(1))));
    }
}
