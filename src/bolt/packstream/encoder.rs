//! PackStream encoder.

use bytes::{BufMut, BytesMut};

use super::marker::{self, Family};
use super::value::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Append the encoding of `value` to `dst`.
pub fn pack(value: &PackStreamValue, dst: &mut BytesMut) -> Result<(), PackStreamError> {
    match value {
        PackStreamValue::Null => dst.put_u8(marker::NULL),
        PackStreamValue::Boolean(b) => dst.put_u8(if *b { marker::TRUE } else { marker::FALSE }),
        PackStreamValue::Integer(i) => pack_int(*i, dst),
        PackStreamValue::Float(f) => {
            dst.put_u8(marker::FLOAT_64);
            dst.put_f64(*f);
        }
        PackStreamValue::Bytes(b) => {
            put_header(Family::Bytes, b.len(), dst)?;
            dst.put_slice(b);
        }
        PackStreamValue::String(s) => pack_str(s, dst)?,
        PackStreamValue::List(items) => {
            put_header(Family::List, items.len(), dst)?;
            for item in items {
                pack(item, dst)?;
            }
        }
        PackStreamValue::Map(map) => {
            put_header(Family::Map, map.len(), dst)?;
            for (key, item) in map {
                pack_str(key, dst)?;
                pack(item, dst)?;
            }
        }
        PackStreamValue::Structure(s) => pack_structure(s, dst)?,
    }
    Ok(())
}

/// Append a structure (signature byte plus fields).
pub fn pack_structure(s: &PackStreamStructure, dst: &mut BytesMut) -> Result<(), PackStreamError> {
    put_header(Family::Struct, s.fields.len(), dst)?;
    dst.put_u8(s.tag);
    for field in &s.fields {
        pack(field, dst)?;
    }
    Ok(())
}

/// Encode into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut dst = BytesMut::with_capacity(128);
    pack(value, &mut dst)?;
    Ok(dst)
}

fn pack_int(value: i64, dst: &mut BytesMut) {
    if (marker::TINY_INT_MIN..=marker::TINY_INT_MAX).contains(&value) {
        dst.put_i8(value as i8);
    } else if let Ok(v) = i8::try_from(value) {
        dst.put_u8(marker::INT_8);
        dst.put_i8(v);
    } else if let Ok(v) = i16::try_from(value) {
        dst.put_u8(marker::INT_16);
        dst.put_i16(v);
    } else if let Ok(v) = i32::try_from(value) {
        dst.put_u8(marker::INT_32);
        dst.put_i32(v);
    } else {
        dst.put_u8(marker::INT_64);
        dst.put_i64(value);
    }
}

fn pack_str(value: &str, dst: &mut BytesMut) -> Result<(), PackStreamError> {
    put_header(Family::String, value.len(), dst)?;
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Write the smallest header that can carry `size` for the family.
fn put_header(family: Family, size: usize, dst: &mut BytesMut) -> Result<(), PackStreamError> {
    if let Some(base) = family.tiny_base() {
        if size <= marker::TINY_SIZE_MAX {
            dst.put_u8(base | size as u8);
            return Ok(());
        }
    }

    let [m8, m16, m32] = family.sized_markers();
    match (m8, m16, m32) {
        (Some(m), _, _) if size <= u8::MAX as usize => {
            dst.put_u8(m);
            dst.put_u8(size as u8);
        }
        (_, Some(m), _) if size <= u16::MAX as usize => {
            dst.put_u8(m);
            dst.put_u16(size as u16);
        }
        (_, _, Some(m)) if size <= u32::MAX as usize => {
            dst.put_u8(m);
            dst.put_u32(size as u32);
        }
        _ => return Err(PackStreamError::ValueTooLarge(family.name(), size)),
    }
    Ok(())
}
