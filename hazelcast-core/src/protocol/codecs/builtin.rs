//! Encoding helpers for fixed-size fields and variable-size frames.

use bytes::BufMut;
use uuid::Uuid;

use crate::error::{HazelcastError, Result};
use crate::protocol::{ClientMessage, Frame, FrameIterator};

/// Size of a boolean field.
pub const BOOLEAN_SIZE: usize = 1;
/// Size of a byte field.
pub const BYTE_SIZE: usize = 1;
/// Size of an int field.
pub const INT_SIZE: usize = 4;
/// Size of a long field.
pub const LONG_SIZE: usize = 8;
/// Size of a nullable UUID field (null flag + two longs).
pub const UUID_SIZE: usize = BOOLEAN_SIZE + 2 * LONG_SIZE;

fn field<const N: usize>(content: &[u8], offset: usize, name: &str) -> Result<[u8; N]> {
    content
        .get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            HazelcastError::Protocol(format!(
                "frame too short for {name} at offset {offset} ({} bytes)",
                content.len()
            ))
        })
}

/// Reads a byte at `offset`.
pub fn decode_u8(content: &[u8], offset: usize) -> Result<u8> {
    field::<1>(content, offset, "byte").map(|b| b[0])
}

/// Reads a boolean at `offset`.
pub fn decode_bool(content: &[u8], offset: usize) -> Result<bool> {
    decode_u8(content, offset).map(|b| b != 0)
}

/// Reads a little-endian int at `offset`.
pub fn decode_i32(content: &[u8], offset: usize) -> Result<i32> {
    field(content, offset, "int").map(i32::from_le_bytes)
}

/// Reads a little-endian long at `offset`.
pub fn decode_i64(content: &[u8], offset: usize) -> Result<i64> {
    field(content, offset, "long").map(i64::from_le_bytes)
}

/// Appends a nullable UUID as null flag, most and least significant bits.
pub fn encode_uuid(dst: &mut impl BufMut, uuid: Option<Uuid>) {
    match uuid {
        Some(uuid) => {
            let (msb, lsb) = uuid.as_u64_pair();
            dst.put_u8(0);
            dst.put_i64_le(msb as i64);
            dst.put_i64_le(lsb as i64);
        }
        None => {
            dst.put_u8(1);
            dst.put_i64_le(0);
            dst.put_i64_le(0);
        }
    }
}

/// Reads a nullable UUID at `offset`.
pub fn decode_uuid(content: &[u8], offset: usize) -> Result<Option<Uuid>> {
    if decode_bool(content, offset)? {
        return Ok(None);
    }
    let msb = decode_i64(content, offset + BOOLEAN_SIZE)? as u64;
    let lsb = decode_i64(content, offset + BOOLEAN_SIZE + LONG_SIZE)? as u64;
    Ok(Some(Uuid::from_u64_pair(msb, lsb)))
}

/// Appends a UTF-8 string frame.
pub fn encode_string(message: &mut ClientMessage, value: &str) {
    message.add_frame(Frame::from_slice(value.as_bytes()));
}

/// Appends a string frame, or a null frame for `None`.
pub fn encode_nullable_string(message: &mut ClientMessage, value: Option<&str>) {
    match value {
        Some(value) => encode_string(message, value),
        None => message.add_frame(Frame::null_frame()),
    }
}

/// Appends a byte array frame.
pub fn encode_bytes(message: &mut ClientMessage, value: &[u8]) {
    message.add_frame(Frame::from_slice(value));
}

/// Appends a list of strings wrapped in data structure frames.
pub fn encode_string_list(message: &mut ClientMessage, values: &[String]) {
    message.add_frame(Frame::begin_frame());
    for value in values {
        encode_string(message, value);
    }
    message.add_frame(Frame::end_frame());
}

fn next_frame<'a>(iter: &mut FrameIterator<'a>, what: &str) -> Result<&'a Frame> {
    iter.next()
        .ok_or_else(|| HazelcastError::Protocol(format!("missing frame for {what}")))
}

/// Reads a UTF-8 string frame.
pub fn decode_string(iter: &mut FrameIterator<'_>) -> Result<String> {
    let frame = next_frame(iter, "string")?;
    String::from_utf8(frame.content.to_vec())
        .map_err(|e| HazelcastError::Protocol(format!("invalid UTF-8 string: {e}")))
}

/// Reads a string frame that may be null.
pub fn decode_nullable_string(iter: &mut FrameIterator<'_>) -> Result<Option<String>> {
    if next_is_null(iter) {
        return Ok(None);
    }
    decode_string(iter).map(Some)
}

/// Reads a byte array frame.
pub fn decode_bytes(iter: &mut FrameIterator<'_>) -> Result<Vec<u8>> {
    next_frame(iter, "byte array").map(|f| f.content.to_vec())
}

/// Reads a list of strings wrapped in data structure frames.
pub fn decode_string_list(iter: &mut FrameIterator<'_>) -> Result<Vec<String>> {
    let begin = next_frame(iter, "list begin")?;
    if !begin.is_begin_data_structure() {
        return Err(HazelcastError::Protocol("expected list begin frame".into()));
    }
    let mut values = Vec::new();
    while let Some(frame) = iter.peek() {
        if frame.is_end_data_structure() {
            iter.next();
            return Ok(values);
        }
        values.push(decode_string(iter)?);
    }
    Err(HazelcastError::Protocol("unterminated list".into()))
}

/// Consumes the next frame if it is a null frame.
pub fn next_is_null(iter: &mut FrameIterator<'_>) -> bool {
    match iter.peek() {
        Some(frame) if frame.is_null_frame() => {
            iter.next();
            true
        }
        _ => false,
    }
}

/// Returns the content of the initial frame or a protocol error.
pub fn initial_content<'a>(iter: &mut FrameIterator<'a>) -> Result<&'a [u8]> {
    next_frame(iter, "initial frame").map(|f| &f.content[..])
}
