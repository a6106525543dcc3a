//! Synchronous varint and string codec over in-memory byte slices.
//!
//! These helpers parse already-buffered input; the async counterparts in
//! [`crate::wire_format`] are used only where the transport is read
//! directly. The `try_*` family reports "not enough data" as `Ok(None)`
//! instead of an error, which lets skippers and the frame layer decide
//! whether more bytes must be pulled from the transport.

use crate::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

/// Maximum number of bytes in an unsigned LEB128 varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Read a varint-encoded u64 from a byte slice.
pub fn read_varint(buffer: &mut &[u8]) -> Result<u64> {
    match try_read_varint(buffer)? {
        Some(value) => Ok(value),
        None => Err(Error::MalformedWire(
            "unexpected end of buffer reading varint".to_string(),
        )),
    }
}

/// Read a varint-encoded u64, returning `Ok(None)` if the buffer ends
/// mid-varint. The cursor is only advanced on success.
pub fn try_read_varint(buffer: &mut &[u8]) -> Result<Option<u64>> {
    let bytes: &[u8] = *buffer;
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::MalformedWire(
                "varint exceeds 10 bytes".to_string(),
            ));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            *buffer = &bytes[i + 1..];
            return Ok(Some(result));
        }

        shift += 7;
    }

    if bytes.len() >= MAX_VARINT_LEN {
        return Err(Error::MalformedWire(
            "varint exceeds 10 bytes".to_string(),
        ));
    }

    Ok(None)
}

/// Write a varint-encoded u64 to a byte buffer.
pub fn write_varint(buffer: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buffer.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `write_varint` emits for `value`.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Read a length-prefixed string from a byte slice.
pub fn read_string(buffer: &mut &[u8]) -> Result<String> {
    let len = read_varint(buffer)? as usize;
    ensure(buffer, len, "string body")?;

    let s = std::str::from_utf8(&buffer[..len])?.to_string();
    buffer.advance(len);
    Ok(s)
}

/// Skip a length-prefixed string without materialising it. Returns
/// `Ok(None)` if the buffer is too short.
pub fn try_skip_string(buffer: &mut &[u8]) -> Result<Option<()>> {
    let mut probe = *buffer;
    let len = match try_read_varint(&mut probe)? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    if probe.len() < len {
        return Ok(None);
    }
    probe.advance(len);
    *buffer = probe;
    Ok(Some(()))
}

/// Write a length-prefixed string to a byte buffer.
pub fn write_string(buffer: &mut BytesMut, s: &str) {
    write_varint(buffer, s.len() as u64);
    buffer.put_slice(s.as_bytes());
}

/// Fail with [`Error::MalformedWire`] unless `buffer` holds at least
/// `needed` bytes.
pub fn ensure(buffer: &[u8], needed: usize, what: &str) -> Result<()> {
    if buffer.len() < needed {
        return Err(Error::MalformedWire(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            needed,
            buffer.len()
        )));
    }
    Ok(())
}

/// Advance the cursor by `n` bytes, or return `Ok(None)` if fewer remain.
pub fn try_advance(buffer: &mut &[u8], n: usize) -> Result<Option<()>> {
    if buffer.len() < n {
        return Ok(None);
    }
    buffer.advance(n);
    Ok(Some(()))
}
