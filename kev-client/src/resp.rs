//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode inline commands and decode the reply subset emitted by
//! `GET` and by pattern-subscription pushes.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Subset Only**: Simple strings, integers, errors, bulk strings and one
//!    level of multi-bulk. No RESP3, no nested arrays.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//!
//! ## Wire Shapes
//!
//! ```text
//! out:  GET foo\r\n
//! in:   +OK\r\n  :42\r\n  -ERR msg\r\n  $5\r\nhello\r\n  $-1\r\n
//!       *3\r\n$3\r\nfoo\r\n$3\r\nbar\r\n:7\r\n
//! ```

use std::io::{BufRead, Read};

use bytes::{BufMut, BytesMut};
use kev_common::validate_inline_arg;

use crate::error::{ClientError, ClientResult, ProtocolError};

/// Largest bulk string accepted, matching the store's default
/// `proto-max-bulk-len`.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest reply line accepted, CRLF excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// One decoded reply object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespReply {
    /// +OK style replies.
    Simple(String),
    /// :123 replies, kept in textual form.
    Integer(String),
    /// $... bulk strings, with None for the null bulk.
    Bulk(Option<String>),
}

impl RespReply {
    /// Collapses the reply to text. The null bulk becomes the empty string.
    pub fn into_text(self) -> String {
        match self {
            RespReply::Simple(text) | RespReply::Integer(text) => text,
            RespReply::Bulk(data) => data.unwrap_or_default(),
        }
    }

    /// Text of the reply, or None for the null bulk.
    pub fn into_option(self) -> Option<String> {
        match self {
            RespReply::Simple(text) | RespReply::Integer(text) => Some(text),
            RespReply::Bulk(data) => data,
        }
    }
}

/// Encodes `<verb>[ <arg>]*\r\n` into the provided buffer.
///
/// Every token is validated first so a rejected argument leaves `out`
/// untouched.
pub fn encode_inline(verb: &str, args: &[&str], out: &mut BytesMut) -> ClientResult<()> {
    validate_inline_arg(verb)?;
    for arg in args {
        validate_inline_arg(arg)?;
    }

    out.reserve(verb.len() + args.iter().map(|arg| arg.len() + 1).sum::<usize>() + 2);
    out.put_slice(verb.as_bytes());
    for arg in args {
        out.put_u8(b' ');
        out.put_slice(arg.as_bytes());
    }
    out.put_slice(b"\r\n");
    Ok(())
}

/// Reads one reply object from the buffered reader.
///
/// An error reply is returned as `ClientError::Remote`, never as data.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespReply> {
    read_line(reader, line_buf)?;
    let Some(&prefix) = line_buf.first() else {
        return Err(ProtocolError::EmptyLine.into());
    };

    match prefix {
        b'+' => Ok(RespReply::Simple(text(&line_buf[1..]))),
        b':' => Ok(RespReply::Integer(text(&line_buf[1..]))),
        b'-' => Err(ClientError::Remote {
            message: text(&line_buf[1..]),
        }),
        b'$' => {
            let len = parse_i64(&line_buf[1..]).ok_or(ProtocolError::InvalidLength)?;
            read_bulk(reader, len)
        }
        other => Err(ProtocolError::UnknownType(other).into()),
    }
}

/// Reads one reply object and collapses it to text.
pub fn read_string<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<String> {
    read_reply(reader, line_buf).map(RespReply::into_text)
}

/// Reads a `*N` header followed by exactly `N` reply objects.
pub fn read_multi_bulk<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> ClientResult<Vec<String>> {
    read_line(reader, line_buf)?;
    match line_buf.first() {
        Some(b'*') => {}
        Some(b'-') => {
            return Err(ClientError::Remote {
                message: text(&line_buf[1..]),
            })
        }
        _ => return Err(ProtocolError::InvalidHeader.into()),
    }

    let count = parse_i64(&line_buf[1..])
        .filter(|count| *count >= 0)
        .ok_or(ProtocolError::InvalidHeader)? as usize;

    // The count comes off the wire; cap the pre-allocation.
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        items.push(read_string(reader, line_buf)?);
    }
    Ok(items)
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<RespReply> {
    if len == -1 {
        return Ok(RespReply::Bulk(None));
    }
    if len < 0 || len as u64 > MAX_BULK_LEN as u64 {
        return Err(ProtocolError::InvalidLength.into());
    }

    // Grow with the bytes that actually arrive instead of trusting the header.
    let len = len as usize;
    let mut data = Vec::with_capacity(len.min(8 * 1024));
    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut data)
        .map_err(ClientError::from_read)?;
    if data.len() != len {
        return Err(ProtocolError::UnexpectedEof.into());
    }

    // Fixed-width terminator, discarded without inspection.
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).map_err(ClientError::from_read)?;

    Ok(RespReply::Bulk(Some(text(&data))))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let limit = MAX_LINE_LEN + 2;
    let bytes = reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', buf)
        .map_err(ClientError::from_read)?;
    if buf.last() != Some(&b'\n') {
        if bytes >= limit {
            return Err(ProtocolError::LineTooLong(MAX_LINE_LEN).into());
        }
        return Err(ProtocolError::UnexpectedEof.into());
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(())
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

fn parse_i64(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}
