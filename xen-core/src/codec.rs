//! Wire framing: `@<decimal-size>:<payload bytes>`.
//!
//! Mirrors the split the teacher's own frame codec uses between a blocking
//! implementation (used over `std::io::{Read, Write}`, e.g. a spawned
//! subprocess's pipes) and an async one (used over `tokio::io::{AsyncRead,
//! AsyncWrite}`, e.g. a TCP socket) — the header format differs (ASCII
//! `@size:` here instead of a fixed 5-byte binary header) but the
//! read-header-then-read-exactly-n-bytes shape is the same.

use std::io::{self, Read, Write};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::XenError;

/// Write one frame: the ASCII header, then the payload, then flush.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let header = format!("@{}:", payload.len());
    writer.write_all(header.as_bytes())?;
    if !payload.is_empty() {
        writer.write_all(payload)?;
    }
    writer.flush()
}

/// Async counterpart of [`write_frame`].
pub async fn write_frame_async<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> io::Result<()> {
    let header = format!("@{}:", payload.len());
    writer.write_all(header.as_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await
}

/// Read one frame from a blocking reader by scanning the header byte by
/// byte, then reading exactly the announced payload length.
///
/// Returns `Ok(None)` on a clean EOF before any header byte is read.
pub fn read_frame(reader: &mut impl Read, max_frame_size: usize) -> io::Result<Option<Vec<u8>>> {
    let mut first = [0u8; 1];
    match reader.read(&mut first)? {
        0 => return Ok(None),
        _ => {}
    }
    if first[0] != b'@' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing begin marker",
        ));
    }

    let mut digits = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        match byte[0] {
            b':' => break,
            b'0'..=b'9' => digits.push(byte[0]),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unexpected byte in header",
                ))
            }
        }
    }
    if digits.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "header has no digits",
        ));
    }
    let size: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad frame size"))?;
    if size > max_frame_size {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "oversized frame"));
    }

    let mut payload = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut payload)?;
    }
    Ok(Some(payload))
}

/// Transcode `text` into `payload_bytes` for the given encoding label.
///
/// `"binary"` returns `text`'s UTF-8 bytes unchanged (binary-mode callers
/// are expected to use the raw payload path instead of this function).
/// `"utf-8"` is a straight `String::into_bytes`. `"iso8859-1"` maps each
/// `char` onto a single byte (code points 0..=255 only — ISO-8859-1 is the
/// identity mapping onto that range of Unicode scalar values).
pub fn encode_text(text: &str, encoding: &str) -> Result<Vec<u8>, XenError> {
    match encoding {
        "binary" | "utf-8" => Ok(text.as_bytes().to_vec()),
        "iso8859-1" => {
            let mut out = Vec::with_capacity(text.len());
            for ch in text.chars() {
                let code = ch as u32;
                if code > 0xFF {
                    return Err(XenError::Encoding(format!(
                        "character {ch:?} is not representable in iso8859-1"
                    )));
                }
                out.push(code as u8);
            }
            Ok(out)
        }
        other => Err(XenError::Encoding(format!("unknown encoding {other:?}"))),
    }
}

/// Inverse of [`encode_text`].
pub fn decode_text(payload: &[u8], encoding: &str) -> Result<String, XenError> {
    match encoding {
        "binary" => Ok(String::from_utf8_lossy(payload).into_owned()),
        "utf-8" => String::from_utf8(payload.to_vec())
            .map_err(|e| XenError::Encoding(format!("invalid utf-8: {e}"))),
        "iso8859-1" => Ok(payload.iter().map(|&b| b as char).collect()),
        other => Err(XenError::Encoding(format!("unknown encoding {other:?}"))),
    }
}

/// Read one frame from an async reader. Returns `Ok(None)` on clean EOF.
pub async fn read_frame_async<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> io::Result<Option<Vec<u8>>> {
    let mut first = [0u8; 1];
    let n = reader.read(&mut first).await?;
    if n == 0 {
        return Ok(None);
    }
    if first[0] != b'@' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing begin marker",
        ));
    }

    let mut digits = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await?;
        match byte[0] {
            b':' => break,
            b'0'..=b'9' => digits.push(byte[0]),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unexpected byte in header",
                ))
            }
        }
    }
    if digits.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "header has no digits",
        ));
    }
    let size: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad frame size"))?;
    if size > max_frame_size {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "oversized frame"));
    }

    let mut payload = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok(Some(payload))
}
