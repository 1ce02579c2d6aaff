//! HTTP/1.1 chunked transfer coding, both directions.

use std::{
    io::{self, Write},
    thread,
    time::Duration,
};

const CRLF: &[u8] = b"\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Writes `payload` as a chunked body and returns the number of data chunks.
///
/// Each chunk is flushed and followed by `pause` so a small send buffer can
/// drain before the next one is queued.
pub(crate) fn write_chunked<W: Write>(
    writer: &mut W,
    payload: &[u8],
    chunk_size: usize,
    pause: Duration,
) -> io::Result<usize> {
    let mut chunks = 0usize;
    for chunk in payload.chunks(chunk_size.max(1)) {
        write!(writer, "{:x}\r\n", chunk.len())?;
        writer.write_all(chunk)?;
        writer.write_all(CRLF)?;
        writer.flush()?;
        chunks += 1;
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
    writer.write_all(LAST_CHUNK)?;
    writer.flush()?;
    Ok(chunks)
}

/// Decodes a complete chunked body. Chunk extensions and trailers are
/// ignored; returns `None` on any framing error.
pub(crate) fn decode_chunked(mut body: &[u8]) -> Option<Vec<u8>> {
    let mut decoded = Vec::with_capacity(body.len());
    loop {
        let line_end = find(body, CRLF)?;
        let size_line = std::str::from_utf8(&body[..line_end]).ok()?;
        let size_hex = size_line.split(';').next()?.trim();
        let size = usize::from_str_radix(size_hex, 16).ok()?;
        body = &body[line_end + CRLF.len()..];

        if size == 0 {
            return Some(decoded);
        }

        let data = body.get(..size)?;
        decoded.extend_from_slice(data);
        body = body.get(size..)?.strip_prefix(CRLF)?;
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
