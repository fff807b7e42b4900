//! Legacy socket framing.
//!
//! A message is `"Length: " + N + "\n\n" + json + "\n"`. Inbound frames are
//! decoded from a growing buffer fed by chunked reads:
//!
//! 1. skip whitespace left over from the previous frame;
//! 2. wait for the `\n\n` header terminator and parse `N`;
//! 3. wait until at least `N` body bytes are buffered;
//! 4. take the first balanced `{...}` object from the body, skipping any log
//!    text some peers print ahead of it, waiting for more bytes if the object
//!    is still open.
//!
//! The frame consumes the declared `N` bytes, or up to the end of the object
//! if that lies further on. Peers disagree on whether `N` counts bytes or
//! characters, so a short `N` never truncates the object, and text after the
//! object inside the declared length is discarded with the frame.

// ============================================================================
// Imports
// ============================================================================

use std::ops::Range;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Header prefix.
pub const HEADER_PREFIX: &[u8] = b"Length: ";

/// Header terminator.
pub const HEADER_TERMINATOR: &[u8] = b"\n\n";

/// Longest header accepted before declaring the stream malformed.
const MAX_HEADER_LEN: usize = 64;

// ============================================================================
// Encoding
// ============================================================================

/// Frames one JSON body.
#[must_use]
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = format!("Length: {}\n\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len() + 1);
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);
    frame.push(b'\n');
    frame
}

// ============================================================================
// JSON Object Extraction
// ============================================================================

/// Finds the first balanced top-level `{...}` object in `bytes`.
///
/// String literals (and escapes inside them) are honoured so braces in
/// strings do not unbalance the scan. Returns `None` if no object is
/// complete yet.
#[must_use]
pub fn extract_json_object(bytes: &[u8]) -> Option<Range<usize>> {
    let start = bytes.iter().position(|&b| b == b'{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

// ============================================================================
// FrameDecoder
// ============================================================================

/// Incremental decoder over a byte buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    #[inline]
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the number of buffered bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if a frame has started but not completed.
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        self.buf.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Decodes the next complete frame body, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if the header is malformed.
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>> {
        let lead = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.drain(..lead);

        let seen = self.buf.len().min(HEADER_PREFIX.len());
        if self.buf[..seen] != HEADER_PREFIX[..seen] {
            return Err(Error::protocol_violation(format!(
                "expected `Length:` header, got {:?}",
                String::from_utf8_lossy(&self.buf[..self.buf.len().min(MAX_HEADER_LEN)])
            )));
        }

        let Some(term) = find(&self.buf, HEADER_TERMINATOR) else {
            if self.buf.len() > MAX_HEADER_LEN {
                return Err(Error::protocol_violation("unterminated `Length:` header"));
            }
            return Ok(None);
        };

        let declared = parse_length(&self.buf[HEADER_PREFIX.len()..term])?;
        let body_start = term + HEADER_TERMINATOR.len();
        let body = &self.buf[body_start..];

        if body.len() < declared {
            return Ok(None);
        }

        let Some(object) = extract_json_object(body) else {
            return Ok(None);
        };

        let frame = body[object.clone()].to_vec();
        self.buf.drain(..body_start + declared.max(object.end));
        Ok(Some(frame))
    }
}

fn parse_length(raw: &[u8]) -> Result<usize> {
    std::str::from_utf8(raw)
        .ok()
        .map(str::trim)
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            Error::protocol_violation(format!(
                "malformed `Length:` value {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ============================================================================
// Tests
// ============================================================================
