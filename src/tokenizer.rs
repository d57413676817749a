//! Byte-level host-file tokenizer.
//!
//! Streams raw filter-list bytes into normalized `(wildcard, host)` records.
//! Handles both plain-host lists (one token per line) and classic hosts-file
//! lines (`ip host [ignored...]`), skips `#` comment lines, and rejects
//! oversized hosts and control bytes without buffering whole lines.

use std::io::{BufRead, BufReader, Read};

use crate::{Error, Result};

/// Maximum hostname length in bytes (RFC 1035 limit on a full domain name).
pub const MAX_HOST_LEN: usize = 253;

/// One logical filter-list entry.
///
/// `host` borrows the tokenizer's reusable output buffer and is only valid
/// until the next `next_entry` call. The `*` wildcard flag is raw: shape
/// validation (`*.host` only) is the caller's job.
#[derive(Debug, Clone, Copy)]
pub struct RawHostEntry<'a> {
    pub wildcard: bool,
    pub host: &'a [u8],
}

impl RawHostEntry<'_> {
    /// The host as a string, replacing any non-UTF-8 bytes.
    pub fn host_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.host)
    }
}

/// Streaming tokenizer over raw filter-list bytes.
pub struct HostTokenizer<R: Read> {
    input: BufReader<R>,
    /// Reused per call; a record never outgrows it.
    buf: Vec<u8>,
}

impl<R: Read> HostTokenizer<R> {
    /// Create a tokenizer with the standard 253-byte host buffer.
    pub fn new(input: R) -> Self {
        Self::with_buffer_capacity(input, MAX_HOST_LEN)
    }

    /// Create a tokenizer with a custom output buffer size.
    ///
    /// Mainly useful in tests; a record that would overrun the buffer is a
    /// fatal error, never a silent truncation.
    pub fn with_buffer_capacity(input: R, capacity: usize) -> Self {
        Self {
            input: BufReader::new(input),
            buf: vec![0u8; capacity],
        }
    }

    /// Produce the next entry, or `None` at end of stream.
    ///
    /// Comment lines and blank lines are consumed silently. On lines with two
    /// or more whitespace-separated tokens the first token is the IP column
    /// and the second is the host; any further tokens are discarded.
    pub fn next_entry(&mut self) -> Result<Option<RawHostEntry<'_>>> {
        let mut first = self.skip_whitespace()?;
        while first == Some(b'#') {
            self.skip_line()?;
            first = self.skip_whitespace()?;
        }

        let first = match first {
            Some(b) => b,
            None => return Ok(None),
        };

        let mut wildcard = first == b'*';
        let mut second_token = false;
        let mut pos = 0usize;
        self.push(&mut pos, first)?;

        loop {
            match self.next_byte()? {
                None | Some(b'\n') | Some(b'\r') => break,
                Some(b' ') | Some(b'\t') => {
                    if second_token {
                        // host complete, rest of the line is ignored
                        self.skip_line()?;
                        break;
                    }
                    match self.skip_inline_whitespace()? {
                        None | Some(b'\n') | Some(b'\r') => break, // single-token line
                        Some(next) => {
                            // ip <ws> host: the first token was the IP column
                            pos = 0;
                            wildcard = next == b'*';
                            second_token = true;
                            self.push(&mut pos, next)?;
                        }
                    }
                }
                Some(b) => {
                    if b == b'*' {
                        wildcard = true;
                    }
                    self.push(&mut pos, b)?;
                }
            }
        }

        Ok(Some(RawHostEntry {
            wildcard,
            host: &self.buf[..pos],
        }))
    }

    fn push(&mut self, pos: &mut usize, byte: u8) -> Result<()> {
        if byte < 0x20 {
            return Err(Error::ControlByte(byte));
        }
        if *pos >= MAX_HOST_LEN {
            return Err(Error::HostTooLong);
        }
        if *pos >= self.buf.len() {
            return Err(Error::BufferOverflow);
        }
        self.buf[*pos] = byte;
        *pos += 1;
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let available = self.input.fill_buf()?;
        match available.first().copied() {
            Some(b) => {
                self.input.consume(1);
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    /// Skip spaces, tabs and line terminators; return the first other byte.
    fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            match self.next_byte()? {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => continue,
                other => return Ok(other),
            }
        }
    }

    /// Skip spaces and tabs only; return the first other byte.
    fn skip_inline_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            match self.next_byte()? {
                Some(b' ') | Some(b'\t') => continue,
                other => return Ok(other),
            }
        }
    }

    /// Consume input up to and including the next line feed.
    fn skip_line(&mut self) -> Result<()> {
        loop {
            match self.next_byte()? {
                None | Some(b'\n') => return Ok(()),
                Some(_) => continue,
            }
        }
    }
}

/// Whether a raw wildcard entry has the only supported `*.<host>` shape.
///
/// Returns the stripped host on success. Any other `*` placement is
/// unsupported and should be counted as skipped by the caller.
pub fn strip_supported_wildcard(host: &[u8]) -> Option<&[u8]> {
    if host.starts_with(b"*.") && host.len() > 2 && !host[1..].contains(&b'*') {
        Some(&host[2..])
    } else {
        None
    }
}
