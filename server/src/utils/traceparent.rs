//! W3C `traceparent` header codec
//!
//! Fixed-width layout, 55 ASCII characters:
//!
//! ```text
//! 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! ^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^ ^^
//! |  trace-id (32 hex)                parent-id (16)   flags
//! version
//! ```
//!
//! Parsing works on UTF-8 bytes, UTF-16 code units, or `&str` through one
//! generic validator. Malformed input yields `None`, never a panic.

use std::fmt;

/// Total length of a version-00 traceparent
pub const TRACEPARENT_LEN: usize = 55;

const TRACE_ID_OFFSET: usize = 3;
const PARENT_ID_OFFSET: usize = 36;
const FLAGS_OFFSET: usize = 53;
const DELIMITERS: [usize; 3] = [2, 35, 52];

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";

/// A code unit that may carry an ASCII character
pub trait AsciiUnit: Copy {
    fn as_ascii_byte(self) -> Option<u8>;
}

impl AsciiUnit for u8 {
    #[inline]
    fn as_ascii_byte(self) -> Option<u8> {
        self.is_ascii().then_some(self)
    }
}

impl AsciiUnit for u16 {
    #[inline]
    fn as_ascii_byte(self) -> Option<u8> {
        u8::try_from(self).ok().filter(u8::is_ascii)
    }
}

/// Parsed trace context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceContext {
    pub trace_id: [u8; 16],
    pub parent_id: [u8; 8],
    pub flags: u8,
}

impl TraceContext {
    /// Parse from a string
    pub fn parse(value: &str) -> Option<Self> {
        Self::parse_units(value.as_bytes())
    }

    /// Parse from raw UTF-8 bytes (e.g. an HTTP header value)
    pub fn parse_utf8(value: &[u8]) -> Option<Self> {
        Self::parse_units(value)
    }

    /// Parse from UTF-16 code units
    pub fn parse_utf16(value: &[u16]) -> Option<Self> {
        Self::parse_units(value)
    }

    /// Shared validation for every input encoding.
    ///
    /// Only the first 55 units are inspected; trailing data is ignored so
    /// future header versions with appended fields still parse.
    fn parse_units<U: AsciiUnit>(units: &[U]) -> Option<Self> {
        if units.len() < TRACEPARENT_LEN {
            return None;
        }
        let units = &units[..TRACEPARENT_LEN];

        if units[0].as_ascii_byte()? != b'0' || units[1].as_ascii_byte()? != b'0' {
            return None;
        }
        for &i in &DELIMITERS {
            if units[i].as_ascii_byte()? != b'-' {
                return None;
            }
        }

        let mut trace_id = [0u8; 16];
        decode_hex(&units[TRACE_ID_OFFSET..TRACE_ID_OFFSET + 32], &mut trace_id)?;
        let mut parent_id = [0u8; 8];
        decode_hex(&units[PARENT_ID_OFFSET..PARENT_ID_OFFSET + 16], &mut parent_id)?;
        let mut flags = [0u8; 1];
        decode_hex(&units[FLAGS_OFFSET..FLAGS_OFFSET + 2], &mut flags)?;

        Some(Self {
            trace_id,
            parent_id,
            flags: flags[0],
        })
    }

    /// Write the 55-byte header into `dest`.
    ///
    /// Returns false, leaving `dest` untouched, if it is shorter than 55 bytes.
    pub fn format_into(&self, dest: &mut [u8]) -> bool {
        if dest.len() < TRACEPARENT_LEN {
            return false;
        }
        dest[0] = b'0';
        dest[1] = b'0';
        for &i in &DELIMITERS {
            dest[i] = b'-';
        }
        encode_hex(&self.trace_id, &mut dest[TRACE_ID_OFFSET..TRACE_ID_OFFSET + 32]);
        encode_hex(&self.parent_id, &mut dest[PARENT_ID_OFFSET..PARENT_ID_OFFSET + 16]);
        encode_hex(&[self.flags], &mut dest[FLAGS_OFFSET..FLAGS_OFFSET + 2]);
        true
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn parent_id_hex(&self) -> String {
        hex::encode(self.parent_id)
    }

    /// W3C `sampled` flag (bit 0)
    pub fn is_sampled(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; TRACEPARENT_LEN];
        self.format_into(&mut buf);
        f.write_str(std::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

/// Lowercase hex digit value; version-00 ids and flags are lowercase only
#[inline]
fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn decode_hex<U: AsciiUnit>(src: &[U], out: &mut [u8]) -> Option<()> {
    debug_assert_eq!(src.len(), out.len() * 2);
    for (byte, pair) in out.iter_mut().zip(src.chunks_exact(2)) {
        let hi = hex_value(pair[0].as_ascii_byte()?)?;
        let lo = hex_value(pair[1].as_ascii_byte()?)?;
        *byte = (hi << 4) | lo;
    }
    Some(())
}

fn encode_hex(src: &[u8], out: &mut [u8]) {
    for (byte, pair) in src.iter().zip(out.chunks_exact_mut(2)) {
        pair[0] = HEX_LOWER[(byte >> 4) as usize];
        pair[1] = HEX_LOWER[(byte & 0x0f) as usize];
    }
}
