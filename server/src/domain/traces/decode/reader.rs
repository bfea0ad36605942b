//! Bounds-checked protobuf wire cursor
//!
//! A `WireReader` is a byte slice plus a position. Length-delimited fields
//! are handed out as sub-readers over the same buffer, so nested messages
//! are parsed without copying. Every read checks the remaining length and
//! reports the absolute offset of the failure.

use super::DecodeError;

/// Longest legal varint encoding (64-bit value)
const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

impl WireType {
    fn from_raw(raw: u8, offset: usize) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::Len),
            5 => Ok(Self::Fixed32),
            // 3/4 are deprecated groups, 6/7 are undefined
            other => Err(DecodeError::UnsupportedWireType {
                wire_type: other,
                offset,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Absolute offset of `buf[0]` in the original input
    base: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    #[inline]
    fn offset(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset();
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(DecodeError::Truncated { offset: start });
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                // Tenth byte may only carry the top bit of a u64
                if i == MAX_VARINT_LEN - 1 && byte > 1 {
                    return Err(DecodeError::MalformedVarint { offset: start });
                }
                return Ok(value);
            }
        }
        Err(DecodeError::MalformedVarint { offset: start })
    }

    /// Read a field tag, returning `(field_number, wire_type)`
    pub fn read_tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let offset = self.offset();
        let key = self.read_varint()?;
        let field = key >> 3;
        if field == 0 || field > u64::from(u32::MAX >> 3) {
            return Err(DecodeError::InvalidFieldNumber { offset });
        }
        let wire_type = WireType::from_raw((key & 0x07) as u8, offset)?;
        Ok((field as u32, wire_type))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        self.read_fixed64().map(f64::from_bits)
    }

    /// Read a length prefix and return the payload
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let offset = self.offset();
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated { offset })?;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        let offset = self.offset();
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Read a length-delimited field as a bounded sub-reader
    pub fn read_message(&mut self) -> Result<WireReader<'a>, DecodeError> {
        let bytes = self.read_bytes()?;
        let base = self.offset() - bytes.len();
        Ok(WireReader {
            buf: bytes,
            pos: 0,
            base,
        })
    }

    /// Skip the value of an unknown field
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::Len => self.read_bytes().map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_varint_values() {
        let cases: &[(&[u8], u64)] = &[
            (&[0x00], 0),
            (&[0x01], 1),
            (&[0x7f], 127),
            (&[0x80, 0x01], 128),
            (&[0xac, 0x02], 300),
            (
                &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01],
                u64::MAX,
            ),
        ];
        for (bytes, expected) in cases {
            let mut r = WireReader::new(bytes);
            assert_eq!(r.read_varint().unwrap(), *expected);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_read_varint_truncated() {
        let mut r = WireReader::new(&[0x80, 0x80]);
        assert_eq!(r.read_varint(), Err(DecodeError::Truncated { offset: 0 }));
    }

    #[test]
    fn test_read_varint_overlong() {
        let bytes = [0x80u8; 11];
        let mut r = WireReader::new(&bytes);
        assert_eq!(
            r.read_varint(),
            Err(DecodeError::MalformedVarint { offset: 0 })
        );

        // Ten bytes but overflowing 64 bits
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        let mut r = WireReader::new(&bytes);
        assert_eq!(
            r.read_varint(),
            Err(DecodeError::MalformedVarint { offset: 0 })
        );
    }

    #[test]
    fn test_read_tag() {
        // field 5, wire type 2
        let mut r = WireReader::new(&[0x2a]);
        assert_eq!(r.read_tag().unwrap(), (5, WireType::Len));

        // field 0 is invalid
        let mut r = WireReader::new(&[0x02]);
        assert_eq!(
            r.read_tag(),
            Err(DecodeError::InvalidFieldNumber { offset: 0 })
        );

        // start-group wire type
        let mut r = WireReader::new(&[0x0b]);
        assert_eq!(
            r.read_tag(),
            Err(DecodeError::UnsupportedWireType {
                wire_type: 3,
                offset: 0
            })
        );
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut bytes = 1_000_000_000_000_000_000u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_fixed64().unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(r.read_fixed32().unwrap(), 7);
        assert!(r.is_empty());

        let mut r = WireReader::new(&[1, 2, 3]);
        assert_eq!(r.read_fixed32(), Err(DecodeError::Truncated { offset: 0 }));
    }

    #[test]
    fn test_read_bytes_length_exceeds_buffer() {
        let mut r = WireReader::new(&[0x05, b'a', b'b']);
        assert_eq!(r.read_bytes(), Err(DecodeError::Truncated { offset: 1 }));
    }

    #[test]
    fn test_read_str_invalid_utf8() {
        let mut r = WireReader::new(&[0x02, 0xff, 0xfe]);
        assert_eq!(r.read_str(), Err(DecodeError::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn test_sub_reader_offsets_are_absolute() {
        // len=3 payload whose inner varint is truncated
        let bytes = [0x00, 0x03, 0x08, 0x80, 0x80];
        let mut r = WireReader::new(&bytes);
        r.read_varint().unwrap();
        let mut sub = r.read_message().unwrap();
        assert!(r.is_empty());
        assert_eq!(sub.read_tag().unwrap(), (1, WireType::Varint));
        assert_eq!(sub.read_varint(), Err(DecodeError::Truncated { offset: 3 }));
    }

    #[test]
    fn test_skip_each_wire_type() {
        let mut bytes = vec![0x96, 0x01]; // varint 150
        bytes.extend_from_slice(&[0u8; 8]); // fixed64
        bytes.extend_from_slice(&[0x02, b'h', b'i']); // len-delimited
        bytes.extend_from_slice(&[0u8; 4]); // fixed32
        let mut r = WireReader::new(&bytes);
        r.skip(WireType::Varint).unwrap();
        r.skip(WireType::Fixed64).unwrap();
        r.skip(WireType::Len).unwrap();
        r.skip(WireType::Fixed32).unwrap();
        assert!(r.is_empty());

        let mut r = WireReader::new(&[0u8; 7]);
        assert!(r.skip(WireType::Fixed64).is_err());
    }
}
