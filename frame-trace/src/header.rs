use std::io::Read;

use crate::frame::{parse_le32, parse_le64, FormatError};
use crate::{read_exact, Error, NO_TOC, TRACE_MAGIC, TRACE_VERSION};

/// Encoded size of a [`TraceHeader`].
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 8;

/// Fixed size preamble at offset 0 of every trace.
///
/// # Format
///
/// `| magic: le32 | version: le32 | frame_count: le32 | toc_offset: le64 |`
///
/// The writer emits an all zero placeholder when it is created and the real header when the trace
/// is finalized, so a trace that was never finalized fails magic validation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TraceHeader {
    pub magic: u32,
    pub version: u32,
    pub frame_count: u32,
    pub toc_offset: u64,
}

impl TraceHeader {
    /// Constructs a valid header for a trace of `frame_count` frames.
    pub fn new(frame_count: u32, toc_offset: u64) -> Self {
        Self {
            magic: TRACE_MAGIC,
            version: TRACE_VERSION,
            frame_count,
            toc_offset,
        }
    }

    pub(crate) fn placeholder() -> Self {
        Self {
            magic: 0,
            version: 0,
            frame_count: 0,
            toc_offset: NO_TOC,
        }
    }

    /// Returns true if the trace carries a table of contents.
    pub fn has_toc(&self) -> bool {
        self.toc_offset != NO_TOC
    }

    /// Checks the magic value, then the version.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.magic != TRACE_MAGIC {
            return Err(FormatError::InvalidMagic(self.magic));
        }
        if self.version != TRACE_VERSION {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Parses the header fields without validating them.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (magic, bytes) = parse_le32(bytes)?;
        let (version, bytes) = parse_le32(bytes)?;
        let (frame_count, bytes) = parse_le32(bytes)?;
        let (toc_offset, _) = parse_le64(bytes)?;
        Ok(Self {
            magic,
            version,
            frame_count,
            toc_offset,
        })
    }

    /// Reads and validates a header from the current position of `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut bytes = [0u8; HEADER_SIZE];
        read_exact(reader, &mut bytes)?;
        let header = Self::parse(&bytes)?;
        header.validate()?;
        Ok(header)
    }

    pub fn emit(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.magic.to_le_bytes());
        buffer.extend_from_slice(&self.version.to_le_bytes());
        buffer.extend_from_slice(&self.frame_count.to_le_bytes());
        buffer.extend_from_slice(&self.toc_offset.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let mut bytes = Vec::new();
        TraceHeader::new(2, 0x1234).emit(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"BTRC");
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[2, 0, 0, 0]);
        assert_eq!(&bytes[12..20], &[0x34, 0x12, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            TraceHeader::read(&mut Cursor::new(bytes)).unwrap(),
            TraceHeader::new(2, 0x1234)
        );
    }

    #[test]
    fn placeholder_is_not_a_valid_header() {
        let mut bytes = Vec::new();
        TraceHeader::placeholder().emit(&mut bytes);
        let err = TraceHeader::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidMagic(0))));
    }

    #[test]
    fn version_is_checked_after_magic() {
        let header = TraceHeader {
            version: TRACE_VERSION + 1,
            ..TraceHeader::new(0, NO_TOC)
        };
        assert!(matches!(
            header.validate(),
            Err(FormatError::UnsupportedVersion(v)) if v == TRACE_VERSION + 1
        ));

        let header = TraceHeader {
            magic: 0xffff_ffff,
            ..header
        };
        assert!(matches!(
            header.validate(),
            Err(FormatError::InvalidMagic(0xffff_ffff))
        ));
    }

    #[test]
    fn short_header_is_truncated() {
        let err = TraceHeader::read(&mut Cursor::new(vec![0x42, 0x54, 0x52])).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Truncated)));
    }
}
