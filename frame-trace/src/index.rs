//! Table of contents for seeking into a trace.
//!
//! Frames are variable length and a [`StdFrame`](crate::StdFrame) may depend on instruction cache
//! state built up by every frame before it, so a frame index cannot be turned into a byte offset by
//! arithmetic. Instead, writer and reader clear their caches every [`TOC_INTERVAL`] frames. Each of
//! those frames is a checkpoint whose cache state is known, and the TOC records their offsets.
//!
//! # Format
//!
//! `| len: le32 | offsets: [le32; len] |`
//!
//! Entry `j` is the byte offset of frame `j * TOC_INTERVAL`. A TOC may list only a prefix of the
//! checkpoints.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::frame::{parse_le32, FormatError};
use crate::header::HEADER_SIZE;
use crate::{one_frame, read_exact, Error, TraceBuffer, TraceHeader, TraceMap, TOC_INTERVAL};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Toc {
    offsets: Vec<u32>,
}

impl Toc {
    pub fn new(offsets: Vec<u32>) -> Self {
        Self { offsets }
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Number of checkpoints in a trace of `frame_count` frames.
    pub fn checkpoints(frame_count: u32) -> usize {
        frame_count.div_ceil(TOC_INTERVAL) as usize
    }

    /// Returns the last recorded checkpoint at or before frame `index` as `(frame, offset)`.
    pub fn nearest(&self, index: u32) -> Option<(u32, u64)> {
        let last = self.offsets.len().checked_sub(1)?;
        let entry = ((index / TOC_INTERVAL) as usize).min(last);
        Some((entry as u32 * TOC_INTERVAL, self.offsets[entry] as u64))
    }

    /// Parses a TOC record, ignoring anything that follows it.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (len, mut bytes) = parse_le32(bytes)?;
        if (bytes.len() / 4) < len as usize {
            return Err(FormatError::Truncated);
        }
        let mut offsets = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let (offset, remaining) = parse_le32(bytes)?;
            offsets.push(offset);
            bytes = remaining;
        }
        Ok(Self { offsets })
    }

    /// Reads the TOC that `header` points at and checks it against the trace.
    pub fn read<R: Read + Seek>(reader: &mut R, header: &TraceHeader) -> Result<Self, Error> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if header.toc_offset < HEADER_SIZE as u64
            || header.toc_offset.saturating_add(4) > file_len
        {
            return Err(FormatError::BadToc("record lies outside of the trace"))?;
        }
        reader.seek(SeekFrom::Start(header.toc_offset))?;

        let mut len = [0u8; 4];
        read_exact(reader, &mut len)?;
        let len = u32::from_le_bytes(len) as u64;
        if header.toc_offset.saturating_add(4 + 4 * len) > file_len {
            return Err(FormatError::BadToc("record lies outside of the trace"))?;
        }
        if len > Self::checkpoints(header.frame_count) as u64 {
            return Err(FormatError::BadToc("more entries than checkpoints"))?;
        }

        let mut bytes = vec![0u8; 4 + 4 * len as usize];
        bytes[..4].copy_from_slice(&(len as u32).to_le_bytes());
        read_exact(reader, &mut bytes[4..])?;
        let toc = Self::parse(&bytes)?;
        toc.validate(header)?;
        Ok(toc)
    }

    /// Checks that every entry points into the frame region and that entries strictly increase.
    pub fn validate(&self, header: &TraceHeader) -> Result<(), FormatError> {
        if self.offsets.len() > Self::checkpoints(header.frame_count) {
            return Err(FormatError::BadToc("more entries than checkpoints"));
        }
        if let Some(&first) = self.offsets.first() {
            if first as usize != HEADER_SIZE {
                return Err(FormatError::BadToc("first entry does not follow the header"));
            }
        }
        if self.offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FormatError::BadToc("entries are not increasing"));
        }
        if header.has_toc() {
            if let Some(&last) = self.offsets.last() {
                if last as u64 >= header.toc_offset {
                    return Err(FormatError::BadToc("entry points past the last frame"));
                }
            }
        }
        Ok(())
    }

    pub fn emit(&self, buffer: &mut Vec<u8>) {
        emit_toc(&self.offsets, buffer);
    }
}

/// Serializes a TOC record holding `offsets` into `buffer`.
pub fn emit_toc(offsets: &[u32], buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
    for offset in offsets {
        buffer.extend_from_slice(&offset.to_le_bytes());
    }
}

/// Result of walking every frame of a trace held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub header: TraceHeader,
    pub toc: Toc,
    /// Offset one past the last frame.
    pub frames_end: u64,
}

/// Frames every frame of `trace` without decoding it, recording the offset of each checkpoint.
///
/// Checkpoints past `u32::MAX` cannot be represented and are left out, so the resulting TOC is
/// a prefix of the full checkpoint list.
pub fn scan_toc(trace: TraceBuffer<'_>) -> Result<Scan, FormatError> {
    let header = trace.header()?;
    let bytes = trace.bytes();
    let mut offsets = Vec::with_capacity(Toc::checkpoints(header.frame_count));
    let mut pos = HEADER_SIZE;
    for index in 0..header.frame_count {
        if index % TOC_INTERVAL == 0 {
            if let Ok(offset) = u32::try_from(pos) {
                offsets.push(offset);
            }
        }
        let frame = bytes
            .get(pos..)
            .ok_or(FormatError::Truncated)
            .and_then(one_frame)?;
        pos += frame.len();
    }
    if header.has_toc() && pos as u64 > header.toc_offset {
        return Err(FormatError::BadToc("record overlaps the frames"));
    }
    Ok(Scan {
        header,
        toc: Toc::new(offsets),
        frames_end: pos as u64,
    })
}

/// Attaches a freshly scanned TOC to the finalized trace at `path`, replacing any TOC it already
/// carries. Returns the updated header.
pub fn rewrite_toc<P: AsRef<Path>>(path: P) -> Result<TraceHeader, Error> {
    let path = path.as_ref();
    let scan = {
        // SAFETY: the mapping is dropped before the file is reopened for writing below.
        let map = unsafe { TraceMap::open(path)? };
        scan_toc(map.buffer())?
    };
    if scan.toc.len() < Toc::checkpoints(scan.header.frame_count) {
        tracing::warn!(
            recorded = scan.toc.len(),
            "trace is larger than 4 GiB, TOC only covers its beginning"
        );
    }

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.set_len(scan.frames_end)?;
    file.seek(SeekFrom::Start(scan.frames_end))?;

    let mut buffer = Vec::new();
    scan.toc.emit(&mut buffer);
    file.write_all(&buffer)?;

    let header = TraceHeader::new(scan.header.frame_count, scan.frames_end);
    buffer.clear();
    header.emit(&mut buffer);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buffer)?;
    file.sync_all()?;

    tracing::debug!(
        frames = header.frame_count,
        entries = scan.toc.len(),
        toc_offset = header.toc_offset,
        "rewrote table of contents"
    );
    Ok(header)
}
