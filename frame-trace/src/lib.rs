use std::path::Path;
use std::{fs, io};

pub mod frame;
pub mod header;
pub mod icache;
pub mod index;
pub mod reader;
pub mod writer;

pub use frame::{Detail, Frame, FrameKind, KeyFrame, LoadModuleFrame, StdFrame, SyscallFrame};
pub use header::TraceHeader;
pub use icache::InstructionCache;
pub use index::Toc;
pub use reader::TraceReader;
pub use writer::TraceWriter;

use frame::{FormatError, UnknownFrameKind};

/// Identifies a trace file. Reads as `"BTRC"` when stored little endian.
pub const TRACE_MAGIC: u32 = 0x4352_5442;

/// Format revision. Any other value is rejected when a trace is opened.
pub const TRACE_VERSION: u32 = 1;

/// Largest instruction the format can carry.
pub const MAX_INSN_BYTES: usize = 15;

/// Largest number of operand values carried by a single [`StdFrame`].
pub const MAX_VALUES_COUNT: usize = 15;

/// Number of argument slots in a [`SyscallFrame`].
pub const MAX_SYSCALL_ARGS: usize = 9;

/// Size of the NUL padded module name in a [`LoadModuleFrame`].
pub const MODULE_NAME_LEN: usize = 64;

/// Number of slots in the [`InstructionCache`]. Must be a power of two.
pub const TRACE_ICACHE_SIZE: usize = 1024;

/// Mask applied to an instruction address to select its cache slot.
pub const TRACE_ICACHE_MASK: u32 = TRACE_ICACHE_SIZE as u32 - 1;

/// Number of frames between cache checkpoints.
///
/// Writer and reader both clear their instruction cache before frame `i` whenever
/// `i % TOC_INTERVAL == 0`, and entry `j` of a [`Toc`] is the byte offset of frame
/// `j * TOC_INTERVAL`.
pub const TOC_INTERVAL: u32 = 1024;

/// `toc_offset` value meaning that the trace has no table of contents.
pub const NO_TOC: u64 = 0;

/// Frames exactly one frame from the start of `buffer`.
pub fn one_frame(buffer: &[u8]) -> Result<RawFrame, FormatError> {
    let kind = FrameKind::try_from(*buffer.first().ok_or(FormatError::Truncated)?)?;
    let fixed = buffer
        .get(..kind.fixed_len())
        .ok_or(FormatError::Truncated)?;
    let tlen = kind.total_len(fixed)?;
    buffer
        .get(..tlen)
        .ok_or(FormatError::Truncated)
        .map(RawFrame)
}

/// An entire trace held in memory, header included.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TraceBuffer<'b>(&'b [u8]);

impl<'b> TraceBuffer<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Self(bytes)
    }

    /// Parses and validates the header at the start of the buffer.
    pub fn header(&self) -> Result<TraceHeader, FormatError> {
        let header = TraceHeader::parse(self.0)?;
        header.validate()?;
        Ok(header)
    }

    /// Iterates over the framed (but undecoded) frames that follow the header.
    ///
    /// Iteration stops after `frame_count` frames or after yielding the first error.
    pub fn iter(&self) -> Result<TraceBufferIter<'b>, FormatError> {
        let header = self.header()?;
        Ok(TraceBufferIter {
            buffer: self.0,
            pos: header::HEADER_SIZE,
            remaining: header.frame_count,
        })
    }

    pub fn bytes(&self) -> &'b [u8] {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TraceBufferIter<'b> {
    buffer: &'b [u8],
    pos: usize,
    remaining: u32,
}

impl<'b> TraceBufferIter<'b> {
    /// Byte offset of the next frame to be yielded.
    pub fn offset(&self) -> usize {
        self.pos
    }
}

impl<'b> Iterator for TraceBufferIter<'b> {
    type Item = Result<RawFrame<'b>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = self
            .buffer
            .get(self.pos..)
            .ok_or(FormatError::Truncated)
            .and_then(one_frame);
        match result {
            Ok(raw) => {
                self.pos += raw.len();
                self.remaining -= 1;
                Some(Ok(raw))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

/// A trace file mapped into memory.
#[derive(Debug)]
pub struct TraceMap {
    mmap: memmap::Mmap,
}

impl TraceMap {
    /// Maps the trace at `path` read-only.
    ///
    /// # Safety
    ///
    /// The file must not be modified while it is mapped.
    pub unsafe fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        let mmap = memmap::Mmap::map(&file)?;
        Ok(Self { mmap })
    }

    pub fn buffer(&self) -> TraceBuffer<'_> {
        TraceBuffer(&self.mmap[..])
    }
}

/// The encoded bytes of a single frame, tag included.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawFrame<'a>(&'a [u8]);

impl<'a> RawFrame<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        RawFrame(bytes)
    }

    pub fn kind(&self) -> Result<FrameKind, UnknownFrameKind> {
        FrameKind::try_from(self.0.first().copied().unwrap_or(0))
    }

    /// Returns the bytes following the tag.
    pub fn contents(&self) -> &'a [u8] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse(&self, detail: Detail) -> Result<Frame, FormatError> {
        Frame::parse(*self, detail)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0
    }
}

/// Reads exactly `buf.len()` bytes, reporting a short stream as a truncated trace.
pub(crate) fn read_exact<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::Format(FormatError::Truncated),
        _ => Error::Io(err),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed trace")]
    Format(#[from] FormatError),

    #[error("trace I/O failed")]
    Io(#[from] io::Error),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    #[error("invalid table of contents: {0}")]
    InvalidToc(&'static str),
}
