use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::frame::FormatError;
use crate::header::HEADER_SIZE;
use crate::{
    read_exact, Detail, Error, Frame, FrameKind, InstructionCache, RawFrame, TraceHeader, Toc,
    TOC_INTERVAL,
};

/// Reads exactly one frame from `reader` into `buffer`.
pub fn read_frame<'a, R: Read>(
    reader: &mut R,
    buffer: &'a mut Vec<u8>,
) -> Result<RawFrame<'a>, Error> {
    buffer.resize(1, 0);
    read_exact(reader, &mut buffer[..1])?;
    let kind = FrameKind::try_from(buffer[0]).map_err(FormatError::from)?;
    let fixed = kind.fixed_len();
    buffer.resize(fixed, 0);
    read_exact(reader, &mut buffer[1..])?;
    let tlen = kind.total_len(&buffer[..])?;
    buffer.resize(tlen, 0);
    read_exact(reader, &mut buffer[fixed..])?;
    Ok(RawFrame::new(buffer.as_slice()))
}

/// Sequential and random access reader for a finalized trace.
///
/// The header (and the TOC, if there is one) is validated when the reader is constructed. The
/// reader keeps its own [`InstructionCache`] in step with the one the writer used so that elided
/// instruction bytes can be restored.
///
/// A frame that fails to decode leaves the stream and the cache out of step with [`pos`]. From then
/// on [`next`] and [`skip`] fail with [`Error::InvalidState`] until [`seek`] repositions the reader.
///
/// [`pos`]: TraceReader::pos
/// [`next`]: TraceReader::next
/// [`skip`]: TraceReader::skip
/// [`seek`]: TraceReader::seek
#[derive(Debug)]
pub struct TraceReader<R> {
    reader: R,
    header: TraceHeader,
    toc: Option<Toc>,
    icache: InstructionCache,
    buffer: Vec<u8>,
    pos: u32,
    failed: bool,
}

impl TraceReader<BufReader<File>> {
    /// Opens the trace at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> TraceReader<R> {
    /// Validates the trace held in `reader` and positions the reader before its first frame.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        reader.seek(SeekFrom::Start(0))?;
        let header = TraceHeader::read(&mut reader)?;
        let toc = if header.has_toc() {
            let toc = Toc::read(&mut reader, &header)?;
            reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
            Some(toc)
        } else {
            None
        };
        tracing::debug!(
            frames = header.frame_count,
            toc_entries = toc.as_ref().map_or(0, Toc::len),
            "opened trace"
        );
        Ok(Self {
            reader,
            header,
            toc,
            icache: InstructionCache::new(),
            buffer: Vec::with_capacity(256),
            pos: 0,
            failed: false,
        })
    }

    /// Returns the number of frames in the trace.
    pub fn count(&self) -> u32 {
        self.header.frame_count
    }

    /// Returns the index of the frame the next call to [`TraceReader::next`] decodes.
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// Returns true once every frame has been consumed.
    pub fn eof(&self) -> bool {
        self.pos >= self.header.frame_count
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    pub fn toc(&self) -> Option<&Toc> {
        self.toc.as_ref()
    }

    /// Decodes the current frame and advances past it. Returns `None` at the end of the trace.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Frame>, Error> {
        self.advance(Detail::Full)
    }

    /// Advances past the current frame without materializing its operand values. The instruction
    /// cache is still updated. Returns false at the end of the trace.
    pub fn skip(&mut self) -> Result<bool, Error> {
        Ok(self.advance(Detail::Skim)?.is_some())
    }

    fn advance(&mut self, detail: Detail) -> Result<Option<Frame>, Error> {
        if self.failed {
            return Err(Error::InvalidState("trace reader stopped at a bad frame"));
        }
        if self.eof() {
            return Ok(None);
        }
        if self.pos % TOC_INTERVAL == 0 {
            self.icache.clear();
        }

        match self.decode(detail) {
            Ok(frame) => {
                self.pos += 1;
                Ok(Some(frame))
            }
            Err(err) => {
                self.failed = true;
                tracing::debug!(frame = self.pos, "stopped at a bad frame");
                Err(err)
            }
        }
    }

    fn decode(&mut self, detail: Detail) -> Result<Frame, Error> {
        let raw = read_frame(&mut self.reader, &mut self.buffer)?;
        let mut frame = Frame::parse(raw, detail)?;
        if let Frame::Std(ref mut sf) = frame {
            if sf.is_elided() {
                let (rawbytes, insn_length) = self.icache.lookup(sf.addr());
                if insn_length == 0 {
                    return Err(FormatError::MissingCachedBytes {
                        addr: sf.addr(),
                        index: self.pos,
                    })?;
                }
                sf.fill(rawbytes, insn_length);
            } else {
                self.icache.update(sf.addr(), sf.insbytes());
            }
        }
        Ok(frame)
    }

    /// Moves to frame `index` so that the next call to [`TraceReader::next`] decodes it.
    ///
    /// Returns false, without moving, if `index` is past the last frame. When the trace has a TOC
    /// the reader jumps to the closest checkpoint at or before `index`; otherwise it replays frames
    /// from its current position, or from the start when seeking backwards. A reader stopped at a
    /// bad frame always repositions before replaying.
    pub fn seek(&mut self, index: u32) -> Result<bool, Error> {
        if index >= self.header.frame_count {
            return Ok(false);
        }
        let _span = tracing::trace_span!("seek", from = self.pos, to = index).entered();

        match self.toc.as_ref().and_then(|toc| toc.nearest(index)) {
            Some((frame, offset)) if self.failed || frame > self.pos || index < self.pos => {
                self.jump(frame, offset)?
            }
            None if self.failed || index < self.pos => self.jump(0, HEADER_SIZE as u64)?,
            _ => {}
        }

        while self.pos < index {
            self.skip()?;
        }
        Ok(true)
    }

    fn jump(&mut self, frame: u32, offset: u64) -> Result<(), Error> {
        tracing::trace!(frame, offset, "jumping to checkpoint");
        self.reader.seek(SeekFrom::Start(offset))?;
        self.icache.clear();
        self.pos = frame;
        self.failed = false;
        Ok(())
    }

    /// Iterates over the remaining frames. Iteration ends after the first error.
    pub fn frames(&mut self) -> Frames<'_, R> {
        Frames {
            reader: self,
            failed: false,
        }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[derive(Debug)]
pub struct Frames<'r, R> {
    reader: &'r mut TraceReader<R>,
    failed: bool,
}

impl<R: Read + Seek> Iterator for Frames<'_, R> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.reader.next().transpose();
        self.failed = matches!(item, Some(Err(_)));
        item
    }
}
