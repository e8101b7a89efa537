use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::header::HEADER_SIZE;
use crate::index::emit_toc;
use crate::{Error, Frame, InstructionCache, TraceHeader, NO_TOC, TOC_INTERVAL};

/// Appends frames to a trace.
///
/// Instruction bytes that match the writer's [`InstructionCache`] are left out of
/// [`StdFrame`](crate::StdFrame)s. The header written at construction is a placeholder until
/// [`TraceWriter::finalize`] runs. Once a write to the underlying stream fails, the byte offsets
/// the writer tracks can no longer be trusted and every further call is rejected.
#[derive(Debug)]
pub struct TraceWriter<W: Write + Seek> {
    writer: W,
    icache: InstructionCache,
    buffer: Vec<u8>,
    count: u32,
    offset: u64,
    toc: Vec<u32>,
    toc_truncated: bool,
    finalized: bool,
    failed: bool,
}

impl TraceWriter<BufWriter<File>> {
    /// Creates (or truncates) the trace file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> TraceWriter<W> {
    /// Starts a trace at the beginning of `writer`.
    pub fn new(mut writer: W) -> Result<Self, Error> {
        let mut buffer = Vec::with_capacity(256);
        TraceHeader::placeholder().emit(&mut buffer);
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&buffer)?;
        Ok(Self {
            writer,
            icache: InstructionCache::new(),
            buffer,
            count: 0,
            offset: HEADER_SIZE as u64,
            toc: Vec::new(),
            toc_truncated: false,
            finalized: false,
            failed: false,
        })
    }

    /// Returns the number of frames added so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the checkpoint offsets recorded so far. Entry `j` is the offset of frame
    /// `j * TOC_INTERVAL`.
    pub fn toc(&self) -> &[u32] {
        &self.toc
    }

    /// Returns the byte offset at which the next frame will be written.
    pub fn stream_position(&self) -> u64 {
        self.offset
    }

    /// Appends `frame` to the trace.
    ///
    /// The frame is taken by value: eliding instruction bytes only ever changes the writer's own
    /// copy.
    pub fn add(&mut self, frame: impl Into<Frame>) -> Result<(), Error> {
        self.check_usable()?;
        if self.finalized {
            return Err(Error::InvalidState("frame added to a finalized trace"));
        }
        if self.count == u32::MAX {
            return Err(Error::InvalidState("trace holds the maximum number of frames"));
        }

        let mut frame = frame.into();
        if matches!(frame, Frame::Std(ref sf) if sf.is_elided()) {
            return Err(Error::InvalidFrame(
                "instruction frame has no instruction bytes",
            ));
        }

        if self.count % TOC_INTERVAL == 0 {
            self.icache.clear();
            self.checkpoint();
        }

        if let Frame::Std(ref mut sf) = frame {
            if self.icache.matches(sf.addr(), sf.insbytes()) {
                sf.elide();
            } else {
                self.icache.update(sf.addr(), sf.insbytes());
            }
        }

        self.buffer.clear();
        frame.emit(&mut self.buffer);
        self.write_buffer()?;
        self.offset += self.buffer.len() as u64;
        self.count += 1;
        Ok(())
    }

    fn check_usable(&self) -> Result<(), Error> {
        if self.failed {
            return Err(Error::InvalidState("trace writer failed on an earlier write"));
        }
        Ok(())
    }

    fn write_buffer(&mut self) -> Result<(), Error> {
        self.writer.write_all(&self.buffer).map_err(|err| {
            self.failed = true;
            tracing::warn!(
                frame = self.count,
                offset = self.offset,
                error = %err,
                "trace write failed"
            );
            Error::Io(err)
        })
    }

    fn checkpoint(&mut self) {
        match u32::try_from(self.offset) {
            Ok(offset) if !self.toc_truncated => self.toc.push(offset),
            Ok(_) => {}
            Err(_) => {
                if !self.toc_truncated {
                    tracing::warn!(
                        frame = self.count,
                        recorded = self.toc.len(),
                        "trace passed 4 GiB, later checkpoints will not be indexed"
                    );
                }
                self.toc_truncated = true;
            }
        }
    }

    /// Completes the trace.
    ///
    /// - `toc` given: it is written verbatim after the last frame. It must be a prefix of the
    ///   checkpoints in [`TraceWriter::toc`]; anything else fails with [`Error::InvalidToc`]
    ///   before any byte is written, and the writer can still be finalized.
    /// - `build_toc` without `toc`: the checkpoints recorded while adding frames are written.
    /// - neither: the trace has no TOC.
    ///
    /// The final header is then written at offset 0 and the stream flushed. The writer rejects
    /// every further call.
    pub fn finalize(
        &mut self,
        toc: Option<&[u32]>,
        build_toc: bool,
    ) -> Result<TraceHeader, Error> {
        self.check_usable()?;
        if self.finalized {
            return Err(Error::InvalidState("trace has already been finalized"));
        }
        if let Some(toc) = toc {
            if !self.toc.starts_with(toc) {
                return Err(Error::InvalidToc("entries do not match the recorded checkpoints"));
            }
        }
        self.finalized = true;

        let offsets = match toc {
            Some(toc) => Some(toc),
            None if build_toc => Some(self.toc.as_slice()),
            None => None,
        };
        let toc_offset = match offsets {
            Some(offsets) => {
                let toc_offset = self.offset;
                self.buffer.clear();
                emit_toc(offsets, &mut self.buffer);
                self.write_buffer()?;
                self.offset += self.buffer.len() as u64;
                toc_offset
            }
            None => NO_TOC,
        };

        let header = TraceHeader::new(self.count, toc_offset);
        self.buffer.clear();
        header.emit(&mut self.buffer);
        let result = self
            .writer
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.writer.write_all(&self.buffer))
            .and_then(|_| self.writer.seek(SeekFrom::Start(self.offset)))
            .and_then(|_| self.writer.flush());
        if let Err(err) = result {
            self.failed = true;
            return Err(Error::Io(err));
        }

        tracing::debug!(
            frames = header.frame_count,
            toc_offset = header.toc_offset,
            bytes = self.offset,
            "finalized trace"
        );
        Ok(header)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
