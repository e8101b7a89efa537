use crate::{
    Error, RawFrame, MAX_INSN_BYTES, MAX_SYSCALL_ARGS, MAX_VALUES_COUNT, MODULE_NAME_LEN,
};
use std::borrow::Cow;
use std::fmt;

/// Enumeration of possible frame types.
///
/// This type corresponds to the first byte of every encoded frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameKind {
    Key = 0x01,
    Std = 0x02,
    LoadModule = 0x03,
    Syscall = 0x04,
}

const KEY_FRAME_LEN: usize = 1 + 8 + 9 * 4 + 6 * 2;
const STD_FRAME_FIXED_LEN: usize = 1 + 4 + 4 + 1 + 1;
const LOAD_MODULE_FRAME_LEN: usize = 1 + 4 * 4 + MODULE_NAME_LEN;
const SYSCALL_FRAME_LEN: usize = 1 + 3 * 4 + 4 * MAX_SYSCALL_ARGS;

impl FrameKind {
    /// Returns the number of bytes, tag included, that precede any variable length contents.
    pub fn fixed_len(self) -> usize {
        match self {
            Self::Key => KEY_FRAME_LEN,
            Self::Std => STD_FRAME_FIXED_LEN,
            Self::LoadModule => LOAD_MODULE_FRAME_LEN,
            Self::Syscall => SYSCALL_FRAME_LEN,
        }
    }

    /// Returns the full encoded length of a frame given its first [`FrameKind::fixed_len`] bytes.
    pub fn total_len(self, fixed: &[u8]) -> Result<usize, FormatError> {
        if fixed.len() < self.fixed_len() {
            return Err(FormatError::Truncated);
        }
        match self {
            Self::Std => {
                let insn_length = fixed[9] as usize;
                let values_count = fixed[10] as usize;
                if insn_length > MAX_INSN_BYTES {
                    return Err(FormatError::frame(
                        self,
                        FormatError::BadData("instruction length exceeds MAX_INSN_BYTES"),
                    ));
                }
                if values_count > MAX_VALUES_COUNT {
                    return Err(FormatError::frame(
                        self,
                        FormatError::BadData("values count exceeds MAX_VALUES_COUNT"),
                    ));
                }
                Ok(STD_FRAME_FIXED_LEN + insn_length + 4 * values_count)
            }
            _ => Ok(self.fixed_len()),
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = UnknownFrameKind;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Key),
            0x02 => Ok(Self::Std),
            0x03 => Ok(Self::LoadModule),
            0x04 => Ok(Self::Syscall),
            _ => Err(UnknownFrameKind(value)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How much of a frame [`Frame::parse`] materializes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Detail {
    /// Decode every field.
    #[default]
    Full,
    /// Leave the operand values of a [`StdFrame`] unread. Used while replaying frames that the
    /// caller is skipping past.
    Skim,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Frame {
    Key(KeyFrame),
    Std(StdFrame),
    LoadModule(LoadModuleFrame),
    Syscall(SyscallFrame),
}

impl Frame {
    /// Returns the corresponding [`FrameKind`] for this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Key(_) => FrameKind::Key,
            Self::Std(_) => FrameKind::Std,
            Self::LoadModule(_) => FrameKind::LoadModule,
            Self::Syscall(_) => FrameKind::Syscall,
        }
    }

    /// Parses a [`RawFrame`] to produce a frame.
    ///
    /// No instruction cache is consulted here: a [`StdFrame`] whose bytes were elided by the
    /// writer comes back with [`StdFrame::is_elided`] set, and it is up to the
    /// [`TraceReader`](crate::TraceReader) to fill them in.
    pub fn parse(raw: RawFrame<'_>, detail: Detail) -> Result<Self, FormatError> {
        let kind = raw.kind()?;
        let bytes = raw.contents();
        let frame = match kind {
            FrameKind::Key => KeyFrame::parse(bytes).map(Self::Key),
            FrameKind::Std => StdFrame::parse(bytes, detail).map(Self::Std),
            FrameKind::LoadModule => LoadModuleFrame::parse(bytes).map(Self::LoadModule),
            FrameKind::Syscall => SyscallFrame::parse(bytes).map(Self::Syscall),
        };
        frame.map_err(|e| FormatError::frame(kind, e))
    }

    /// Write a serialized frame into the provided buffer.
    pub fn emit(&self, buffer: &mut Vec<u8>) {
        match self {
            Self::Key(frame) => frame.emit(buffer),
            Self::Std(frame) => frame.emit(buffer),
            Self::LoadModule(frame) => frame.emit(buffer),
            Self::Syscall(frame) => frame.emit(buffer),
        }
    }
}

impl From<KeyFrame> for Frame {
    fn from(frame: KeyFrame) -> Self {
        Self::Key(frame)
    }
}

impl From<StdFrame> for Frame {
    fn from(frame: StdFrame) -> Self {
        Self::Std(frame)
    }
}

impl From<LoadModuleFrame> for Frame {
    fn from(frame: LoadModuleFrame) -> Self {
        Self::LoadModule(frame)
    }
}

impl From<SyscallFrame> for Frame {
    fn from(frame: SyscallFrame) -> Self {
        Self::Syscall(frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(frame) => write!(
                f,
                "key     pos={} eax={:#x} ebx={:#x} ecx={:#x} edx={:#x} esi={:#x} edi={:#x} \
                 esp={:#x} ebp={:#x} eflags={:#x}",
                frame.pos,
                frame.eax,
                frame.ebx,
                frame.ecx,
                frame.edx,
                frame.esi,
                frame.edi,
                frame.esp,
                frame.ebp,
                frame.eflags
            ),
            Self::Std(frame) => write!(
                f,
                "std     addr={:#010x} tid={} insn={:02x?} values={:x?}",
                frame.addr,
                frame.tid,
                frame.insbytes(),
                frame.values
            ),
            Self::LoadModule(frame) => write!(
                f,
                "loadmod name={} low={:#010x} high={:#010x} start={:#010x} offset={:#x}",
                frame.name(),
                frame.low_addr,
                frame.high_addr,
                frame.start_addr,
                frame.load_offset
            ),
            Self::Syscall(frame) => write!(
                f,
                "syscall addr={:#010x} tid={} callno={} args={:x?}",
                frame.addr, frame.tid, frame.callno, frame.args
            ),
        }
    }
}

/// Full register snapshot, recorded periodically so that a consumer can resume analysis without
/// replaying the trace from the start.
///
/// # Format
///
/// `| 0x01 | pos: le64 | eax ebx ecx edx esi edi esp ebp eflags: le32 | cs ds ss es fs gs: le16 |`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyFrame {
    /// Index of this frame within the trace, as reported by the instrumentation.
    pub pos: u64,
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub esp: u32,
    pub ebp: u32,
    pub eflags: u32,
    pub cs: u16,
    pub ds: u16,
    pub ss: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
}

impl KeyFrame {
    /// Constructs a keyframe holding the four general purpose accumulator registers. All other
    /// registers are zero.
    pub fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self {
            eax,
            ebx,
            ecx,
            edx,
            ..Default::default()
        }
    }

    fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (pos, bytes) = parse_le64(bytes)?;
        let mut regs = [0u32; 9];
        let mut bytes = bytes;
        for reg in regs.iter_mut() {
            (*reg, bytes) = parse_le32(bytes)?;
        }
        let mut segs = [0u16; 6];
        for seg in segs.iter_mut() {
            (*seg, bytes) = parse_le16(bytes)?;
        }
        let [eax, ebx, ecx, edx, esi, edi, esp, ebp, eflags] = regs;
        let [cs, ds, ss, es, fs, gs] = segs;
        Ok(Self {
            pos,
            eax,
            ebx,
            ecx,
            edx,
            esi,
            edi,
            esp,
            ebp,
            eflags,
            cs,
            ds,
            ss,
            es,
            fs,
            gs,
        })
    }

    fn emit(&self, buffer: &mut Vec<u8>) {
        buffer.push(FrameKind::Key as u8);
        buffer.extend_from_slice(&self.pos.to_le_bytes());
        for reg in [
            self.eax,
            self.ebx,
            self.ecx,
            self.edx,
            self.esi,
            self.edi,
            self.esp,
            self.ebp,
            self.eflags,
        ] {
            buffer.extend_from_slice(&reg.to_le_bytes());
        }
        for seg in [self.cs, self.ds, self.ss, self.es, self.fs, self.gs] {
            buffer.extend_from_slice(&seg.to_le_bytes());
        }
    }
}

/// Frame recording the execution of a single instruction.
///
/// # Format
///
/// `| 0x02 | addr: le32 | tid: le32 | insn_length: u8 | values_count: u8 |
///   rawbytes: [u8; insn_length] | values: [le32; values_count] |`
///
/// An `insn_length` of zero means the writer found the same bytes in its instruction cache and
/// left them out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StdFrame {
    addr: u32,
    tid: u32,
    insn_length: u8,
    rawbytes: [u8; MAX_INSN_BYTES],
    values: Vec<u32>,
}

impl StdFrame {
    /// Constructs a frame indicating that thread `tid` executed the instruction `insbytes` at
    /// `addr`.
    ///
    /// Fails when `insbytes` is empty or longer than [`MAX_INSN_BYTES`].
    pub fn new(addr: u32, tid: u32, insbytes: &[u8]) -> Result<Self, Error> {
        if insbytes.is_empty() {
            return Err(Error::InvalidFrame("instruction frame has no instruction bytes"));
        }
        if insbytes.len() > MAX_INSN_BYTES {
            return Err(Error::InvalidFrame("instruction is longer than MAX_INSN_BYTES"));
        }
        let mut rawbytes = [0u8; MAX_INSN_BYTES];
        rawbytes[..insbytes.len()].copy_from_slice(insbytes);
        Ok(Self {
            addr,
            tid,
            insn_length: insbytes.len() as u8,
            rawbytes,
            values: Vec::new(),
        })
    }

    /// Attaches operand values to the frame. Fails when more than [`MAX_VALUES_COUNT`] are given.
    pub fn with_values(mut self, values: &[u32]) -> Result<Self, Error> {
        if values.len() > MAX_VALUES_COUNT {
            return Err(Error::InvalidFrame("too many operand values"));
        }
        self.values = values.to_vec();
        Ok(self)
    }

    /// Returns the address of the instruction.
    pub fn addr(&self) -> u32 {
        self.addr
    }

    /// Returns the id of the thread that executed the instruction.
    pub fn tid(&self) -> u32 {
        self.tid
    }

    /// Returns the instruction length, or zero for a frame whose bytes have not been filled in
    /// from the instruction cache.
    pub fn insn_length(&self) -> usize {
        self.insn_length as usize
    }

    /// Returns the instruction bytes.
    pub fn insbytes(&self) -> &[u8] {
        &self.rawbytes[..self.insn_length as usize]
    }

    /// Returns the operand values. Empty for frames decoded with [`Detail::Skim`].
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn is_elided(&self) -> bool {
        self.insn_length == 0
    }

    pub(crate) fn elide(&mut self) {
        self.insn_length = 0;
    }

    pub(crate) fn fill(&mut self, rawbytes: &[u8; MAX_INSN_BYTES], insn_length: u8) {
        self.rawbytes = *rawbytes;
        self.insn_length = insn_length;
    }

    fn parse(bytes: &[u8], detail: Detail) -> Result<Self, FormatError> {
        let (addr, bytes) = parse_le32(bytes)?;
        let (tid, bytes) = parse_le32(bytes)?;
        let (insn_length, bytes) = parse_u8(bytes)?;
        let (values_count, bytes) = parse_u8(bytes)?;
        if insn_length as usize > MAX_INSN_BYTES {
            return Err(FormatError::BadData(
                "instruction length exceeds MAX_INSN_BYTES",
            ));
        }
        if values_count as usize > MAX_VALUES_COUNT {
            return Err(FormatError::BadData("values count exceeds MAX_VALUES_COUNT"));
        }
        let (insbytes, mut bytes) = split(bytes, insn_length as usize)?;
        let mut rawbytes = [0u8; MAX_INSN_BYTES];
        rawbytes[..insbytes.len()].copy_from_slice(insbytes);

        let mut values = Vec::new();
        match detail {
            Detail::Full => {
                values.reserve(values_count as usize);
                for _ in 0..values_count {
                    let (value, remaining) = parse_le32(bytes)?;
                    values.push(value);
                    bytes = remaining;
                }
            }
            Detail::Skim => {
                split(bytes, 4 * values_count as usize)?;
            }
        }

        Ok(Self {
            addr,
            tid,
            insn_length,
            rawbytes,
            values,
        })
    }

    fn emit(&self, buffer: &mut Vec<u8>) {
        buffer.push(FrameKind::Std as u8);
        buffer.extend_from_slice(&self.addr.to_le_bytes());
        buffer.extend_from_slice(&self.tid.to_le_bytes());
        buffer.push(self.insn_length);
        buffer.push(self.values.len() as u8);
        buffer.extend_from_slice(self.insbytes());
        for value in &self.values {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Frame indicating that an image has been loaded into the traced process.
///
/// # Format
///
/// `| 0x03 | low_addr high_addr start_addr load_offset: le32 | name: [u8; 64] |`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadModuleFrame {
    pub low_addr: u32,
    pub high_addr: u32,
    pub start_addr: u32,
    pub load_offset: u32,
    name: [u8; MODULE_NAME_LEN],
}

impl LoadModuleFrame {
    /// Constructs a module load frame. Names longer than `MODULE_NAME_LEN - 1` bytes are
    /// truncated so the stored name always keeps a terminating NUL.
    pub fn new(
        name: &str,
        low_addr: u32,
        high_addr: u32,
        start_addr: u32,
        load_offset: u32,
    ) -> Self {
        let mut stored = [0u8; MODULE_NAME_LEN];
        let len = name.len().min(MODULE_NAME_LEN - 1);
        stored[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            low_addr,
            high_addr,
            start_addr,
            load_offset,
            name: stored,
        }
    }

    /// Returns the module name up to the first NUL.
    pub fn name(&self) -> Cow<'_, str> {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MODULE_NAME_LEN);
        String::from_utf8_lossy(&self.name[..end])
    }

    fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (low_addr, bytes) = parse_le32(bytes)?;
        let (high_addr, bytes) = parse_le32(bytes)?;
        let (start_addr, bytes) = parse_le32(bytes)?;
        let (load_offset, bytes) = parse_le32(bytes)?;
        let (stored, _) = split(bytes, MODULE_NAME_LEN)?;
        let mut name = [0u8; MODULE_NAME_LEN];
        name.copy_from_slice(stored);
        Ok(Self {
            low_addr,
            high_addr,
            start_addr,
            load_offset,
            name,
        })
    }

    fn emit(&self, buffer: &mut Vec<u8>) {
        buffer.push(FrameKind::LoadModule as u8);
        buffer.extend_from_slice(&self.low_addr.to_le_bytes());
        buffer.extend_from_slice(&self.high_addr.to_le_bytes());
        buffer.extend_from_slice(&self.start_addr.to_le_bytes());
        buffer.extend_from_slice(&self.load_offset.to_le_bytes());
        buffer.extend_from_slice(&self.name);
    }
}

/// Frame indicating that a thread entered a system call.
///
/// # Format
///
/// `| 0x04 | addr: le32 | tid: le32 | callno: le32 | args: [le32; 9] |`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SyscallFrame {
    pub addr: u32,
    pub tid: u32,
    pub callno: u32,
    pub args: [u32; MAX_SYSCALL_ARGS],
}

impl SyscallFrame {
    fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (addr, bytes) = parse_le32(bytes)?;
        let (tid, bytes) = parse_le32(bytes)?;
        let (callno, mut bytes) = parse_le32(bytes)?;
        let mut args = [0u32; MAX_SYSCALL_ARGS];
        for arg in args.iter_mut() {
            (*arg, bytes) = parse_le32(bytes)?;
        }
        Ok(Self {
            addr,
            tid,
            callno,
            args,
        })
    }

    fn emit(&self, buffer: &mut Vec<u8>) {
        buffer.push(FrameKind::Syscall as u8);
        buffer.extend_from_slice(&self.addr.to_le_bytes());
        buffer.extend_from_slice(&self.tid.to_le_bytes());
        buffer.extend_from_slice(&self.callno.to_le_bytes());
        for arg in &self.args {
            buffer.extend_from_slice(&arg.to_le_bytes());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("failed to parse {0} frame")]
    ParseFrame(FrameKind, #[source] Box<FormatError>),

    #[error("bad magic value: {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported trace version: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    UnknownFrameKind(#[from] UnknownFrameKind),

    #[error("trace ends in the middle of a structure")]
    Truncated,

    #[error("data did not match the required format: {0}")]
    BadData(&'static str),

    #[error("table of contents is invalid: {0}")]
    BadToc(&'static str),

    #[error("frame {index} elides the bytes at {addr:#010x} but the instruction cache holds none")]
    MissingCachedBytes { addr: u32, index: u32 },
}

impl FormatError {
    fn frame(kind: FrameKind, e: FormatError) -> Self {
        match e {
            Self::ParseFrame(..) => e,
            e => Self::ParseFrame(kind, Box::new(e)),
        }
    }

    /// Strips any per-frame context from the error.
    pub fn root(&self) -> &FormatError {
        match self {
            Self::ParseFrame(_, inner) => inner.root(),
            e => e,
        }
    }
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("unknown frame kind: {0:#x}")]
pub struct UnknownFrameKind(pub u8);

fn split(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), FormatError> {
    if bytes.len() < n {
        return Err(FormatError::Truncated);
    }
    Ok(bytes.split_at(n))
}

macro_rules! generate_parse_func {
    ($name:ident,$ty:ty) => {
        pub(crate) fn $name(bytes: &[u8]) -> Result<($ty, &[u8]), FormatError> {
            let mut buffer = [0u8; ::std::mem::size_of::<$ty>()];
            let (left, right) = split(bytes, ::std::mem::size_of::<$ty>())?;
            buffer.as_mut_slice().copy_from_slice(left);
            Ok((<$ty>::from_le_bytes(buffer), right))
        }
    };
}

generate_parse_func!(parse_u8, u8);
generate_parse_func!(parse_le16, u16);
generate_parse_func!(parse_le32, u32);
generate_parse_func!(parse_le64, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::one_frame;

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut buffer = Vec::new();
        frame.emit(&mut buffer);
        buffer
    }

    #[test]
    fn std_frame_layout() {
        let frame = StdFrame::new(0x1000, 7, &[0x90, 0x90])
            .unwrap()
            .with_values(&[0xdead_beef])
            .unwrap();
        let bytes = encode(&frame.into());
        assert_eq!(
            bytes,
            [
                0x02, 0x00, 0x10, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x02, 0x01, 0x90, 0x90,
                0xef, 0xbe, 0xad, 0xde,
            ]
        );
    }

    #[test]
    fn elided_std_frame_omits_bytes() {
        let mut frame = StdFrame::new(0x1000, 7, &[0x0f, 0x1f, 0x00]).unwrap();
        frame.elide();
        let bytes = encode(&frame.clone().into());
        assert_eq!(bytes.len(), STD_FRAME_FIXED_LEN);

        let Frame::Std(decoded) = one_frame(&bytes).unwrap().parse(Detail::Full).unwrap() else {
            panic!("expected a standard frame");
        };
        assert!(decoded.is_elided());
        assert_eq!(decoded.addr(), 0x1000);
        assert_eq!(decoded.insbytes(), &[] as &[u8]);
    }

    #[test]
    fn fixed_layout_lengths() {
        let key = encode(&KeyFrame::new(1, 2, 3, 4).into());
        assert_eq!(key.len(), FrameKind::Key.fixed_len());

        let module = encode(&LoadModuleFrame::new("libc.so.6", 0x1000, 0x2000, 0x1100, 0).into());
        assert_eq!(module.len(), FrameKind::LoadModule.fixed_len());

        let syscall = encode(&SyscallFrame::default().into());
        assert_eq!(syscall.len(), FrameKind::Syscall.fixed_len());
    }

    #[test]
    fn parse_every_kind() {
        let frames: Vec<Frame> = vec![
            KeyFrame {
                pos: 12,
                esp: 0xbfff_f000,
                eflags: 0x246,
                gs: 0x33,
                ..KeyFrame::new(0x1, 0x2, 0x3, 0x4)
            }
            .into(),
            StdFrame::new(0x0804_8000, 1, &[0xcd, 0x80])
                .unwrap()
                .with_values(&[1, 2, 3])
                .unwrap()
                .into(),
            LoadModuleFrame::new("ld-linux.so.2", 0xb7fe_0000, 0xb800_0000, 0xb7fe_0850, 0).into(),
            SyscallFrame {
                addr: 0xb7fe_1424,
                tid: 1,
                callno: 4,
                args: [1, 0x0804_a000, 13, 0, 0, 0, 0, 0, 0],
            }
            .into(),
        ];
        for frame in frames {
            let bytes = encode(&frame);
            let raw = one_frame(&bytes).unwrap();
            assert_eq!(raw.len(), bytes.len());
            assert_eq!(raw.kind().unwrap(), frame.kind());
            assert_eq!(raw.parse(Detail::Full).unwrap(), frame);
        }
    }

    #[test]
    fn skim_leaves_values_unread() {
        let frame = StdFrame::new(0x4000, 2, &[0x55])
            .unwrap()
            .with_values(&[9, 8, 7])
            .unwrap();
        let bytes = encode(&frame.into());
        let Frame::Std(decoded) = one_frame(&bytes).unwrap().parse(Detail::Skim).unwrap() else {
            panic!("expected a standard frame");
        };
        assert_eq!(decoded.insbytes(), &[0x55]);
        assert!(decoded.values().is_empty());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = one_frame(&[0x7f, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, FormatError::UnknownFrameKind(UnknownFrameKind(0x7f))));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bytes = encode(&KeyFrame::new(1, 2, 3, 4).into());
        let err = one_frame(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, FormatError::Truncated));
    }

    #[test]
    fn oversized_instruction_length_is_rejected() {
        let mut bytes = encode(&StdFrame::new(0x1000, 0, &[0x90]).unwrap().into());
        bytes[9] = MAX_INSN_BYTES as u8 + 1;
        let err = one_frame(&bytes).unwrap_err();
        assert!(matches!(err.root(), FormatError::BadData(_)));
    }

    #[test]
    fn std_frame_construction_limits() {
        assert!(matches!(
            StdFrame::new(0, 0, &[]),
            Err(Error::InvalidFrame(_))
        ));
        assert!(matches!(
            StdFrame::new(0, 0, &[0x90; MAX_INSN_BYTES + 1]),
            Err(Error::InvalidFrame(_))
        ));
        let frame = StdFrame::new(0, 0, &[0x90; MAX_INSN_BYTES]).unwrap();
        assert!(matches!(
            frame.with_values(&[0; MAX_VALUES_COUNT + 1]),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn module_name_is_truncated_and_terminated() {
        let long = "m".repeat(100);
        let frame = LoadModuleFrame::new(&long, 0, 0, 0, 0);
        assert_eq!(frame.name().len(), MODULE_NAME_LEN - 1);
        assert_eq!(LoadModuleFrame::new("a.out", 0, 0, 0, 0).name(), "a.out");
    }
}
