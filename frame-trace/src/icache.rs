use crate::{MAX_INSN_BYTES, TRACE_ICACHE_MASK, TRACE_ICACHE_SIZE};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct Slot {
    bytes: [u8; MAX_INSN_BYTES],
    len: u8,
}

/// Direct mapped cache of the most recently seen instruction bytes per slot.
///
/// The slot for an address is `addr & TRACE_ICACHE_MASK`. Slots carry no address tag, so two
/// addresses that share a slot evict each other without notice. The writer and the reader each own
/// one and must feed it the same sequence of updates for elided bytes to be recoverable.
#[derive(Debug, Clone)]
pub struct InstructionCache {
    slots: Box<[Slot]>,
}

impl Default for InstructionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionCache {
    /// Creates a zero filled cache.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); TRACE_ICACHE_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn slot(addr: u32) -> usize {
        (addr & TRACE_ICACHE_MASK) as usize
    }

    /// Returns whatever the slot for `addr` currently holds along with its length.
    ///
    /// There is no validity flag; the result is only meaningful when the trace guarantees that
    /// an earlier frame at this address populated the slot.
    pub fn lookup(&self, addr: u32) -> (&[u8; MAX_INSN_BYTES], u8) {
        let slot = &self.slots[Self::slot(addr)];
        (&slot.bytes, slot.len)
    }

    /// Overwrites the slot for `addr` with `bytes`. Anything past `MAX_INSN_BYTES` is ignored.
    pub fn update(&mut self, addr: u32, bytes: &[u8]) {
        let len = bytes.len().min(MAX_INSN_BYTES);
        let slot = &mut self.slots[Self::slot(addr)];
        slot.bytes[..len].copy_from_slice(&bytes[..len]);
        slot.bytes[len..].fill(0);
        slot.len = len as u8;
    }

    /// Returns true if the slot for `addr` holds exactly `bytes`, length included.
    pub fn matches(&self, addr: u32, bytes: &[u8]) -> bool {
        let (cached, len) = self.lookup(addr);
        len as usize == bytes.len() && &cached[..bytes.len()] == bytes
    }

    pub fn clear(&mut self) {
        self.slots.fill(Slot::default());
    }
}
