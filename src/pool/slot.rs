// Vector slots - Typed scratch buffers guarded by a single atomic flag
//
// A slot's contents may only be touched by the holder of its `SlotGuard`.
// The `locked` flag is the only synchronization: acquire is a CAS
// false → true, release stores false.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Numeric kinds the pool reserves buffers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorKind {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl VectorKind {
    pub const ALL: [VectorKind; 6] = [
        VectorKind::I8,
        VectorKind::I16,
        VectorKind::I32,
        VectorKind::I64,
        VectorKind::F32,
        VectorKind::F64,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position in `ALL`
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            VectorKind::I8 => "i8",
            VectorKind::I16 => "i16",
            VectorKind::I32 => "i32",
            VectorKind::I64 => "i64",
            VectorKind::F32 => "f32",
            VectorKind::F64 => "f64",
        }
    }
}

/// Backing storage of a slot
#[derive(Debug)]
pub enum SlotBuffer {
    I8(Box<[i8]>),
    I16(Box<[i16]>),
    I32(Box<[i32]>),
    I64(Box<[i64]>),
    F32(Box<[f32]>),
    F64(Box<[f64]>),
}

impl SlotBuffer {
    fn zeroed(kind: VectorKind, frames: usize) -> Self {
        match kind {
            VectorKind::I8 => SlotBuffer::I8(vec![0; frames].into_boxed_slice()),
            VectorKind::I16 => SlotBuffer::I16(vec![0; frames].into_boxed_slice()),
            VectorKind::I32 => SlotBuffer::I32(vec![0; frames].into_boxed_slice()),
            VectorKind::I64 => SlotBuffer::I64(vec![0; frames].into_boxed_slice()),
            VectorKind::F32 => SlotBuffer::F32(vec![0.0; frames].into_boxed_slice()),
            VectorKind::F64 => SlotBuffer::F64(vec![0.0; frames].into_boxed_slice()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SlotBuffer::I8(b) => b.len(),
            SlotBuffer::I16(b) => b.len(),
            SlotBuffer::I32(b) => b.len(),
            SlotBuffer::I64(b) => b.len(),
            SlotBuffer::F32(b) => b.len(),
            SlotBuffer::F64(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One pre-allocated buffer
#[derive(Debug)]
pub struct VectorSlot {
    kind: VectorKind,
    locked: AtomicBool,
    buffer: UnsafeCell<SlotBuffer>,
}

// Safety: `buffer` is only reachable through a `SlotGuard`, and at most one
// guard per slot exists because creating one requires winning the CAS on
// `locked`.
unsafe impl Sync for VectorSlot {}

impl VectorSlot {
    pub(crate) fn new(kind: VectorKind, frames: usize) -> Self {
        Self {
            kind,
            locked: AtomicBool::new(false),
            buffer: UnsafeCell::new(SlotBuffer::zeroed(kind, frames)),
        }
    }

    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub(crate) fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Exclusive borrow of a locked slot; dropping it releases the slot
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slot: &'a VectorSlot,
}

impl<'a> SlotGuard<'a> {
    /// Wrap a slot the caller has just locked
    pub(crate) fn new(slot: &'a VectorSlot) -> Self {
        debug_assert!(slot.is_locked());
        Self { slot }
    }

    pub fn kind(&self) -> VectorKind {
        self.slot.kind
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer(&self) -> &SlotBuffer {
        // Safety: this guard holds the slot's lock
        unsafe { &*self.slot.buffer.get() }
    }

    pub fn buffer_mut(&mut self) -> &mut SlotBuffer {
        // Safety: this guard holds the slot's lock and `&mut self` prevents
        // aliasing through the guard
        unsafe { &mut *self.slot.buffer.get() }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self.buffer_mut() {
            SlotBuffer::F32(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_f64_mut(&mut self) -> Option<&mut [f64]> {
        match self.buffer_mut() {
            SlotBuffer::F64(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i16_mut(&mut self) -> Option<&mut [i16]> {
        match self.buffer_mut() {
            SlotBuffer::I16(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i32_mut(&mut self) -> Option<&mut [i32]> {
        match self.buffer_mut() {
            SlotBuffer::I32(b) => Some(b),
            _ => None,
        }
    }

    /// Release explicitly (same as dropping the guard)
    pub fn release(self) {}
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.unlock();
    }
}
