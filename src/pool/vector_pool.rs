// Vector Buffer Pool - Zero-allocation typed scratch buffers for DSP stages
//
// All slots are allocated once by `reserve_all`. Acquire never blocks and
// never allocates: it either wins a free slot or returns `None`, and the
// caller degrades (scalar path, skip the enhancement, retry next tick).

use crate::pool::slot::{SlotGuard, VectorKind, VectorSlot};

/// Fixed set of pre-allocated slots, `count` per kind
#[derive(Debug)]
pub struct VectorBufferPool {
    /// Kind-major: slots of kind `k` live at `k.index() * per_kind ..`
    slots: Vec<VectorSlot>,
    per_kind: usize,
    frames: usize,
}

impl VectorBufferPool {
    /// Allocate `count` slots of `frames` elements for every kind
    pub fn reserve_all(count: usize, frames: usize) -> Self {
        let mut slots = Vec::with_capacity(count * VectorKind::COUNT);
        for kind in VectorKind::ALL {
            for _ in 0..count {
                slots.push(VectorSlot::new(kind, frames));
            }
        }

        log::debug!(
            "Reserved {} vector slots ({} per kind, {} frames)",
            slots.len(),
            count,
            frames
        );

        Self {
            slots,
            per_kind: count,
            frames,
        }
    }

    fn slots_of(&self, kind: VectorKind) -> &[VectorSlot] {
        let start = kind.index() * self.per_kind;
        &self.slots[start..start + self.per_kind]
    }

    /// Lock the first free slot of `kind`
    pub fn try_acquire(&self, kind: VectorKind) -> Option<SlotGuard<'_>> {
        self.slots_of(kind)
            .iter()
            .find(|slot| slot.try_lock())
            .map(SlotGuard::new)
    }

    /// One slot of each kind, or nothing
    pub fn try_acquire_dual(
        &self,
        a: VectorKind,
        b: VectorKind,
    ) -> Option<(SlotGuard<'_>, SlotGuard<'_>)> {
        let [a, b] = self.try_acquire_all([a, b])?;
        Some((a, b))
    }

    /// One slot of each kind, or nothing
    pub fn try_acquire_triple(
        &self,
        a: VectorKind,
        b: VectorKind,
        c: VectorKind,
    ) -> Option<(SlotGuard<'_>, SlotGuard<'_>, SlotGuard<'_>)> {
        let [a, b, c] = self.try_acquire_all([a, b, c])?;
        Some((a, b, c))
    }

    /// All-or-nothing acquire of one slot per requested kind
    ///
    /// Free slots are picked without locking; only when every kind has a
    /// candidate are they locked. If another thread wins one of the
    /// candidates in between, the locks taken by this call are released and
    /// the call fails. No retry.
    pub fn try_acquire_all<const N: usize>(
        &self,
        kinds: [VectorKind; N],
    ) -> Option<[SlotGuard<'_>; N]> {
        let mut picked = [usize::MAX; N];

        for (n, kind) in kinds.iter().enumerate() {
            let base = kind.index() * self.per_kind;
            let free = self
                .slots_of(*kind)
                .iter()
                .enumerate()
                .map(|(i, slot)| (base + i, slot))
                .find(|(index, slot)| !slot.is_locked() && !picked[..n].contains(index))?;
            picked[n] = free.0;
        }

        for n in 0..N {
            if !self.slots[picked[n]].try_lock() {
                for index in &picked[..n] {
                    self.slots[*index].unlock();
                }
                log::trace!("Lost a slot race while acquiring {:?}", kinds);
                return None;
            }
        }

        Some(picked.map(|index| SlotGuard::new(&self.slots[index])))
    }

    /// Give a slot back; contents are left as they are
    pub fn release(&self, guard: SlotGuard<'_>) {
        guard.release();
    }

    /// Slots of `kind` not currently held
    pub fn free_count(&self, kind: VectorKind) -> usize {
        self.slots_of(kind)
            .iter()
            .filter(|slot| !slot.is_locked())
            .count()
    }

    /// Slots reserved per kind
    pub fn capacity(&self) -> usize {
        self.per_kind
    }

    /// Elements per slot
    pub fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_all() {
        let pool = VectorBufferPool::reserve_all(3, 128);

        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.frames(), 128);
        for kind in VectorKind::ALL {
            assert_eq!(pool.free_count(kind), 3);
        }
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = VectorBufferPool::reserve_all(2, 16);

        let a = pool.try_acquire(VectorKind::F32);
        let b = pool.try_acquire(VectorKind::F32);
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(pool.try_acquire(VectorKind::F32).is_none());

        // Other kinds are unaffected
        assert!(pool.try_acquire(VectorKind::I64).is_some());

        drop(a);
        assert_eq!(pool.free_count(VectorKind::F32), 1);
        assert!(pool.try_acquire(VectorKind::F32).is_some());
    }

    #[test]
    fn test_acquired_slot_kind() {
        let pool = VectorBufferPool::reserve_all(1, 16);

        for kind in VectorKind::ALL {
            let guard = pool.try_acquire(kind).unwrap();
            assert_eq!(guard.kind(), kind);
            assert_eq!(guard.len(), 16);
        }
    }

    #[test]
    fn test_dual_is_all_or_nothing() {
        let pool = VectorBufferPool::reserve_all(1, 16);
        let held = pool.try_acquire(VectorKind::F64).unwrap();

        assert!(pool.try_acquire_dual(VectorKind::F32, VectorKind::F64).is_none());
        // Nothing was left locked by the failed call
        assert_eq!(pool.free_count(VectorKind::F32), 1);

        pool.release(held);
        let (a, b) = pool
            .try_acquire_dual(VectorKind::F32, VectorKind::F64)
            .unwrap();
        assert_eq!(a.kind(), VectorKind::F32);
        assert_eq!(b.kind(), VectorKind::F64);
        assert_eq!(pool.free_count(VectorKind::F32), 0);
    }

    #[test]
    fn test_same_kind_twice_needs_two_slots() {
        let pool = VectorBufferPool::reserve_all(1, 16);
        assert!(pool.try_acquire_dual(VectorKind::F32, VectorKind::F32).is_none());
        assert_eq!(pool.free_count(VectorKind::F32), 1);

        let pool = VectorBufferPool::reserve_all(2, 16);
        assert!(pool.try_acquire_dual(VectorKind::F32, VectorKind::F32).is_some());
    }

    #[test]
    fn test_triple() {
        let pool = VectorBufferPool::reserve_all(1, 16);

        let triple = pool.try_acquire_triple(VectorKind::I8, VectorKind::I16, VectorKind::I32);
        assert!(triple.is_some());
        assert!(pool.try_acquire_triple(VectorKind::I8, VectorKind::F32, VectorKind::F64).is_none());
        assert_eq!(pool.free_count(VectorKind::F32), 1);
        assert_eq!(pool.free_count(VectorKind::F64), 1);

        drop(triple);
        assert_eq!(pool.free_count(VectorKind::I8), 1);
    }

    #[test]
    fn test_empty_pool() {
        let pool = VectorBufferPool::reserve_all(0, 16);
        assert!(pool.try_acquire(VectorKind::F32).is_none());
        assert!(pool.try_acquire_dual(VectorKind::F32, VectorKind::I8).is_none());
    }
}
