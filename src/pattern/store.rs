// PatternStore - 3-D step bit matrix (bank0 × bank1 × step)
//
// Every (i, j) cell is a bit-vector of `ceil(length / WORD_BITS)` words, and
// there is one note per step. Out-of-range access never panics: reads return
// `false`/`None` and writes are ignored, since indices come from ports and
// remote commands.

use std::sync::Arc;

use crate::pattern::note::Note;

/// Bits per storage word
pub const WORD_BITS: usize = usize::BITS as usize;

/// Number of words needed to hold `length` bits
#[inline]
fn words_for(length: usize) -> usize {
    length.div_ceil(WORD_BITS)
}

/// Per-channel pattern storage
#[derive(Debug, Clone)]
pub struct PatternStore {
    dim: [usize; 3],
    /// Pad the notes are bound to (`Note::y`)
    pad: usize,
    bits: Vec<Vec<Vec<usize>>>,
    notes: Vec<Arc<Note>>,
}

impl PatternStore {
    /// Create an empty store (all dimensions zero)
    pub fn new(pad: usize) -> Self {
        Self {
            dim: [0; 3],
            pad,
            bits: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Create a store and size it in one go
    pub fn with_dim(pad: usize, dim0: usize, dim1: usize, length: usize) -> Self {
        let mut store = Self::new(pad);
        store.set_dim(dim0, dim1, length);
        store
    }

    /// Current dimensions `[dim0, dim1, length]`
    pub fn dim(&self) -> [usize; 3] {
        self.dim
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Resize the matrix
    ///
    /// Growing keeps every existing word and zero-fills the new ones.
    /// Shrinking truncates, clears the bits above `length` in the last kept
    /// word and drops the tail notes.
    pub fn set_dim(&mut self, dim0: usize, dim1: usize, length: usize) {
        let words = words_for(length);

        self.bits.truncate(dim0);
        self.bits.resize_with(dim0, Vec::new);

        for row in self.bits.iter_mut() {
            row.truncate(dim1);
            row.resize_with(dim1, Vec::new);

            for cell in row.iter_mut() {
                cell.resize(words, 0);

                let tail = length % WORD_BITS;
                if tail != 0 {
                    if let Some(last) = cell.last_mut() {
                        *last &= (1usize << tail) - 1;
                    }
                }
            }
        }

        if length < self.notes.len() {
            self.notes.truncate(length);
        } else {
            let pad = self.pad;
            let start = self.notes.len();
            self.notes
                .extend((start..length).map(|step| Arc::new(Note::for_step(step, pad))));
        }

        self.dim = [dim0, dim1, length];
    }

    #[inline]
    fn in_bounds(&self, i: usize, j: usize, bit: usize) -> bool {
        i < self.dim[0] && j < self.dim[1] && bit < self.dim[2]
    }

    /// Test one step; `false` when out of range
    pub fn get_bit(&self, i: usize, j: usize, bit: usize) -> bool {
        if !self.in_bounds(i, j, bit) {
            return false;
        }

        let mask = 1usize << (bit % WORD_BITS);
        self.bits[i][j][bit / WORD_BITS] & mask != 0
    }

    /// Flip one step; ignored when out of range
    pub fn toggle_bit(&mut self, i: usize, j: usize, bit: usize) {
        if !self.in_bounds(i, j, bit) {
            return;
        }

        let mask = 1usize << (bit % WORD_BITS);
        self.bits[i][j][bit / WORD_BITS] ^= mask;
    }

    /// Set or clear one step; ignored when out of range
    pub fn set_bit(&mut self, i: usize, j: usize, bit: usize, value: bool) {
        if self.get_bit(i, j, bit) != value {
            self.toggle_bit(i, j, bit);
        }
    }

    /// The note of one step
    pub fn note(&self, bit: usize) -> Option<Arc<Note>> {
        self.notes.get(bit).cloned()
    }

    /// True when no step of cell (i, j) is set (out of range counts as empty)
    pub fn is_empty(&self, i: usize, j: usize) -> bool {
        self.bits
            .get(i)
            .and_then(|row| row.get(j))
            .is_none_or(|cell| cell.iter().all(|word| *word == 0))
    }

    /// Raw words of cell (i, j)
    pub fn words(&self, i: usize, j: usize) -> Option<&[usize]> {
        self.bits.get(i)?.get(j).map(|cell| cell.as_slice())
    }

    /// Number of steps set in cell (i, j)
    pub fn count_ones(&self, i: usize, j: usize) -> usize {
        self.words(i, j)
            .map(|cell| cell.iter().map(|w| w.count_ones() as usize).sum())
            .unwrap_or(0)
    }

    /// Clear every bit, keeping dimensions and notes
    pub fn clear(&mut self) {
        for cell in self.bits.iter_mut().flatten() {
            cell.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_empty() {
        let store = PatternStore::new(0);
        assert_eq!(store.dim(), [0, 0, 0]);
        assert!(store.is_empty(0, 0));
        assert!(!store.get_bit(0, 0, 0));
        assert!(store.note(0).is_none());
    }

    #[test]
    fn test_word_count_matches_length() {
        let store = PatternStore::with_dim(0, 2, 3, WORD_BITS + 1);

        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(store.words(i, j).unwrap().len(), 2);
            }
        }
    }

    #[test]
    fn test_toggle_bit() {
        let mut store = PatternStore::with_dim(0, 4, 12, 64);

        store.toggle_bit(1, 2, 17);
        assert!(store.get_bit(1, 2, 17));
        assert!(!store.get_bit(1, 2, 16));
        assert!(!store.get_bit(2, 1, 17));
        assert!(!store.is_empty(1, 2));

        store.toggle_bit(1, 2, 17);
        assert!(!store.get_bit(1, 2, 17));
        assert!(store.is_empty(1, 2));
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let mut store = PatternStore::with_dim(0, 1, 1, 16);

        store.toggle_bit(1, 0, 0);
        store.toggle_bit(0, 1, 0);
        store.toggle_bit(0, 0, 16);

        assert!(store.is_empty(0, 0));
        assert!(!store.get_bit(0, 0, 16));
        assert!(!store.get_bit(5, 5, 5));
    }

    #[test]
    fn test_notes_track_length() {
        let mut store = PatternStore::with_dim(3, 1, 1, 16);
        assert_eq!(store.note(15).unwrap().x0, 15);
        assert_eq!(store.note(15).unwrap().y, 3);
        assert!(store.note(16).is_none());

        let kept = store.note(4).unwrap();
        store.set_dim(1, 1, 8);
        assert!(store.note(8).is_none());

        store.set_dim(1, 1, 32);
        // Surviving notes are the same objects
        assert!(Arc::ptr_eq(&kept, &store.note(4).unwrap()));
        assert_eq!(store.note(31).unwrap().x1, 32);
    }

    #[test]
    fn test_grow_preserves_bits() {
        let mut store = PatternStore::with_dim(0, 2, 2, 16);
        store.toggle_bit(1, 1, 3);
        store.toggle_bit(0, 1, 15);

        store.set_dim(4, 5, 200);

        assert!(store.get_bit(1, 1, 3));
        assert!(store.get_bit(0, 1, 15));
        assert_eq!(store.count_ones(1, 1), 1);
        assert!(store.is_empty(3, 4));
    }

    #[test]
    fn test_shrink_masks_stale_bits() {
        let mut store = PatternStore::with_dim(0, 1, 1, 16);
        store.toggle_bit(0, 0, 12);

        store.set_dim(1, 1, 8);
        assert!(store.is_empty(0, 0));

        store.set_dim(1, 1, 16);
        assert!(!store.get_bit(0, 0, 12));
    }

    #[test]
    fn test_set_bit_and_clear() {
        let mut store = PatternStore::with_dim(0, 1, 1, 8);
        store.set_bit(0, 0, 2, true);
        store.set_bit(0, 0, 2, true);
        assert_eq!(store.count_ones(0, 0), 1);

        store.clear();
        assert!(store.is_empty(0, 0));
        assert_eq!(store.dim(), [1, 1, 8]);
    }
}
