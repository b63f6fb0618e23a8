// Note - One step of a pattern, bound to a pad
//
// Notes are created and destroyed by `PatternStore::set_dim` only. Everything
// else (processors, triggered signals) holds them through `Arc<Note>`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for notes
pub type NoteId = u64;

/// Global note ID generator (atomic for thread-safety)
static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique note ID
pub fn generate_note_id() -> NoteId {
    NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A pattern step
///
/// `x0`/`x1` are step positions (start inclusive, end exclusive), `y` is the
/// pad the owning store was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub x0: u64,
    pub x1: u64,
    pub y: u64,
}

impl Note {
    pub fn new(x0: u64, x1: u64, y: u64) -> Self {
        Self {
            id: generate_note_id(),
            x0,
            x1: x1.max(x0),
            y,
        }
    }

    /// Note covering exactly one step
    pub fn for_step(step: usize, pad: usize) -> Self {
        Self::new(step as u64, step as u64 + 1, pad as u64)
    }

    /// Length in steps
    pub fn length(&self) -> u64 {
        self.x1 - self.x0
    }
}
