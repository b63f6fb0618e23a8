// Pattern module - Step bit matrix and its notes

pub mod note;
pub mod store;

pub use note::{Note, NoteId};
pub use store::{PatternStore, WORD_BITS};
