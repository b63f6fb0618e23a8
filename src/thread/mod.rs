// Thread module - Per-stream audio workers, per-channel workers and the
// WAIT/DONE rendezvous between them

pub mod audio_worker;
pub mod channel_worker;
pub mod sync;

pub use audio_worker::AudioWorker;
pub use channel_worker::ChannelWorker;
pub use sync::{STATUS_DONE, STATUS_WAIT, SyncPair, WorkerSync};
