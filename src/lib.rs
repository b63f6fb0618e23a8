// Tickweave - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod messaging;
pub mod pattern;
pub mod pool;
pub mod sequencer;
pub mod thread;

pub use audio::clock::{ClockSource, SoundcardClock};
pub use config::{ConfigError, EngineConfig, StreamConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use graph::{AudioStream, Channel, SoundScope, Stage, StagingProgram};
pub use messaging::{Command, Notification};
pub use pattern::{Note, PatternStore};
pub use pool::{VectorBufferPool, VectorKind};
pub use sequencer::{KeyMode, PortKey, SequencePatternProcessor, Whence};
pub use thread::{AudioWorker, ChannelWorker};
