// Sequencer module - Pattern playback driven by the tick counters

pub mod counters;
pub mod ports;
pub mod processor;

pub use counters::{CounterPair, TickCounters};
pub use ports::{PortKey, PortSet};
pub use processor::{
    KeyMode, ProcessorState, SequencePatternProcessor, StreamLayout, StreamView, TriggerObserver,
    Whence,
};
