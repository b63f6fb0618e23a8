// Graph module - Streams, channels and the recall graph they run per tick

pub mod channel;
pub mod recall;
pub mod recalls;
pub mod recycling;
pub mod scope;
pub mod stream;

pub use channel::{Channel, ChannelSide};
pub use recall::{
    Recall, RecallGraph, RecallId, RecallNode, RecyclingContext, Stage, StageContext, StageSet,
    StagingProgram,
};
pub use recalls::{SignalRenderRecall, VolumeRecall, VolumeStats};
pub use recycling::{AudioSignal, Recycling, SignalTemplate};
pub use scope::{ScopeMask, SoundScope};
pub use stream::AudioStream;
