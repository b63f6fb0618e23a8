// Audio stream - Channels of one stream plus its pattern processors
//
// Ownership: the stream exclusively owns its channels' `Arc`s and its
// processors; workers hold extra `Arc`s to the stream and the channels for
// the lifetime of their threads.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::audio::clock::ClockSource;
use crate::audio::parameters::AtomicF32;
use crate::config::StreamConfig;
use crate::graph::channel::{Channel, ChannelSide};
use crate::graph::recall::{RecallId, RecallNode, RecyclingContext};
use crate::graph::recalls::{SignalRenderRecall, VolumeRecall, VolumeStats};
use crate::graph::recycling::SignalTemplate;
use crate::graph::scope::SoundScope;
use crate::sequencer::ports::{PortKey, PortSet};
use crate::sequencer::processor::{
    SequencePatternProcessor, StreamLayout, StreamView, TriggerObserver, Whence,
};

pub struct AudioStream {
    pub id: usize,
    pub name: String,
    layout: StreamLayout,
    buffer_size: usize,
    input: Vec<Arc<Channel>>,
    output: Vec<Arc<Channel>>,
    /// One per audio channel
    processors: Vec<Mutex<SequencePatternProcessor>>,
    ports: Arc<PortSet>,
    /// The stream's own (root context) recall ids
    recall_ids: RwLock<Vec<RecallId>>,
    gain: AtomicF32,
    volume_stats: Vec<Arc<VolumeStats>>,
}

impl AudioStream {
    /// Build a stream with the default recall graph on every channel
    pub fn new(id: usize, config: &StreamConfig, clock: &dyn ClockSource) -> Self {
        let buffer_size = clock.buffer_size() as usize;
        let layout = StreamLayout {
            audio_channels: config.audio_channels.max(1),
            input_pads: config.input_pads,
            output_pads: config.output_pads,
            reverse_mapping: config.reverse_mapping,
            pattern_mode: config.pattern_mode,
        };

        let ports = Arc::new(PortSet::from_clock(clock));
        let (dim0, dim1, length) = config.pattern_dim;
        ports.set(PortKey::Duration, length as f64);
        ports.set(PortKey::LoopEnd, length as f64);

        let gain = AtomicF32::new(1.0);
        let mut volume_stats = Vec::new();

        let mut make_channel = |index: usize, side: ChannelSide, pad: usize, audio_channel: usize| {
            let channel = Channel::new(index, side, pad, audio_channel, 1, buffer_size);
            let volume = VolumeRecall::new(gain.clone());
            volume_stats.push(volume.stats());
            channel.add_recall(RecallNode::new(SignalRenderRecall::new()));
            channel.add_recall(RecallNode::new(volume));
            channel.set_super_threaded(config.super_threaded);
            Arc::new(channel)
        };

        let mut index = 0;
        let mut input = Vec::with_capacity(layout.input_pads * layout.audio_channels);
        for pad in 0..layout.input_pads {
            for audio_channel in 0..layout.audio_channels {
                let channel = make_channel(index, ChannelSide::Input, pad, audio_channel);
                channel.pattern_mut().set_dim(dim0, dim1, length);
                input.push(channel);
                index += 1;
            }
        }

        let mut output = Vec::with_capacity(layout.output_pads * layout.audio_channels);
        for pad in 0..layout.output_pads {
            for audio_channel in 0..layout.audio_channels {
                output.push(make_channel(index, ChannelSide::Output, pad, audio_channel));
                index += 1;
            }
        }

        let processors = (0..layout.audio_channels)
            .map(|audio_channel| {
                Mutex::new(SequencePatternProcessor::new(
                    audio_channel,
                    Some(ports.clone()),
                ))
            })
            .collect();

        Self {
            id,
            name: config.name.clone(),
            layout,
            buffer_size,
            input,
            output,
            processors,
            ports,
            recall_ids: RwLock::new(Vec::new()),
            gain,
            volume_stats,
        }
    }

    pub fn layout(&self) -> StreamLayout {
        self.layout
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn input(&self) -> &[Arc<Channel>] {
        &self.input
    }

    pub fn output(&self) -> &[Arc<Channel>] {
        &self.output
    }

    /// Input channels, then output channels
    pub fn channels(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.input.iter().chain(self.output.iter())
    }

    pub fn channel_count(&self) -> usize {
        self.input.len() + self.output.len()
    }

    /// Input channel of (pad, audio channel)
    pub fn input_channel(&self, pad: usize, audio_channel: usize) -> Option<&Arc<Channel>> {
        if audio_channel >= self.layout.audio_channels {
            return None;
        }
        self.input
            .get(audio_channel + pad * self.layout.audio_channels)
    }

    pub fn ports(&self) -> &Arc<PortSet> {
        &self.ports
    }

    pub fn gain(&self) -> &AtomicF32 {
        &self.gain
    }

    pub fn volume_stats(&self) -> &[Arc<VolumeStats>] {
        &self.volume_stats
    }

    pub fn view(&self) -> StreamView<'_> {
        StreamView {
            layout: self.layout,
            input: &self.input,
            buffer_size: self.buffer_size,
        }
    }

    pub fn processor(&self, audio_channel: usize) -> Option<&Mutex<SequencePatternProcessor>> {
        self.processors.get(audio_channel)
    }

    pub fn processors(&self) -> &[Mutex<SequencePatternProcessor>] {
        &self.processors
    }

    pub fn set_template(&self, template: SignalTemplate) {
        for processor in &self.processors {
            processor.lock().set_template(template.clone());
        }
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn TriggerObserver>>) {
        for processor in &self.processors {
            processor.lock().set_observer(observer.clone());
        }
    }

    pub fn has_scope(&self, scope: SoundScope) -> bool {
        self.recall_ids.read().iter().any(|id| id.scope == scope)
    }

    /// Begin playing `scope`
    ///
    /// Creates the stream's root context and one child context per channel,
    /// and for the sequencer scope binds and initializes the processors.
    /// Playing a scope that already plays restarts it.
    pub fn start_scope(&self, scope: SoundScope) {
        self.stop_scope(scope);

        let root = RecyclingContext::root();
        let recall_id = RecallId::new(scope, root.clone());

        for channel in self.channels() {
            channel.add_recall_id(RecallId::new(scope, RecyclingContext::child(&root)));
        }

        if scope == SoundScope::Sequencer {
            for processor in &self.processors {
                let mut processor = processor.lock();
                processor.set_recall_id(Some(recall_id.clone()));
                processor.run_init_pre();
            }
        }

        self.recall_ids.write().push(recall_id);
        log::info!("Stream '{}' playing {}", self.name, scope.name());
    }

    /// Stop playing `scope`; channels drop its recall ids and signals
    pub fn stop_scope(&self, scope: SoundScope) {
        let removed = {
            let mut ids = self.recall_ids.write();
            let before = ids.len();
            ids.retain(|id| id.scope != scope);
            before != ids.len()
        };

        if !removed {
            return;
        }

        let mut dropped = 0;
        for channel in self.channels() {
            channel.remove_recall_ids(scope);
            dropped += channel.clear_scope_signals(scope);
        }

        if scope == SoundScope::Sequencer {
            for processor in &self.processors {
                processor.lock().set_recall_id(None);
            }
        }

        log::info!(
            "Stream '{}' stopped {} ({} signals dropped)",
            self.name,
            scope.name(),
            dropped
        );
    }

    /// Commit and PLAY on every processor
    pub fn sequencer_run_inter(&self, clock: &dyn ClockSource) {
        let view = self.view();
        for processor in &self.processors {
            let mut processor = processor.lock();
            if processor.recall_id().is_some() {
                processor.run_inter(&view, clock);
            }
        }
    }

    /// Produce every processor's next counters
    pub fn sequencer_counter_change(&self) {
        for processor in &self.processors {
            let mut processor = processor.lock();
            if processor.recall_id().is_some() {
                processor.counter_change();
            }
        }
    }

    pub fn seek(&self, offset: i64, whence: Whence) {
        for processor in &self.processors {
            processor.lock().seek(offset, whence);
        }
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("channels", &self.channel_count())
            .finish()
    }
}
