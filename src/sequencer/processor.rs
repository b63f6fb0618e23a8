// SequencePatternProcessor - Tick counter state machine driving key-on
//
// One processor per audio channel of a stream. Per tick:
//   run_inter      commit shadow → live, PLAY when the delay phase is 0
//   (pipeline)     channels render
//   counter_change produce the next shadow pair
//
// PLAY reads the live pair only, counter advance writes the shadow pair only,
// so nothing observes a value advanced during the same tick.

use std::sync::Arc;

use crate::audio::clock::ClockSource;
use crate::graph::channel::Channel;
use crate::graph::recall::RecallId;
use crate::graph::recycling::{AudioSignal, SignalTemplate};
use crate::pattern::Note;
use crate::sequencer::counters::TickCounters;
use crate::sequencer::ports::{
    DEFAULT_DURATION, DEFAULT_LOOP_END, DEFAULT_LOOP_START, PortSet,
};

/// Upper bound for a hardware-reported delay counter
pub const MAX_HARDWARE_DELAY: f64 = u32::MAX as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Init,
    Active,
    /// Terminal, reached only with looping disabled
    Done,
}

/// Reference point of `seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// What a key-on is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Play,
    /// Signals are also remembered as recorded material
    Record,
    /// Signals are also remembered as live feed
    Feed,
}

/// Layout facts key-on needs from the owning stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    pub audio_channels: usize,
    pub input_pads: usize,
    pub output_pads: usize,
    /// Pad `y` plays input pad `pads - y - 1`
    pub reverse_mapping: bool,
    /// Signals last `template.default_length` frames instead of the note length
    pub pattern_mode: bool,
}

/// Borrowed view of a stream, handed to the processor each tick
pub struct StreamView<'a> {
    pub layout: StreamLayout,
    pub input: &'a [Arc<Channel>],
    pub buffer_size: usize,
}

/// Notified from the tick thread; implementations must not block
pub trait TriggerObserver: Send + Sync {
    /// A step with a set bit was reached
    fn on_play(&self, _audio_channel: usize, _offset: u64) {}

    /// `signals` signal chains were created for `note`
    fn on_key_on(&self, _audio_channel: usize, _note: &Note, _signals: usize) {}
}

pub struct SequencePatternProcessor {
    audio_channel: usize,
    state: ProcessorState,
    counters: TickCounters,
    ports: Option<Arc<PortSet>>,
    recall_id: Option<RecallId>,
    template: SignalTemplate,
    /// Signal ids created in `KeyMode::Record`
    recording: Vec<u64>,
    /// Signal ids created in `KeyMode::Feed`
    feeding: Vec<u64>,
    observer: Option<Arc<dyn TriggerObserver>>,
}

impl SequencePatternProcessor {
    pub fn new(audio_channel: usize, ports: Option<Arc<PortSet>>) -> Self {
        Self {
            audio_channel,
            state: ProcessorState::Init,
            counters: TickCounters::new(),
            ports,
            recall_id: None,
            template: SignalTemplate::default(),
            recording: Vec::new(),
            feeding: Vec::new(),
            observer: None,
        }
    }

    pub fn audio_channel(&self) -> usize {
        self.audio_channel
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    /// Live step
    pub fn offset_counter(&self) -> u64 {
        self.counters.live().offset_counter
    }

    pub fn delay_counter(&self) -> u64 {
        self.counters.live().delay_counter
    }

    /// Step the next tick will play
    pub fn current_offset_counter(&self) -> u64 {
        self.counters.shadow().offset_counter
    }

    pub fn current_delay_counter(&self) -> u64 {
        self.counters.shadow().delay_counter
    }

    pub fn set_ports(&mut self, ports: Option<Arc<PortSet>>) {
        self.ports = ports;
    }

    pub fn set_recall_id(&mut self, recall_id: Option<RecallId>) {
        self.recall_id = recall_id;
    }

    pub fn recall_id(&self) -> Option<&RecallId> {
        self.recall_id.as_ref()
    }

    pub fn set_template(&mut self, template: SignalTemplate) {
        self.template = template;
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn TriggerObserver>>) {
        self.observer = observer;
    }

    pub fn recording(&self) -> &[u64] {
        &self.recording
    }

    pub fn feeding(&self) -> &[u64] {
        &self.feeding
    }

    /// Forget remembered record/feed signals
    pub fn clear_key_lists(&mut self) {
        self.recording.clear();
        self.feeding.clear();
    }

    fn delay(&self) -> f64 {
        self.ports
            .as_ref()
            .map_or_else(crate::audio::clock::default_delay, |p| p.delay())
    }

    fn duration(&self) -> u64 {
        self.ports.as_ref().map_or(DEFAULT_DURATION, |p| p.duration())
    }

    fn loop_settings(&self) -> (bool, u64, u64) {
        match &self.ports {
            Some(p) => (p.loop_enabled(), p.loop_start(), p.loop_end()),
            None => (false, DEFAULT_LOOP_START, DEFAULT_LOOP_END),
        }
    }

    fn bank_indices(&self) -> (usize, usize) {
        self.ports.as_ref().map_or((0, 0), |p| p.bank_indices())
    }

    /// Zero every counter and become active
    pub fn run_init_pre(&mut self) {
        self.counters.reset();
        self.state = ProcessorState::Active;
        log::debug!("Pattern processor {} initialized", self.audio_channel);
    }

    /// Tick entry: commit, then PLAY at a step boundary
    ///
    /// A hardware-reported delay counter replaces the internal phase.
    pub fn run_inter(&mut self, view: &StreamView<'_>, clock: &dyn ClockSource) {
        self.counters.commit();

        if let Some(hardware) = clock.delay_counter() {
            self.counters
                .override_delay(hardware.clamp(0.0, MAX_HARDWARE_DELAY).floor() as u64);
        }

        if self.state == ProcessorState::Active && self.counters.live().delay_counter == 0 {
            self.play(view);
        }
    }

    /// Trigger every set step at the live offset on this audio channel
    ///
    /// Returns the number of notes keyed on.
    pub fn play(&mut self, view: &StreamView<'_>) -> usize {
        let (bank0, bank1) = self.bank_indices();
        let offset = self.counters.live().offset_counter;
        let step = offset as usize;
        let audio_channel = self.audio_channel;
        let mut played = 0;

        for channel in view
            .input
            .iter()
            .filter(|channel| channel.audio_channel == audio_channel)
        {
            let note = {
                let pattern = channel.pattern();
                if pattern.is_empty(bank0, bank1) || !pattern.get_bit(bank0, bank1, step) {
                    continue;
                }
                pattern.note(step)
            };

            let Some(note) = note else {
                continue;
            };

            if let Some(observer) = &self.observer {
                observer.on_play(audio_channel, offset);
            }

            self.key_on(view, &note, 127, KeyMode::Play);
            played += 1;
        }

        played
    }

    /// Create one signal chain per recycling of the note's input channel
    ///
    /// The channel is `audio_channel + pad * audio_channels` where `pad` is
    /// `note.y` (or `pads - y - 1` with reverse mapping). Signals bind to the
    /// channel's recall id whose context is a child of this processor's.
    /// Returns the number of signals created; 0 when there is nothing to bind
    /// to.
    pub fn key_on(
        &mut self,
        view: &StreamView<'_>,
        note: &Arc<Note>,
        velocity: u8,
        mode: KeyMode,
    ) -> usize {
        let layout = view.layout;
        let y = note.y as usize;
        if y >= layout.input_pads {
            return 0;
        }

        let pad = if layout.reverse_mapping {
            layout.input_pads - y - 1
        } else {
            y
        };

        let Some(channel) = view.input.get(self.audio_channel + pad * layout.audio_channels) else {
            return 0;
        };

        let Some(recall_id) = self.recall_id.as_ref() else {
            log::trace!("Key-on without recall id on audio channel {}", self.audio_channel);
            return 0;
        };

        let Some(child_id) = channel.child_recall_id(&recall_id.context) else {
            log::trace!(
                "Channel {} has no child recall id, key-on skipped",
                channel.index
            );
            return 0;
        };

        let frame_count = if layout.pattern_mode {
            self.template.default_length
        } else {
            (view.buffer_size as f64 * self.delay() * note.length() as f64) as usize
        };
        let gain = velocity.min(127) as f32 / 127.0;

        let mut created = 0;
        {
            let mut recyclings = channel.recyclings();
            for recycling in recyclings.iter_mut() {
                let signal = AudioSignal::from_template(
                    &self.template,
                    child_id.clone(),
                    Some(note.clone()),
                    frame_count,
                    gain,
                );

                match mode {
                    KeyMode::Play => {}
                    KeyMode::Record => self.recording.push(signal.id),
                    KeyMode::Feed => self.feeding.push(signal.id),
                }

                recycling.add_signal(signal);
                created += 1;
            }
        }

        if let Some(observer) = &self.observer {
            observer.on_key_on(self.audio_channel, note, created);
        }

        created
    }

    /// Advance the shadow counters by one tick
    pub fn counter_change(&mut self) {
        let delay = self.delay();
        let (looping, loop_start, loop_end) = self.loop_settings();
        let done = self.state == ProcessorState::Done;

        let shadow = self.counters.shadow_mut();
        if shadow.delay_counter.saturating_add(1) as f64 >= delay {
            shadow.delay_counter = 0;

            if looping && shadow.offset_counter.saturating_add(1) >= loop_end {
                shadow.offset_counter = loop_start;
            } else if !done {
                shadow.offset_counter = shadow.offset_counter.saturating_add(1);

                if !looping && shadow.offset_counter >= loop_end {
                    self.state = ProcessorState::Done;
                    log::debug!("Pattern processor {} done", self.audio_channel);
                }
            }
        } else {
            shadow.delay_counter = shadow.delay_counter.saturating_add(1);
        }
    }

    /// Move to a step, at phase 0
    ///
    /// The result is taken modulo `duration`; negative results wrap. A
    /// finished processor becomes active again.
    pub fn seek(&mut self, offset: i64, whence: Whence) {
        let duration = self.duration().clamp(1, i64::MAX as u64) as i64;
        let offset = offset.rem_euclid(duration);

        // Both terms are below `duration`, the sum cannot overflow. `End`
        // is `duration + offset`, the same step as `offset`.
        let target = match whence {
            Whence::Set | Whence::End => offset,
            Whence::Cur => {
                (self.counters.shadow().offset_counter % duration as u64) as i64 + offset
            }
        }
        .rem_euclid(duration);

        self.counters.jump(target as u64);
        if self.state == ProcessorState::Done {
            self.state = ProcessorState::Active;
        }

        log::debug!(
            "Pattern processor {} seek to {}",
            self.audio_channel,
            target
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::SoundcardClock;
    use crate::graph::channel::ChannelSide;
    use crate::graph::recall::RecyclingContext;
    use crate::graph::scope::SoundScope;
    use crate::sequencer::ports::PortKey;

    fn ports(delay: f64, looping: bool, start: u64, end: u64) -> Arc<PortSet> {
        let ports = PortSet::with_defaults();
        ports.set(PortKey::Delay, delay);
        ports.set_loop(looping, start, end);
        Arc::new(ports)
    }

    fn layout(pads: usize) -> StreamLayout {
        StreamLayout {
            audio_channels: 1,
            input_pads: pads,
            output_pads: 1,
            reverse_mapping: false,
            pattern_mode: true,
        }
    }

    /// One input channel per pad, each with a child recall id of `parent`
    fn channels(pads: usize, parent: &Arc<RecyclingContext>) -> Vec<Arc<Channel>> {
        (0..pads)
            .map(|pad| {
                let channel = Channel::new(pad, ChannelSide::Input, pad, 0, 1, 64);
                channel.pattern_mut().set_dim(1, 1, 16);
                channel.add_recall_id(RecallId::new(
                    SoundScope::Sequencer,
                    RecyclingContext::child(parent),
                ));
                Arc::new(channel)
            })
            .collect()
    }

    #[test]
    fn test_init_state() {
        let mut processor = SequencePatternProcessor::new(0, None);
        assert_eq!(processor.state(), ProcessorState::Init);

        processor.run_init_pre();
        assert_eq!(processor.state(), ProcessorState::Active);
        assert_eq!(processor.counters(), TickCounters::new());
    }

    #[test]
    fn test_counter_change_reaches_done() {
        let mut processor = SequencePatternProcessor::new(0, Some(ports(4.0, false, 0, 8)));
        processor.run_init_pre();

        for _ in 0..31 {
            processor.counter_change();
        }
        assert_eq!(processor.current_offset_counter(), 7);
        assert_eq!(processor.state(), ProcessorState::Active);

        processor.counter_change();
        assert_eq!(processor.current_offset_counter(), 8);
        assert_eq!(processor.state(), ProcessorState::Done);

        // Done is terminal: the offset stays
        for _ in 0..16 {
            processor.counter_change();
        }
        assert_eq!(processor.current_offset_counter(), 8);
        assert_eq!(processor.state(), ProcessorState::Done);
    }

    #[test]
    fn test_counter_change_loops() {
        let mut processor = SequencePatternProcessor::new(0, Some(ports(1.0, true, 2, 6)));
        processor.run_init_pre();

        let mut entered = false;
        for _ in 0..10 {
            processor.counter_change();
            let offset = processor.current_offset_counter();
            if entered {
                assert!((2..=5).contains(&offset));
            }
            entered |= offset >= 2;
        }

        assert!((2..=5).contains(&processor.current_offset_counter()));
        assert_eq!(processor.state(), ProcessorState::Active);
    }

    #[test]
    fn test_live_counters_lag_one_tick() {
        let parent = RecyclingContext::root();
        let input = channels(1, &parent);
        let view = StreamView {
            layout: layout(1),
            input: &input,
            buffer_size: 64,
        };
        let clock = SoundcardClock::default();

        let mut processor = SequencePatternProcessor::new(0, Some(ports(1.0, false, 0, 16)));
        processor.run_init_pre();

        processor.run_inter(&view, &clock);
        processor.counter_change();
        assert_eq!(processor.offset_counter(), 0);
        assert_eq!(processor.current_offset_counter(), 1);

        processor.run_inter(&view, &clock);
        assert_eq!(processor.offset_counter(), 1);
    }

    #[test]
    fn test_zero_delay_uses_default() {
        let ports = ports(0.0, false, 0, 64);
        let mut processor = SequencePatternProcessor::new(0, Some(ports));
        processor.run_init_pre();

        // Default delay is ~10.77: ten ticks do not reach the next step
        for _ in 0..10 {
            processor.counter_change();
        }
        assert_eq!(processor.current_offset_counter(), 0);
        processor.counter_change();
        assert_eq!(processor.current_offset_counter(), 1);
    }

    #[test]
    fn test_seek() {
        let ports = ports(4.0, false, 0, 16);
        ports.set(PortKey::Duration, 16.0);

        let mut a = SequencePatternProcessor::new(0, Some(ports.clone()));
        let mut b = SequencePatternProcessor::new(0, Some(ports));
        a.run_init_pre();
        b.run_init_pre();
        a.counter_change();

        a.seek(0, Whence::Set);
        a.seek(3, Whence::Cur);
        b.seek(3, Whence::Set);
        assert_eq!(a.counters(), b.counters());
        assert_eq!(a.current_delay_counter(), 0);
        assert_eq!(a.offset_counter(), 3);

        a.seek(-5, Whence::Cur);
        assert_eq!(a.current_offset_counter(), 14);

        a.seek(-1, Whence::End);
        assert_eq!(a.current_offset_counter(), 15);

        a.seek(35, Whence::Set);
        assert_eq!(a.current_offset_counter(), 3);
    }

    #[test]
    fn test_seek_extreme_offsets_wrap() {
        let ports = ports(4.0, false, 0, 16);
        ports.set(PortKey::Duration, 16.0);
        let mut processor = SequencePatternProcessor::new(0, Some(ports));
        processor.run_init_pre();

        processor.seek(i64::MAX, Whence::Set);
        assert_eq!(processor.current_offset_counter(), 15);
        processor.seek(i64::MAX, Whence::Cur);
        assert_eq!(processor.current_offset_counter(), 14);
        processor.seek(i64::MIN, Whence::End);
        assert_eq!(processor.current_offset_counter(), 0);
        processor.seek(i64::MIN, Whence::Cur);
        assert_eq!(processor.current_offset_counter(), 0);
    }

    #[test]
    fn test_huge_hardware_delay_counter_is_clamped() {
        let parent = RecyclingContext::root();
        let input = channels(1, &parent);
        let view = StreamView {
            layout: layout(1),
            input: &input,
            buffer_size: 64,
        };
        let clock = SoundcardClock::default();
        clock.report_delay_counter(Some(f64::MAX));

        let mut processor = SequencePatternProcessor::new(0, Some(ports(4.0, false, 0, 16)));
        processor.run_init_pre();
        processor.run_inter(&view, &clock);
        assert_eq!(processor.delay_counter(), MAX_HARDWARE_DELAY as u64);

        // Past the delay: next step, phase 0
        processor.counter_change();
        assert_eq!(processor.current_delay_counter(), 0);
        assert_eq!(processor.current_offset_counter(), 1);
    }

    #[test]
    fn test_seek_revives_done() {
        let mut processor = SequencePatternProcessor::new(0, Some(ports(1.0, false, 0, 2)));
        processor.run_init_pre();
        processor.counter_change();
        processor.counter_change();
        assert_eq!(processor.state(), ProcessorState::Done);

        processor.seek(0, Whence::Set);
        assert_eq!(processor.state(), ProcessorState::Active);
    }

    #[test]
    fn test_play_keys_on_set_steps() {
        let parent = RecyclingContext::root();
        let input = channels(2, &parent);
        input[1].pattern_mut().toggle_bit(0, 0, 0);

        let view = StreamView {
            layout: layout(2),
            input: &input,
            buffer_size: 64,
        };
        let clock = SoundcardClock::default();

        let mut processor = SequencePatternProcessor::new(0, Some(ports(1.0, false, 0, 16)));
        processor.set_recall_id(Some(RecallId::new(SoundScope::Sequencer, parent)));
        processor.run_init_pre();
        processor.run_inter(&view, &clock);

        assert!(input[0].recyclings()[0].signals().is_empty());
        let recyclings = input[1].recyclings();
        let signal = &recyclings[0].signals()[0];
        assert_eq!(signal.note.as_ref().unwrap().x0, 0);
        assert_eq!(signal.frame_count, SignalTemplate::default().default_length);
    }

    #[test]
    fn test_no_play_between_steps() {
        let parent = RecyclingContext::root();
        let input = channels(1, &parent);
        input[0].pattern_mut().toggle_bit(0, 0, 0);
        input[0].pattern_mut().toggle_bit(0, 0, 1);
        let view = StreamView {
            layout: layout(1),
            input: &input,
            buffer_size: 64,
        };
        let clock = SoundcardClock::default();

        let mut processor = SequencePatternProcessor::new(0, Some(ports(2.0, false, 0, 16)));
        processor.set_recall_id(Some(RecallId::new(SoundScope::Sequencer, parent)));
        processor.run_init_pre();

        // delay 2: plays on ticks 0 and 2 only
        for _ in 0..3 {
            processor.run_inter(&view, &clock);
            processor.counter_change();
        }
        assert_eq!(input[0].recyclings()[0].signals().len(), 2);
    }

    #[test]
    fn test_hardware_delay_counter_overrides() {
        let parent = RecyclingContext::root();
        let input = channels(1, &parent);
        input[0].pattern_mut().toggle_bit(0, 0, 0);
        let view = StreamView {
            layout: layout(1),
            input: &input,
            buffer_size: 64,
        };
        let clock = SoundcardClock::default();
        clock.report_delay_counter(Some(2.0));

        let mut processor = SequencePatternProcessor::new(0, Some(ports(4.0, false, 0, 16)));
        processor.set_recall_id(Some(RecallId::new(SoundScope::Sequencer, parent)));
        processor.run_init_pre();
        processor.run_inter(&view, &clock);

        assert_eq!(processor.delay_counter(), 2);
        assert!(input[0].recyclings()[0].signals().is_empty());
    }

    #[test]
    fn test_key_on_modes_and_mapping() {
        let parent = RecyclingContext::root();
        let input = channels(4, &parent);
        let mut reversed = layout(4);
        reversed.reverse_mapping = true;
        reversed.pattern_mode = false;
        let view = StreamView {
            layout: reversed,
            input: &input,
            buffer_size: 64,
        };

        let mut processor = SequencePatternProcessor::new(0, Some(ports(2.0, false, 0, 16)));
        processor.set_recall_id(Some(RecallId::new(SoundScope::Sequencer, parent)));

        let note = Arc::new(Note::new(0, 3, 1));
        assert_eq!(processor.key_on(&view, &note, 127, KeyMode::Record), 1);
        // y = 1 with 4 pads lands on pad 2
        let recyclings = input[2].recyclings();
        assert_eq!(recyclings[0].signals().len(), 1);
        // buffer_size * delay * (x1 - x0)
        assert_eq!(recyclings[0].signals()[0].frame_count, 64 * 2 * 3);
        assert_eq!(processor.recording(), &[recyclings[0].signals()[0].id]);
        drop(recyclings);

        assert_eq!(processor.key_on(&view, &note, 64, KeyMode::Feed), 1);
        assert_eq!(processor.feeding().len(), 1);

        // Out-of-range pad
        let far = Arc::new(Note::new(0, 1, 9));
        assert_eq!(processor.key_on(&view, &far, 127, KeyMode::Play), 0);
    }

    #[test]
    fn test_key_on_without_child_recall_id() {
        let parent = RecyclingContext::root();
        let input = channels(1, &parent);
        let view = StreamView {
            layout: layout(1),
            input: &input,
            buffer_size: 64,
        };

        let mut processor = SequencePatternProcessor::new(0, None);
        let note = Arc::new(Note::for_step(0, 0));
        assert_eq!(processor.key_on(&view, &note, 127, KeyMode::Play), 0);

        processor.set_recall_id(Some(RecallId::new(
            SoundScope::Sequencer,
            RecyclingContext::root(),
        )));
        assert_eq!(processor.key_on(&view, &note, 127, KeyMode::Play), 0);
    }
}
