// Recycling - Audio signal storage of a channel
//
// Key-on only appends signals here. They are rendered into the per-scope mix
// buffer over the following ticks and dropped once exhausted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::recall::RecallId;
use crate::graph::scope::SoundScope;
use crate::pattern::Note;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Source waveform and default length of triggered signals
#[derive(Debug, Clone)]
pub struct SignalTemplate {
    /// Frames a signal lasts in pattern mode
    pub default_length: usize,
    pub waveform: Arc<[f32]>,
}

impl SignalTemplate {
    pub fn new(default_length: usize, waveform: Vec<f32>) -> Self {
        Self {
            default_length,
            waveform: waveform.into(),
        }
    }

    /// Exponentially decaying click, `length` frames long
    pub fn decaying(length: usize) -> Self {
        let decay = 5.0 / length.max(1) as f32;
        let waveform = (0..length.max(1))
            .map(|i| (-(i as f32) * decay).exp())
            .collect::<Vec<_>>();
        Self::new(length, waveform)
    }
}

impl Default for SignalTemplate {
    fn default() -> Self {
        Self::decaying(2048)
    }
}

/// One triggered sound
#[derive(Debug, Clone)]
pub struct AudioSignal {
    pub id: u64,
    pub recall_id: RecallId,
    pub note: Option<Arc<Note>>,
    pub frame_count: usize,
    /// Frames already rendered
    pub position: usize,
    pub gain: f32,
    waveform: Arc<[f32]>,
}

impl AudioSignal {
    pub fn from_template(
        template: &SignalTemplate,
        recall_id: RecallId,
        note: Option<Arc<Note>>,
        frame_count: usize,
        gain: f32,
    ) -> Self {
        Self {
            id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
            recall_id,
            note,
            frame_count,
            position: 0,
            gain,
            waveform: template.waveform.clone(),
        }
    }

    pub fn scope(&self) -> SoundScope {
        self.recall_id.scope
    }

    pub fn remaining(&self) -> usize {
        self.frame_count.saturating_sub(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }

    /// Add up to `out.len()` frames into `out` and advance
    pub fn render_into(&mut self, out: &mut [f32]) -> usize {
        let frames = out.len().min(self.remaining());
        if self.waveform.is_empty() {
            self.position += frames;
            return frames;
        }

        let len = self.waveform.len();
        for (i, sample) in out[..frames].iter_mut().enumerate() {
            let source = (self.position + i) % len;
            *sample += self.waveform[source] * self.gain;
        }
        self.position += frames;
        frames
    }
}

/// Smallest unit of signal storage
#[derive(Debug)]
pub struct Recycling {
    pub id: usize,
    signals: Vec<AudioSignal>,
    /// One mix buffer per scope, `buffer_size` frames each
    mix: Vec<Vec<f32>>,
}

impl Recycling {
    pub fn new(id: usize, buffer_size: usize) -> Self {
        Self {
            id,
            signals: Vec::new(),
            mix: vec![vec![0.0; buffer_size]; SoundScope::COUNT],
        }
    }

    pub fn add_signal(&mut self, signal: AudioSignal) {
        self.signals.push(signal);
    }

    pub fn signals(&self) -> &[AudioSignal] {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut [AudioSignal] {
        &mut self.signals
    }

    /// Signals of one scope, with the scope's mix buffer
    pub fn split_scope(&mut self, scope: SoundScope) -> (impl Iterator<Item = &mut AudioSignal>, &mut [f32]) {
        let signals = self
            .signals
            .iter_mut()
            .filter(move |signal| signal.scope() == scope);
        (signals, &mut self.mix[scope.index()])
    }

    pub fn mix(&self, scope: SoundScope) -> &[f32] {
        &self.mix[scope.index()]
    }

    pub fn mix_mut(&mut self, scope: SoundScope) -> &mut [f32] {
        &mut self.mix[scope.index()]
    }

    pub fn clear_mix(&mut self, scope: SoundScope) {
        self.mix[scope.index()].fill(0.0);
    }

    /// Drop exhausted signals of a scope; returns how many were removed
    pub fn remove_finished(&mut self, scope: SoundScope) -> usize {
        let before = self.signals.len();
        self.signals
            .retain(|signal| signal.scope() != scope || !signal.is_finished());
        before - self.signals.len()
    }

    /// Drop every signal of a scope and silence its mix; returns how many
    /// were removed
    pub fn remove_scope(&mut self, scope: SoundScope) -> usize {
        let before = self.signals.len();
        self.signals.retain(|signal| signal.scope() != scope);
        self.clear_mix(scope);
        before - self.signals.len()
    }

    pub fn has_signal(&self, id: u64) -> bool {
        self.signals.iter().any(|signal| signal.id == id)
    }
}
