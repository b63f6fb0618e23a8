// Built-in recalls - Signal rendering and pool-backed volume

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::dsp_utils::{OnePoleSmoother, apply_gain_scalar};
use crate::audio::parameters::AtomicF32;
use crate::audio::simd::{apply_gain_simd, energy};
use crate::graph::recall::{Recall, StageContext};
use crate::pool::VectorKind;

/// Renders the signals of the running scope into the recycling mix
///
/// feed-input-queue clears the mix, run-inter renders one buffer of every
/// signal, run-post drops exhausted signals.
#[derive(Debug, Default)]
pub struct SignalRenderRecall {
    rendered_frames: u64,
}

impl SignalRenderRecall {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Recall for SignalRenderRecall {
    fn name(&self) -> &str {
        "signal-render"
    }

    fn feed_input_queue(&mut self, ctx: &mut StageContext<'_>) {
        for recycling in ctx.recyclings.iter_mut() {
            recycling.clear_mix(ctx.scope);
        }
    }

    fn run_inter(&mut self, ctx: &mut StageContext<'_>) {
        for recycling in ctx.recyclings.iter_mut() {
            let (signals, mix) = recycling.split_scope(ctx.scope);
            let frames = ctx.buffer_size.min(mix.len());

            for signal in signals {
                self.rendered_frames += signal.render_into(&mut mix[..frames]) as u64;
            }
        }
    }

    fn run_post(&mut self, ctx: &mut StageContext<'_>) {
        for recycling in ctx.recyclings.iter_mut() {
            let removed = recycling.remove_finished(ctx.scope);
            if removed > 0 {
                log::trace!(
                    "Recycling {} dropped {} finished signals",
                    recycling.id,
                    removed
                );
            }
        }
    }
}

/// Counters shared with whoever wants to observe a `VolumeRecall`
#[derive(Debug, Default)]
pub struct VolumeStats {
    /// Blocks processed in a pool slot
    pub pooled: AtomicU64,
    /// Blocks processed on the scalar path for lack of a free slot
    pub fallbacks: AtomicU64,
    /// Sum of squares of the last processed block
    pub level: AtomicF32,
}

/// Applies a smoothed gain with soft clipping to the mix at run-post
///
/// The block is copied into an `F32` pool slot and processed there with SIMD.
/// When the pool has no free slot the block is processed in place on the
/// scalar path instead: the tick never waits for a slot.
pub struct VolumeRecall {
    gain: AtomicF32,
    smoother: OnePoleSmoother,
    stats: Arc<VolumeStats>,
}

impl VolumeRecall {
    pub fn new(gain: AtomicF32) -> Self {
        let initial = gain.get();
        Self {
            gain,
            smoother: OnePoleSmoother::new(initial, 4.0),
            stats: Arc::new(VolumeStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<VolumeStats> {
        self.stats.clone()
    }
}

impl Recall for VolumeRecall {
    fn name(&self) -> &str {
        "volume"
    }

    fn run_post(&mut self, ctx: &mut StageContext<'_>) {
        let gain = self.smoother.process(self.gain.get());

        for recycling in ctx.recyclings.iter_mut() {
            let mix = recycling.mix_mut(ctx.scope);
            let frames = ctx.buffer_size.min(mix.len());
            let block = &mut mix[..frames];

            let mut slot = ctx.pool.try_acquire(VectorKind::F32);
            match slot.as_mut().and_then(|s| s.as_f32_mut()) {
                Some(scratch) if scratch.len() >= frames => {
                    let scratch = &mut scratch[..frames];
                    scratch.copy_from_slice(block);
                    apply_gain_simd(scratch, gain);
                    block.copy_from_slice(scratch);
                    self.stats.level.set(energy(scratch));
                    self.stats.pooled.fetch_add(1, Ordering::Relaxed);
                }
                _ => {
                    apply_gain_scalar(block, gain);
                    self.stats.level.set(energy(block));
                    let fallbacks = self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                    if fallbacks == 0 {
                        log::warn!("No free f32 vector slot, volume runs on the scalar path");
                    }
                }
            }
        }
    }
}
