//! SIMD block processing
//!
//! 4-wide versions of the scalar helpers in `dsp_utils`, using the `wide`
//! crate for portable SIMD.

use wide::f32x4;

use crate::audio::dsp_utils::{apply_gain_scalar, soft_clip};

/// Scale a block in place, 4 samples at a time
pub fn scale_block(block: &mut [f32], gain: f32) {
    let gain4 = f32x4::splat(gain);
    let mut chunks = block.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let v = f32x4::from([chunk[0], chunk[1], chunk[2], chunk[3]]) * gain4;
        chunk.copy_from_slice(&v.to_array());
    }

    for sample in chunks.into_remainder() {
        *sample *= gain;
    }
}

/// Scale then soft-clip a block in place
///
/// Same result as `dsp_utils::apply_gain_scalar` up to float rounding.
pub fn apply_gain_simd(block: &mut [f32], gain: f32) {
    if block.len() < 4 {
        apply_gain_scalar(block, gain);
        return;
    }

    scale_block(block, gain);
    for sample in block.iter_mut() {
        *sample = soft_clip(*sample);
    }
}

/// Sum of squares, used for level metering
pub fn energy(block: &[f32]) -> f32 {
    let mut acc = f32x4::ZERO;
    let mut chunks = block.chunks_exact(4);

    for chunk in &mut chunks {
        let v = f32x4::from([chunk[0], chunk[1], chunk[2], chunk[3]]);
        acc += v * v;
    }

    acc.reduce_add() + chunks.remainder().iter().map(|s| s * s).sum::<f32>()
}
