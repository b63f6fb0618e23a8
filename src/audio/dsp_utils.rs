// DSP utilities - Audio hygiene for the mix stages
//
// Scalar helpers used by recalls, and as the fallback path when no pool slot
// is available.

/// Flush denormals to zero
///
/// Values this close to zero can slow some CPUs down considerably.
/// Threshold: 1e-15, far below 32-bit float noise.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping (tanh)
///
/// Near-linear around zero, asymptotic towards ±1.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Scale and soft-clip a block in place, one sample at a time
pub fn apply_gain_scalar(block: &mut [f32], gain: f32) {
    for sample in block.iter_mut() {
        *sample = flush_denormals_to_zero(soft_clip(*sample * gain));
    }
}

/// One-pole smoother for per-block parameter changes
///
/// y[n] = y[n-1] + α * (x[n] - y[n-1])
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// # Arguments
    /// * `initial_value` - Starting value
    /// * `time_constant` - Steps (ticks) to reach ~63% of a new target
    pub fn new(initial_value: f32, time_constant: f32) -> Self {
        Self {
            current: initial_value,
            coefficient: (1.0 / time_constant.max(1.0)).min(1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }

    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    pub fn get(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(0.1), 0.1);
        assert_eq!(flush_denormals_to_zero(-0.1), -0.1);
    }

    #[test]
    fn test_soft_clip() {
        assert!((soft_clip(0.0) - 0.0).abs() < 0.001);
        assert!((soft_clip(0.5) - 0.462).abs() < 0.01);

        assert!(soft_clip(10.0) <= 1.0);
        assert!(soft_clip(10.0) > 0.99);
        assert!(soft_clip(-10.0) >= -1.0);
        assert!(soft_clip(-10.0) < -0.99);
    }

    #[test]
    fn test_apply_gain_scalar() {
        let mut block = [0.5, -0.5, 4.0];
        apply_gain_scalar(&mut block, 2.0);

        assert!((block[0] - 1.0f32.tanh()).abs() < 1e-6);
        assert!((block[1] + 1.0f32.tanh()).abs() < 1e-6);
        assert!(block[2] < 1.0);
    }

    #[test]
    fn test_smoother_convergence() {
        let mut smoother = OnePoleSmoother::new(0.0, 10.0);

        let mut value = 0.0;
        for _ in 0..200 {
            value = smoother.process(1.0);
        }
        assert!((value - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_smoother_no_overshoot() {
        let mut smoother = OnePoleSmoother::new(0.0, 5.0);

        for _ in 0..100 {
            let value = smoother.process(1.0);
            assert!((0.0..=1.0).contains(&value));
        }
    }
}
