// Audio module - Clock, tick scheduling and DSP helpers

pub mod clock;
pub mod cpu_monitor;
pub mod dsp_utils;
pub mod parameters;
pub mod scheduler;
pub mod simd;
