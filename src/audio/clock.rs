// Clock source - Tick rate, tempo and delay as seen by the sequencer
//
// The engine only consumes a clock. `SoundcardClock` is the in-process
// implementation used when no device reports timing.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::audio::parameters::AtomicF64;

pub const DEFAULT_SAMPLERATE: u32 = 44100;
pub const DEFAULT_BUFFER_SIZE: u32 = 512;
pub const DEFAULT_BPM: f64 = 120.0;
/// Note length the delay factor is expressed against (1/4 note)
pub const DEFAULT_DELAY_FACTOR: f64 = 1.0 / 4.0;
/// Step length of the sequencer (1/16 note)
pub const DEFAULT_TACT: f64 = 1.0 / 16.0;
pub const DEFAULT_OVERCLOCK: f64 = 0.0;

/// Ticks per sequencer step
///
/// `60 * (samplerate / buffer_size) / bpm * tact / delay_factor`, about 10.77
/// with the defaults.
pub fn absolute_delay(samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> f64 {
    if samplerate == 0 || buffer_size == 0 || bpm <= 0.0 || delay_factor <= 0.0 {
        return default_delay();
    }

    let ticks_per_second = samplerate as f64 / buffer_size as f64;
    60.0 * ticks_per_second / bpm * DEFAULT_TACT / delay_factor
}

/// Delay with every clock parameter at its default
pub fn default_delay() -> f64 {
    60.0 * (DEFAULT_SAMPLERATE as f64 / DEFAULT_BUFFER_SIZE as f64) / DEFAULT_BPM * DEFAULT_TACT
        / DEFAULT_DELAY_FACTOR
}

/// Timing information consumed at tick boundaries
pub trait ClockSource: Send + Sync {
    fn samplerate(&self) -> u32;
    fn buffer_size(&self) -> u32;
    fn bpm(&self) -> f64;
    fn delay_factor(&self) -> f64;

    /// Ticks per sequencer step
    fn absolute_delay(&self) -> f64 {
        absolute_delay(
            self.samplerate(),
            self.buffer_size(),
            self.bpm(),
            self.delay_factor(),
        )
    }

    /// Hardware-reported tick phase, when the device provides one
    fn delay_counter(&self) -> Option<f64> {
        None
    }
}

/// Atomics-backed clock
pub struct SoundcardClock {
    samplerate: AtomicU32,
    buffer_size: AtomicU32,
    bpm: AtomicF64,
    delay_factor: AtomicF64,
    hardware_delay_counter: AtomicF64,
    has_delay_counter: AtomicBool,
    /// Frames rendered since start
    sample_position: AtomicU64,
    tick_count: AtomicU64,
}

impl SoundcardClock {
    pub fn new(samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> Self {
        Self {
            samplerate: AtomicU32::new(samplerate),
            buffer_size: AtomicU32::new(buffer_size),
            bpm: AtomicF64::new(bpm),
            delay_factor: AtomicF64::new(delay_factor),
            hardware_delay_counter: AtomicF64::new(0.0),
            has_delay_counter: AtomicBool::new(false),
            sample_position: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
        }
    }

    pub fn set_bpm(&self, bpm: f64) {
        if bpm > 0.0 {
            self.bpm.set(bpm);
        }
    }

    pub fn set_delay_factor(&self, delay_factor: f64) {
        if delay_factor > 0.0 {
            self.delay_factor.set(delay_factor);
        }
    }

    /// Publish (or withdraw, with `None`) the device's tick phase
    pub fn report_delay_counter(&self, counter: Option<f64>) {
        match counter {
            Some(value) => {
                self.hardware_delay_counter.set(value);
                self.has_delay_counter.store(true, Ordering::Release);
            }
            None => self.has_delay_counter.store(false, Ordering::Release),
        }
    }

    /// Advance by one tick (called by the scheduler after every tick)
    pub fn advance(&self) {
        let frames = self.buffer_size.load(Ordering::Relaxed) as u64;
        self.sample_position.fetch_add(frames, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }
}

impl Default for SoundcardClock {
    fn default() -> Self {
        Self::new(
            DEFAULT_SAMPLERATE,
            DEFAULT_BUFFER_SIZE,
            DEFAULT_BPM,
            DEFAULT_DELAY_FACTOR,
        )
    }
}

impl ClockSource for SoundcardClock {
    fn samplerate(&self) -> u32 {
        self.samplerate.load(Ordering::Relaxed)
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    fn bpm(&self) -> f64 {
        self.bpm.get()
    }

    fn delay_factor(&self) -> f64 {
        self.delay_factor.get()
    }

    fn delay_counter(&self) -> Option<f64> {
        if self.has_delay_counter.load(Ordering::Acquire) {
            Some(self.hardware_delay_counter.get())
        } else {
            None
        }
    }
}
