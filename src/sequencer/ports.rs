// Ports - Recognized sequencer options with documented defaults
//
// A port may be absent (never written, or cleared). Readers always get a
// usable value: absent, zero or non-finite inputs fall back to the default.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::clock::{ClockSource, DEFAULT_BPM, DEFAULT_TACT, default_delay};
use crate::audio::parameters::AtomicF64;

pub const DEFAULT_DURATION: u64 = 64;
pub const DEFAULT_LOOP_START: u64 = 0;
pub const DEFAULT_LOOP_END: u64 = 64;

/// Port identifiers, named as in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKey {
    Bpm,
    Tact,
    Delay,
    Duration,
    Loop,
    LoopStart,
    LoopEnd,
    BankIndex0,
    BankIndex1,
}

impl PortKey {
    pub const ALL: [PortKey; 9] = [
        PortKey::Bpm,
        PortKey::Tact,
        PortKey::Delay,
        PortKey::Duration,
        PortKey::Loop,
        PortKey::LoopStart,
        PortKey::LoopEnd,
        PortKey::BankIndex0,
        PortKey::BankIndex1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PortKey::Bpm => "bpm",
            PortKey::Tact => "tact",
            PortKey::Delay => "delay",
            PortKey::Duration => "duration",
            PortKey::Loop => "loop",
            PortKey::LoopStart => "loop-start",
            PortKey::LoopEnd => "loop-end",
            PortKey::BankIndex0 => "bank-index-0",
            PortKey::BankIndex1 => "bank-index-1",
        }
    }

    pub fn default_value(self) -> f64 {
        match self {
            PortKey::Bpm => DEFAULT_BPM,
            PortKey::Tact => DEFAULT_TACT,
            PortKey::Delay => default_delay(),
            PortKey::Duration => DEFAULT_DURATION as f64,
            PortKey::Loop => 0.0,
            PortKey::LoopStart => DEFAULT_LOOP_START as f64,
            PortKey::LoopEnd => DEFAULT_LOOP_END as f64,
            PortKey::BankIndex0 | PortKey::BankIndex1 => 0.0,
        }
    }
}

impl FromStr for PortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| format!("unknown port '{}'", s))
    }
}

/// One port cell
#[derive(Debug, Default)]
pub struct Port {
    value: AtomicF64,
    present: AtomicBool,
}

impl Port {
    fn with_value(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
            present: AtomicBool::new(true),
        }
    }

    pub fn get(&self) -> Option<f64> {
        if self.present.load(Ordering::Acquire) {
            Some(self.value.get()).filter(|v| v.is_finite())
        } else {
            None
        }
    }

    pub fn set(&self, value: f64) {
        self.value.set(value);
        self.present.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.present.store(false, Ordering::Release);
    }
}

/// The port set of one sequencer stream
///
/// Shared (`Arc`) between the stream's processors and whoever controls them.
#[derive(Debug, Default)]
pub struct PortSet {
    bpm: Port,
    tact: Port,
    delay: Port,
    duration: Port,
    looping: Port,
    loop_start: Port,
    loop_end: Port,
    bank_index_0: Port,
    bank_index_1: Port,
}

impl PortSet {
    /// Every port absent
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every port present with its default value
    pub fn with_defaults() -> Self {
        let ports = Self::empty();
        for key in PortKey::ALL {
            ports.port(key).set(key.default_value());
        }
        ports
    }

    /// Defaults, with tempo and delay taken from a clock
    pub fn from_clock(clock: &dyn ClockSource) -> Self {
        let ports = Self::with_defaults();
        ports.bpm.set(clock.bpm());
        ports.delay.set(clock.absolute_delay());
        ports
    }

    pub fn port(&self, key: PortKey) -> &Port {
        match key {
            PortKey::Bpm => &self.bpm,
            PortKey::Tact => &self.tact,
            PortKey::Delay => &self.delay,
            PortKey::Duration => &self.duration,
            PortKey::Loop => &self.looping,
            PortKey::LoopStart => &self.loop_start,
            PortKey::LoopEnd => &self.loop_end,
            PortKey::BankIndex0 => &self.bank_index_0,
            PortKey::BankIndex1 => &self.bank_index_1,
        }
    }

    pub fn set(&self, key: PortKey, value: f64) {
        self.port(key).set(value);
    }

    /// Set a port by its configuration name; false for unknown names
    pub fn set_by_name(&self, name: &str, value: f64) -> bool {
        match name.parse::<PortKey>() {
            Ok(key) => {
                self.set(key, value);
                true
            }
            Err(_) => false,
        }
    }

    fn positive_or_default(&self, key: PortKey) -> f64 {
        self.port(key)
            .get()
            .filter(|v| *v > 0.0)
            .unwrap_or_else(|| key.default_value())
    }

    fn index_or_default(&self, key: PortKey) -> u64 {
        self.port(key)
            .get()
            .filter(|v| *v >= 0.0)
            .unwrap_or_else(|| key.default_value()) as u64
    }

    pub fn bpm(&self) -> f64 {
        self.positive_or_default(PortKey::Bpm)
    }

    pub fn tact(&self) -> f64 {
        self.positive_or_default(PortKey::Tact)
    }

    /// Ticks per step, never zero
    pub fn delay(&self) -> f64 {
        self.positive_or_default(PortKey::Delay)
    }

    /// Steps in the pattern, never zero
    pub fn duration(&self) -> u64 {
        match self.index_or_default(PortKey::Duration) {
            0 => DEFAULT_DURATION,
            duration => duration,
        }
    }

    pub fn loop_enabled(&self) -> bool {
        self.looping.get().is_some_and(|v| v != 0.0)
    }

    pub fn loop_start(&self) -> u64 {
        self.index_or_default(PortKey::LoopStart)
    }

    pub fn loop_end(&self) -> u64 {
        self.index_or_default(PortKey::LoopEnd)
    }

    /// Bank indices, truncated to integers
    pub fn bank_indices(&self) -> (usize, usize) {
        (
            self.index_or_default(PortKey::BankIndex0) as usize,
            self.index_or_default(PortKey::BankIndex1) as usize,
        )
    }

    pub fn set_loop(&self, enabled: bool, start: u64, end: u64) {
        self.looping.set(if enabled { 1.0 } else { 0.0 });
        self.loop_start.set(start as f64);
        self.loop_end.set(end as f64);
    }

    /// New tempo; the delay is rescaled so a step keeps its musical length
    pub fn change_bpm(&self, bpm: f64) {
        if !(bpm > 0.0) || !bpm.is_finite() {
            return;
        }

        let old_bpm = self.bpm();
        self.delay.set(self.delay() * old_bpm / bpm);
        self.bpm.set(bpm);
    }

    /// New step length as a fraction of a whole note
    pub fn change_tact(&self, tact: f64) {
        if !(tact > 0.0) || !tact.is_finite() {
            return;
        }

        let old_tact = self.tact();
        self.delay.set(self.delay() * tact / old_tact);
        self.tact.set(tact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::SoundcardClock;

    #[test]
    fn test_absent_ports_use_defaults() {
        let ports = PortSet::empty();

        assert_eq!(ports.bpm(), DEFAULT_BPM);
        assert_eq!(ports.delay(), default_delay());
        assert_eq!(ports.duration(), DEFAULT_DURATION);
        assert!(!ports.loop_enabled());
        assert_eq!(ports.loop_start(), 0);
        assert_eq!(ports.loop_end(), 64);
        assert_eq!(ports.bank_indices(), (0, 0));
    }

    #[test]
    fn test_zero_delay_and_duration_fall_back() {
        let ports = PortSet::with_defaults();
        ports.set(PortKey::Delay, 0.0);
        ports.set(PortKey::Duration, 0.0);

        assert_eq!(ports.delay(), default_delay());
        assert_eq!(ports.duration(), DEFAULT_DURATION);
    }

    #[test]
    fn test_non_finite_values_fall_back() {
        let ports = PortSet::empty();
        ports.set(PortKey::Delay, f64::NAN);
        ports.set(PortKey::Duration, f64::INFINITY);

        assert_eq!(ports.delay(), default_delay());
        assert_eq!(ports.duration(), DEFAULT_DURATION);
    }

    #[test]
    fn test_bank_indices_truncate() {
        let ports = PortSet::empty();
        ports.set(PortKey::BankIndex0, 2.9);
        ports.set(PortKey::BankIndex1, -1.0);

        assert_eq!(ports.bank_indices(), (2, 0));
    }

    #[test]
    fn test_set_by_name() {
        let ports = PortSet::empty();
        assert!(ports.set_by_name("loop-end", 16.0));
        assert!(ports.set_by_name("loop", 1.0));
        assert!(!ports.set_by_name("swing", 0.5));

        assert_eq!(ports.loop_end(), 16);
        assert!(ports.loop_enabled());
    }

    #[test]
    fn test_change_bpm_rescales_delay() {
        let ports = PortSet::with_defaults();
        ports.set(PortKey::Delay, 8.0);

        ports.change_bpm(240.0);
        assert_eq!(ports.bpm(), 240.0);
        assert_eq!(ports.delay(), 4.0);

        // Ignored
        ports.change_bpm(0.0);
        assert_eq!(ports.delay(), 4.0);
    }

    #[test]
    fn test_change_tact_rescales_delay() {
        let ports = PortSet::with_defaults();
        ports.set(PortKey::Delay, 4.0);

        ports.change_tact(1.0 / 8.0);
        assert_eq!(ports.delay(), 8.0);
        assert_eq!(ports.tact(), 0.125);
    }

    #[test]
    fn test_from_clock() {
        let clock = SoundcardClock::default();
        clock.set_bpm(60.0);

        let ports = PortSet::from_clock(&clock);
        assert_eq!(ports.bpm(), 60.0);
        assert_eq!(ports.delay(), clock.absolute_delay());
    }

    #[test]
    fn test_port_key_names() {
        for key in PortKey::ALL {
            assert_eq!(key.name().parse::<PortKey>(), Ok(key));
        }
    }
}
