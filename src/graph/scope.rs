// Sound scopes - Independent rendering contexts processed each tick

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundScope {
    /// Bare playback: no wakeup wait, no barrier
    Playback,
    Sequencer,
    Notation,
    Wave,
    Midi,
}

impl SoundScope {
    pub const ALL: [SoundScope; 5] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
        SoundScope::Midi,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: i32) -> Option<SoundScope> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            SoundScope::Playback => "playback",
            SoundScope::Sequencer => "sequencer",
            SoundScope::Notation => "notation",
            SoundScope::Wave => "wave",
            SoundScope::Midi => "midi",
        }
    }

    fn bit(self) -> u32 {
        1 << self.index()
    }
}

/// Selector encoding used by the workers: `-1` means every non-playback scope
pub fn selector_to_raw(selector: Option<SoundScope>) -> i32 {
    selector.map_or(-1, |scope| scope.index() as i32)
}

pub fn selector_from_raw(raw: i32) -> Option<SoundScope> {
    SoundScope::from_index(raw)
}

/// Set of scopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeMask(u32);

impl ScopeMask {
    pub const EMPTY: ScopeMask = ScopeMask(0);

    /// Scopes processed for a selector: the selected one, or every
    /// non-playback scope
    pub fn active(selector: Option<SoundScope>) -> Self {
        match selector {
            Some(scope) => Self::EMPTY.with(scope),
            None => SoundScope::ALL
                .into_iter()
                .filter(|scope| *scope != SoundScope::Playback)
                .fold(Self::EMPTY, Self::with),
        }
    }

    pub fn with(self, scope: SoundScope) -> Self {
        ScopeMask(self.0 | scope.bit())
    }

    pub fn contains(self, scope: SoundScope) -> bool {
        self.0 & scope.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        ScopeMask(bits & ((1 << SoundScope::COUNT) - 1))
    }

    pub fn iter(self) -> impl Iterator<Item = SoundScope> {
        SoundScope::ALL
            .into_iter()
            .filter(move |scope| self.contains(*scope))
    }
}
