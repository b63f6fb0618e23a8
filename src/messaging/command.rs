// Commands - Control thread → tick thread
//
// Applied at the start of a tick, before any worker is woken.

use crate::graph::scope::SoundScope;
use crate::sequencer::processor::{KeyMode, Whence};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Begin playing a scope on a stream
    Play { stream: usize, scope: SoundScope },
    Stop { stream: usize, scope: SoundScope },
    /// `None` processes every non-playback scope
    SetSoundScope {
        stream: usize,
        scope: Option<SoundScope>,
    },
    Seek {
        stream: usize,
        offset: i64,
        whence: Whence,
    },
    SetLoop {
        stream: usize,
        enabled: bool,
        start: u64,
        end: u64,
    },
    /// Applies to the clock and every stream
    SetBpm(f64),
    /// Applies to every stream
    SetTact(f64),
    KeyOn {
        stream: usize,
        audio_channel: usize,
        pad: usize,
        step: usize,
        velocity: u8,
        mode: KeyMode,
    },
    ToggleStep {
        stream: usize,
        pad: usize,
        audio_channel: usize,
        bank0: usize,
        bank1: usize,
        step: usize,
    },
}

impl Command {
    /// Target stream, for stream-scoped commands
    pub fn stream(&self) -> Option<usize> {
        match *self {
            Command::Play { stream, .. }
            | Command::Stop { stream, .. }
            | Command::SetSoundScope { stream, .. }
            | Command::Seek { stream, .. }
            | Command::SetLoop { stream, .. }
            | Command::KeyOn { stream, .. }
            | Command::ToggleStep { stream, .. } => Some(stream),
            Command::SetBpm(_) | Command::SetTact(_) => None,
        }
    }
}
