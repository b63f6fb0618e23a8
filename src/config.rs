// Engine configuration - RON-backed settings with documented defaults

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::audio::clock::{
    DEFAULT_BPM, DEFAULT_BUFFER_SIZE, DEFAULT_DELAY_FACTOR, DEFAULT_OVERCLOCK, DEFAULT_SAMPLERATE,
};
use crate::graph::recall::StagingProgram;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse RON config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Layout of one audio stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    /// Channels per pad
    pub audio_channels: usize,
    pub input_pads: usize,
    pub output_pads: usize,
    /// Pattern bank sizes and step count (dim0, dim1, length)
    pub pattern_dim: (usize, usize, usize),
    /// Delegate every channel of this stream to its own worker thread
    pub super_threaded: bool,
    /// Select input pads from the top (`pads - y - 1`)
    pub reverse_mapping: bool,
    /// Triggered signals use the template length instead of note length
    pub pattern_mode: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "stream".to_string(),
            audio_channels: 2,
            input_pads: 8,
            output_pads: 1,
            pattern_dim: (4, 12, 64),
            super_threaded: false,
            reverse_mapping: false,
            pattern_mode: true,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub samplerate: u32,
    pub buffer_size: u32,
    pub bpm: f64,
    pub delay_factor: f64,
    /// Extra ticks per second added to `samplerate / buffer_size`
    pub overclock: f64,
    /// Slots reserved per numeric kind in the vector pool
    pub pool_slots_per_kind: usize,
    /// Frame capacity of every pool slot
    pub pool_frames: usize,
    /// Stage names per program entry, e.g. `[["run-pre"], ["run-inter"]]`
    pub staging_program: Vec<Vec<String>>,
    pub command_queue_capacity: usize,
    pub streams: Vec<StreamConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            bpm: DEFAULT_BPM,
            delay_factor: DEFAULT_DELAY_FACTOR,
            overclock: DEFAULT_OVERCLOCK,
            pool_slots_per_kind: 8,
            pool_frames: DEFAULT_BUFFER_SIZE as usize,
            staging_program: StagingProgram::default().to_names(),
            command_queue_capacity: 256,
            streams: vec![StreamConfig::default()],
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a RON string
    pub fn from_ron(data: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron(&data)?;

        log::info!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize to RON: {}", e)))
    }

    /// Reject values the scheduler and the pool cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samplerate == 0 {
            return Err(ConfigError::Invalid("samplerate must be > 0".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be > 0".to_string()));
        }
        if !(self.bpm > 0.0) {
            return Err(ConfigError::Invalid("bpm must be > 0".to_string()));
        }
        if !(self.delay_factor > 0.0) {
            return Err(ConfigError::Invalid("delay_factor must be > 0".to_string()));
        }
        if self.overclock < 0.0 {
            return Err(ConfigError::Invalid("overclock must be >= 0".to_string()));
        }
        if self.pool_frames < self.buffer_size as usize {
            return Err(ConfigError::Invalid(format!(
                "pool_frames ({}) is smaller than buffer_size ({})",
                self.pool_frames, self.buffer_size
            )));
        }
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "command_queue_capacity must be > 0".to_string(),
            ));
        }

        StagingProgram::from_names(&self.staging_program)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for stream in &self.streams {
            if stream.audio_channels == 0 {
                return Err(ConfigError::Invalid(format!(
                    "stream '{}' has no audio channels",
                    stream.name
                )));
            }
        }

        Ok(())
    }

    /// Parsed staging program
    pub fn program(&self) -> Result<StagingProgram, ConfigError> {
        StagingProgram::from_names(&self.staging_program)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
