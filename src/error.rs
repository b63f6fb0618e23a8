// Engine errors - lifecycle failures only
//
// The per-tick path never returns errors: missing configuration falls back to
// defaults, pool exhaustion degrades to a scalar path and out-of-range pattern
// access is a no-op. Only start/stop/init/config operations surface here.

use thiserror::Error;

use crate::config::ConfigError;

/// Engine lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Worker already running: {0}")]
    AlreadyRunning(String),

    #[error("Worker not running: {0}")]
    NotRunning(String),

    #[error("Vector buffer pool is not initialized")]
    PoolNotInitialized,

    #[error("Vector buffer pool is already initialized")]
    PoolAlreadyInitialized,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid staging program: {0}")]
    InvalidStagingProgram(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(usize),
}

pub type EngineResult<T> = Result<T, EngineError>;
