use std::process;
use std::thread;
use std::time::Duration;

use tickweave::pool::global;
use tickweave::{Command, Engine, EngineConfig, EngineResult, SoundScope};

const DEMO_SECONDS: u64 = 4;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn run() -> EngineResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let pool = global::init(config.pool_slots_per_kind, config.pool_frames)?;
    let engine = Engine::new(config, pool)?;

    // Four-on-the-floor on the first pad, offbeats on the second
    let length = engine.config().streams.first().map_or(0, |s| s.pattern_dim.2);
    for stream in 0..engine.stream_count() {
        for step in (0..length).step_by(4) {
            for (pad, offset) in [(0, 0), (1, 2)] {
                engine.send(Command::ToggleStep {
                    stream,
                    pad,
                    audio_channel: 0,
                    bank0: 0,
                    bank1: 0,
                    step: step + offset,
                });
            }
        }
        engine.send(Command::Play {
            stream,
            scope: SoundScope::Sequencer,
        });
    }

    engine.start()?;
    thread::sleep(Duration::from_secs(DEMO_SECONDS));

    for notification in engine.poll_notifications() {
        log::info!("[{:?}] {}", notification.category, notification.message);
    }
    log::info!(
        "{} ticks, {:.1}% tick load",
        engine.tick_count(),
        engine.cpu_load()
    );

    engine.stop()?;
    drop(engine);
    global::teardown()
}
