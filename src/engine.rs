// Engine - Streams, their workers, the clock and the tick loop
//
// One tick:
//   1. drain the command queue
//   2. wake every audio worker (threaded workers start their run)
//   3. run the unthreaded workers inline
//   4. wait for every worker's done
//   5. report processors that finished, advance the clock
//
// Ticks are serialized: the scheduler thread and `tick_once` share one lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use ringbuf::traits::{Consumer, Producer};

use crate::audio::clock::{ClockSource, SoundcardClock};
use crate::audio::scheduler::{TickScheduler, period_for};
use crate::config::{EngineConfig, StreamConfig};
use crate::error::{EngineError, EngineResult};
use crate::graph::recall::StagingProgram;
use crate::graph::scope::SoundScope;
use crate::graph::stream::AudioStream;
use crate::messaging::channels::{
    CommandConsumer, CommandProducer, NotificationConsumer, NotificationProducer,
    create_command_channel, create_notification_channel,
};
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::pattern::Note;
use crate::pool::VectorBufferPool;
use crate::sequencer::processor::{ProcessorState, TriggerObserver};
use crate::thread::audio_worker::AudioWorker;

const NOTIFICATION_CAPACITY: usize = 64;

struct EngineCore {
    clock: Arc<SoundcardClock>,
    workers: RwLock<Vec<Arc<AudioWorker>>>,
    command_rx: Mutex<CommandConsumer>,
    notification_tx: Mutex<NotificationProducer>,
    /// Processor Done flags seen at the end of the previous tick
    finished: Mutex<Vec<Vec<bool>>>,
    tick_lock: Mutex<()>,
}

impl EngineCore {
    fn notify(&self, notification: Notification) {
        if let Some(mut tx) = self.notification_tx.try_lock() {
            let _ = tx.try_push(notification);
        }
    }

    fn run_tick(&self) {
        let _tick = self.tick_lock.lock();
        let workers = self.workers.read();

        if let Some(mut rx) = self.command_rx.try_lock() {
            while let Some(command) = rx.try_pop() {
                self.apply(&workers, command);
            }
        }

        for worker in workers.iter() {
            worker.wakeup();
        }
        for worker in workers.iter() {
            if !worker.is_running() {
                worker.run();
            }
        }
        for worker in workers.iter() {
            worker.wait_done();
        }

        self.report_finished(&workers);
        self.clock.advance();
    }

    fn apply(&self, workers: &[Arc<AudioWorker>], command: Command) {
        log::trace!("Applying {:?}", command);

        let target = match command.stream() {
            Some(index) => match workers.get(index) {
                Some(worker) => Some(worker),
                None => {
                    log::warn!("Command for unknown stream {} dropped", index);
                    self.notify(Notification::warning(
                        NotificationCategory::Command,
                        format!("Unknown stream {}", index),
                    ));
                    return;
                }
            },
            None => None,
        };

        match (command, target) {
            (Command::SetBpm(bpm), _) => {
                self.clock.set_bpm(bpm);
                for worker in workers {
                    worker.stream().ports().change_bpm(bpm);
                }
            }
            (Command::SetTact(tact), _) => {
                for worker in workers {
                    worker.stream().ports().change_tact(tact);
                }
            }
            (Command::Play { scope, .. }, Some(worker)) => worker.stream().start_scope(scope),
            (Command::Stop { scope, .. }, Some(worker)) => worker.stream().stop_scope(scope),
            (Command::SetSoundScope { scope, .. }, Some(worker)) => worker.set_sound_scope(scope),
            (Command::Seek { offset, whence, .. }, Some(worker)) => {
                worker.stream().seek(offset, whence)
            }
            (
                Command::SetLoop {
                    enabled, start, end, ..
                },
                Some(worker),
            ) => worker.stream().ports().set_loop(enabled, start, end),
            (
                Command::KeyOn {
                    audio_channel,
                    pad,
                    step,
                    velocity,
                    mode,
                    ..
                },
                Some(worker),
            ) => {
                let stream = worker.stream();
                let Some(processor) = stream.processor(audio_channel) else {
                    log::warn!("Key-on for unknown audio channel {}", audio_channel);
                    return;
                };
                let note = Arc::new(Note::for_step(step, pad));
                processor
                    .lock()
                    .key_on(&stream.view(), &note, velocity, mode);
            }
            (
                Command::ToggleStep {
                    pad,
                    audio_channel,
                    bank0,
                    bank1,
                    step,
                    ..
                },
                Some(worker),
            ) => match worker.stream().input_channel(pad, audio_channel) {
                Some(channel) => channel.pattern_mut().toggle_bit(bank0, bank1, step),
                None => log::warn!("Toggle on unknown pad {} / channel {}", pad, audio_channel),
            },
            (_, None) => {}
        }
    }

    fn report_finished(&self, workers: &[Arc<AudioWorker>]) {
        let mut finished = self.finished.lock();
        finished.resize_with(workers.len(), Vec::new);

        for (worker, flags) in workers.iter().zip(finished.iter_mut()) {
            let stream = worker.stream();
            flags.resize(stream.processors().len(), false);

            for (audio_channel, (processor, flag)) in
                stream.processors().iter().zip(flags.iter_mut()).enumerate()
            {
                let done = processor.lock().state() == ProcessorState::Done;
                if done && !*flag {
                    self.notify(Notification::info(
                        NotificationCategory::Sequencer,
                        format!(
                            "Stream '{}' channel {} reached the end of its pattern",
                            stream.name, audio_channel
                        ),
                    ));
                }
                *flag = done;
            }
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    core: Arc<EngineCore>,
    pool: Arc<VectorBufferPool>,
    program: RwLock<StagingProgram>,
    command_tx: Mutex<CommandProducer>,
    notification_rx: Mutex<NotificationConsumer>,
    scheduler: Mutex<TickScheduler>,
    workers_started: AtomicBool,
}

impl Engine {
    /// Build the engine and one stream per configured stream
    pub fn new(config: EngineConfig, pool: Arc<VectorBufferPool>) -> EngineResult<Self> {
        config.validate()?;
        let program = config.program()?;

        let clock = Arc::new(SoundcardClock::new(
            config.samplerate,
            config.buffer_size,
            config.bpm,
            config.delay_factor,
        ));
        let (command_tx, command_rx) = create_command_channel(config.command_queue_capacity);
        let (notification_tx, notification_rx) = create_notification_channel(NOTIFICATION_CAPACITY);
        let period = period_for(config.samplerate, config.buffer_size, config.overclock);

        let engine = Self {
            core: Arc::new(EngineCore {
                clock,
                workers: RwLock::new(Vec::new()),
                command_rx: Mutex::new(command_rx),
                notification_tx: Mutex::new(notification_tx),
                finished: Mutex::new(Vec::new()),
                tick_lock: Mutex::new(()),
            }),
            pool,
            program: RwLock::new(program),
            command_tx: Mutex::new(command_tx),
            notification_rx: Mutex::new(notification_rx),
            scheduler: Mutex::new(TickScheduler::new("tick-scheduler", period)),
            workers_started: AtomicBool::new(false),
            config,
        };

        for stream in engine.config.streams.clone() {
            engine.add_stream(&stream)?;
        }

        log::info!(
            "Engine ready: {} stream(s), {} Hz, {} frames, {} bpm",
            engine.stream_count(),
            engine.config.samplerate,
            engine.config.buffer_size,
            engine.config.bpm
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<SoundcardClock> {
        &self.core.clock
    }

    pub fn pool(&self) -> &Arc<VectorBufferPool> {
        &self.pool
    }

    /// Add a stream; its worker starts at once if the workers run
    pub fn add_stream(&self, config: &StreamConfig) -> EngineResult<usize> {
        let mut workers = self.core.workers.write();
        let id = workers.len();

        let stream = Arc::new(AudioStream::new(id, config, self.core.clock.as_ref()));
        let clock: Arc<dyn ClockSource> = self.core.clock.clone();
        let worker = Arc::new(AudioWorker::new(
            stream,
            clock,
            self.pool.clone(),
            self.program.read().clone(),
        ));

        if self.workers_started.load(Ordering::Acquire) {
            worker.start()?;
        }

        workers.push(worker);
        log::debug!("Stream {} '{}' added", id, config.name);
        Ok(id)
    }

    pub fn stream_count(&self) -> usize {
        self.core.workers.read().len()
    }

    pub fn worker(&self, index: usize) -> EngineResult<Arc<AudioWorker>> {
        self.core
            .workers
            .read()
            .get(index)
            .cloned()
            .ok_or(EngineError::StreamNotFound(index))
    }

    pub fn stream(&self, index: usize) -> EngineResult<Arc<AudioStream>> {
        Ok(self.worker(index)?.stream().clone())
    }

    /// Begin playing `scope` on a stream
    pub fn play(&self, stream: usize, scope: SoundScope) -> EngineResult<()> {
        self.stream(stream)?.start_scope(scope);
        Ok(())
    }

    pub fn stop_scope(&self, stream: usize, scope: SoundScope) -> EngineResult<()> {
        self.stream(stream)?.stop_scope(scope);
        Ok(())
    }

    pub fn set_sound_scope(&self, stream: usize, scope: Option<SoundScope>) -> EngineResult<()> {
        self.worker(stream)?.set_sound_scope(scope);
        Ok(())
    }

    /// Replace the staging program of every worker
    pub fn set_staging_program(&self, program: StagingProgram) {
        for worker in self.core.workers.read().iter() {
            worker.set_staging_program(program.clone());
        }
        *self.program.write() = program;
    }

    pub fn set_observer(
        &self,
        stream: usize,
        observer: Option<Arc<dyn TriggerObserver>>,
    ) -> EngineResult<()> {
        self.stream(stream)?.set_observer(observer);
        Ok(())
    }

    /// Queue a command for the next tick; false when the queue is full
    pub fn send(&self, command: Command) -> bool {
        let pushed = self.command_tx.lock().try_push(command).is_ok();
        if !pushed {
            log::warn!("Command queue full, {:?} dropped", command);
        }
        pushed
    }

    pub fn poll_notifications(&self) -> Vec<Notification> {
        let mut rx = self.notification_rx.lock();
        let mut notifications = Vec::new();
        while let Some(notification) = rx.try_pop() {
            notifications.push(notification);
        }
        notifications
    }

    /// Start every audio worker thread (and their channel workers)
    pub fn start_workers(&self) -> EngineResult<()> {
        if self.workers_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for worker in self.core.workers.read().iter() {
            worker.start()?;
        }
        Ok(())
    }

    /// Start the workers, then tick at soundcard rate
    pub fn start(&self) -> EngineResult<()> {
        self.start_workers()?;

        let core = self.core.clone();
        self.scheduler.lock().start(move || core.run_tick())?;
        log::info!("Engine started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_running()
    }

    /// Stop ticking, then stop every worker
    pub fn stop(&self) -> EngineResult<()> {
        match self.scheduler.lock().stop() {
            Ok(()) | Err(EngineError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        if self.workers_started.swap(false, Ordering::AcqRel) {
            for worker in self.core.workers.read().iter() {
                worker.stop()?;
            }
            log::info!("Engine stopped");
        }
        Ok(())
    }

    /// Run exactly one tick on the calling thread
    pub fn tick_once(&self) {
        self.core.run_tick();
    }

    pub fn tick_count(&self) -> u64 {
        self.core.clock.tick_count()
    }

    pub fn cpu_load(&self) -> f32 {
        self.scheduler.lock().monitor().get_cpu_percentage()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Engine shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::processor::{KeyMode, Whence};

    fn config() -> EngineConfig {
        EngineConfig {
            streams: vec![StreamConfig {
                name: "unit".to_string(),
                audio_channels: 1,
                input_pads: 2,
                output_pads: 1,
                pattern_dim: (1, 1, 8),
                ..StreamConfig::default()
            }],
            ..EngineConfig::default()
        }
    }

    fn engine() -> Engine {
        Engine::new(config(), Arc::new(VectorBufferPool::reserve_all(4, 512))).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            buffer_size: 0,
            ..config()
        };
        let result = Engine::new(config, Arc::new(VectorBufferPool::reserve_all(1, 512)));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_unknown_stream() {
        let engine = engine();
        assert_eq!(engine.stream_count(), 1);
        assert!(matches!(engine.stream(3), Err(EngineError::StreamNotFound(3))));
    }

    #[test]
    fn test_inline_ticks_advance_clock() {
        let engine = engine();
        engine.play(0, SoundScope::Sequencer).unwrap();

        for _ in 0..5 {
            engine.tick_once();
        }

        assert_eq!(engine.tick_count(), 5);
        assert_eq!(engine.clock().current_sample(), 5 * 512);
        assert_eq!(engine.worker(0).unwrap().tick_count(), 5);
    }

    #[test]
    fn test_commands_apply_on_next_tick() {
        let engine = engine();
        assert!(engine.send(Command::Play {
            stream: 0,
            scope: SoundScope::Sequencer,
        }));
        assert!(engine.send(Command::ToggleStep {
            stream: 0,
            pad: 1,
            audio_channel: 0,
            bank0: 0,
            bank1: 0,
            step: 3,
        }));
        assert!(engine.send(Command::Seek {
            stream: 0,
            offset: 3,
            whence: Whence::Set,
        }));

        let stream = engine.stream(0).unwrap();
        assert!(!stream.has_scope(SoundScope::Sequencer));

        engine.tick_once();

        assert!(stream.has_scope(SoundScope::Sequencer));
        let channel = stream.input_channel(1, 0).unwrap();
        assert!(channel.pattern().get_bit(0, 0, 3));
        // Seek put step 3 live on the first tick, whose bit is set
        assert_eq!(channel.recyclings()[0].signals().len(), 1);
    }

    #[test]
    fn test_key_on_command() {
        let engine = engine();
        engine.play(0, SoundScope::Sequencer).unwrap();
        engine.send(Command::KeyOn {
            stream: 0,
            audio_channel: 0,
            pad: 0,
            step: 0,
            velocity: 100,
            mode: KeyMode::Feed,
        });
        engine.tick_once();

        let stream = engine.stream(0).unwrap();
        assert_eq!(stream.processors()[0].lock().feeding().len(), 1);
    }

    #[test]
    fn test_bad_stream_command_notifies() {
        let engine = engine();
        engine.send(Command::SetSoundScope {
            stream: 9,
            scope: None,
        });
        engine.tick_once();

        let notifications = engine.poll_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].category, NotificationCategory::Command);
    }

    #[test]
    fn test_finished_pattern_notifies_once() {
        let engine = engine();
        engine.stream(0).unwrap().ports().set_loop(false, 0, 2);
        engine
            .stream(0)
            .unwrap()
            .ports()
            .set(crate::sequencer::ports::PortKey::Delay, 1.0);
        engine.play(0, SoundScope::Sequencer).unwrap();

        for _ in 0..10 {
            engine.tick_once();
        }

        let done: Vec<_> = engine
            .poll_notifications()
            .into_iter()
            .filter(|n| n.category == NotificationCategory::Sequencer)
            .collect();
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn test_set_bpm_rescales_delay() {
        let engine = engine();
        let before = engine.stream(0).unwrap().ports().delay();

        engine.send(Command::SetBpm(240.0));
        engine.tick_once();

        let after = engine.stream(0).unwrap().ports().delay();
        assert!((after - before / 2.0).abs() < 1e-9);
        assert_eq!(engine.clock().bpm(), 240.0);
    }

    #[test]
    fn test_threaded_start_stop() {
        let mut config = config();
        config.streams[0].super_threaded = true;
        let engine = Engine::new(config, Arc::new(VectorBufferPool::reserve_all(4, 512))).unwrap();
        engine.play(0, SoundScope::Sequencer).unwrap();

        engine.start_workers().unwrap();
        for _ in 0..20 {
            engine.tick_once();
        }
        assert_eq!(engine.worker(0).unwrap().delegated_count(), 60);

        engine.stop().unwrap();
        assert!(!engine.worker(0).unwrap().is_running());
    }
}
