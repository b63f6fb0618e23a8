// AudioWorker - Per-stream tick: sequencer, inline channels, delegated
// channels, barrier, done
//
// One tick:
//   1. wait for wakeup, exactly once (inline bare playback skips it)
//   2. sequencer commit + PLAY, if the program has run-inter
//   3. every channel, inputs then outputs: inline, or delegated to its
//      ChannelWorker when super-threaded and that worker is delegatable
//   4. wait for every delegated worker's done (deferred in bare playback
//      until that worker's next request)
//   5. sequencer counter advance
//   6. signal own done

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::audio::clock::ClockSource;
use crate::error::{EngineError, EngineResult};
use crate::graph::recall::{Stage, StagingProgram};
use crate::graph::scope::{ScopeMask, SoundScope, selector_from_raw, selector_to_raw};
use crate::graph::stream::AudioStream;
use crate::pool::VectorBufferPool;
use crate::thread::channel_worker::ChannelWorker;
use crate::thread::sync::WorkerSync;

const CHILD_SYNC_TIMEOUT: Duration = Duration::from_secs(2);

struct AudioShared {
    name: String,
    stream: Arc<AudioStream>,
    clock: Arc<dyn ClockSource>,
    pool: Arc<VectorBufferPool>,
    sync: WorkerSync,
    /// Thread spawned and not asked to stop
    running: AtomicBool,
    /// Thread finished its first rendezvous
    synced: AtomicBool,
    shutdown: AtomicBool,
    /// `-1`: every non-playback scope
    sound_scope: AtomicI32,
    program: Arc<RwLock<StagingProgram>>,
    /// One per stream channel, same order as `AudioStream::channels`
    children: Vec<ChannelWorker>,
    /// Children delegated to during the current tick
    pending: Mutex<Vec<usize>>,
    ticks: AtomicU64,
    delegated: AtomicU64,
    skipped: AtomicU64,
}

impl AudioShared {
    fn selector(&self) -> Option<SoundScope> {
        selector_from_raw(self.sound_scope.load(Ordering::Acquire))
    }

    /// Inline tick on the caller's thread
    fn run(&self) {
        let selector = self.selector();
        if selector != Some(SoundScope::Playback) {
            self.sync.wakeup.wait();
        }
        self.process(selector);
    }

    /// Tick body after the wakeup; `selector` is read once per tick
    fn process(&self, selector: Option<SoundScope>) {
        let bare = selector == Some(SoundScope::Playback);
        self.synced.store(true, Ordering::Release);

        if self.shutdown.load(Ordering::Acquire) {
            self.sync.done.signal();
            return;
        }

        let scopes = ScopeMask::active(selector);
        let program = self.program.read();
        let sequencer = scopes.contains(SoundScope::Sequencer)
            && program.contains(Stage::RunInter)
            && self.stream.has_scope(SoundScope::Sequencer);

        if sequencer {
            self.stream.sequencer_run_inter(self.clock.as_ref());
        }

        {
            let mut pending = self.pending.lock();
            pending.clear();

            let buffer_size = self.stream.buffer_size();
            for (index, channel) in self.stream.channels().enumerate() {
                if !channel.is_super_threaded() {
                    if let Some(child) = self.children.get(index) {
                        child.settle();
                    }
                    channel.run_program(scopes, &program, &self.pool, buffer_size);
                    continue;
                }

                match self.children.get(index) {
                    Some(child) if child.is_delegatable() => {
                        child.request(scopes);
                        pending.push(index);
                    }
                    _ => {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                        log::trace!(
                            "Channel {} of '{}' has no running worker, skipped",
                            index,
                            self.name
                        );
                    }
                }
            }

            if !bare {
                for index in pending.iter() {
                    self.children[*index].wait_done();
                }
            }
            self.delegated
                .fetch_add(pending.len() as u64, Ordering::Relaxed);
        }

        if sequencer {
            self.stream.sequencer_counter_change();
        }

        drop(program);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.sync.done.signal();
    }

    fn thread_loop(&self) {
        log::info!("Audio worker '{}' started", self.name);

        while !self.shutdown.load(Ordering::Acquire) {
            self.synced.store(true, Ordering::Release);
            self.sync.wakeup.wait();
            self.process(self.selector());
        }

        self.synced.store(false, Ordering::Release);
        log::info!("Audio worker '{}' exiting", self.name);
    }
}

pub struct AudioWorker {
    shared: Arc<AudioShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AudioWorker {
    pub fn new(
        stream: Arc<AudioStream>,
        clock: Arc<dyn ClockSource>,
        pool: Arc<VectorBufferPool>,
        program: StagingProgram,
    ) -> Self {
        let name = format!("audio-{}", stream.name);
        let program = Arc::new(RwLock::new(program));

        let children = stream
            .channels()
            .map(|channel| {
                ChannelWorker::new(
                    format!("{}-ch{}", name, channel.index),
                    channel.clone(),
                    program.clone(),
                    pool.clone(),
                    stream.buffer_size(),
                )
            })
            .collect::<Vec<_>>();
        let pending = Vec::with_capacity(children.len());

        Self {
            shared: Arc::new(AudioShared {
                name,
                stream,
                clock,
                pool,
                sync: WorkerSync::new(),
                running: AtomicBool::new(false),
                synced: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                sound_scope: AtomicI32::new(selector_to_raw(None)),
                program,
                children,
                pending: Mutex::new(pending),
                ticks: AtomicU64::new(0),
                delegated: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn stream(&self) -> &Arc<AudioStream> {
        &self.shared.stream
    }

    pub fn children(&self) -> &[ChannelWorker] {
        &self.shared.children
    }

    /// Has its own thread
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.shared.synced.load(Ordering::Acquire)
    }

    /// Completed ticks
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Channel runs handed to child workers so far
    pub fn delegated_count(&self) -> u64 {
        self.shared.delegated.load(Ordering::Relaxed)
    }

    /// Super-threaded channel runs skipped for lack of a running child
    pub fn skipped_count(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    pub fn sound_scope(&self) -> Option<SoundScope> {
        self.shared.selector()
    }

    /// `None` processes every non-playback scope
    pub fn set_sound_scope(&self, scope: Option<SoundScope>) {
        self.shared
            .sound_scope
            .store(selector_to_raw(scope), Ordering::Release);
        log::debug!(
            "Audio worker '{}' sound scope: {}",
            self.shared.name,
            scope.map_or("all", SoundScope::name)
        );
    }

    /// Replace the program for this worker and its children (next tick)
    pub fn set_staging_program(&self, program: StagingProgram) {
        *self.shared.program.write() = program;
        log::debug!("Audio worker '{}' staging program replaced", self.shared.name);
    }

    pub fn staging_program(&self) -> StagingProgram {
        self.shared.program.read().clone()
    }

    /// One tick on the calling thread
    ///
    /// Outside bare playback this waits for `wakeup()` first.
    pub fn run(&self) {
        self.shared.run();
    }

    /// Let the next (or current) tick proceed
    pub fn wakeup(&self) {
        self.shared.sync.wakeup.signal();
    }

    /// Block until the current tick signalled done
    pub fn wait_done(&self) {
        self.shared.sync.done.wait();
    }

    /// Start the children of super-threaded channels, then the worker thread
    ///
    /// On failure no child is left running.
    pub fn start(&self) -> EngineResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(EngineError::AlreadyRunning(self.shared.name.clone()));
        }

        if let Err(e) = self.start_children() {
            self.stop_children();
            return Err(e);
        }

        self.shared.sync.reset();
        self.shared.shutdown.store(false, Ordering::Release);
        self.shared.synced.store(false, Ordering::Release);

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.thread_loop());

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                self.shared.running.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.stop_children();
                Err(EngineError::WorkerSpawn(e))
            }
        }
    }

    /// Stop every running child
    pub fn stop_children(&self) {
        for child in &self.shared.children {
            if child.is_running() {
                if let Err(e) = child.stop() {
                    log::warn!("Channel worker '{}' stop failed: {}", child.name(), e);
                }
            }
        }
    }

    /// Start a worker for every super-threaded channel and wait until each
    /// can take delegated work
    pub fn start_children(&self) -> EngineResult<()> {
        for child in &self.shared.children {
            if child.channel().is_super_threaded() && !child.is_running() {
                child.start()?;
            }
        }

        for child in &self.shared.children {
            if child.is_running() && !child.wait_synced(CHILD_SYNC_TIMEOUT) {
                log::warn!("Channel worker '{}' did not sync in time", child.name());
            }
        }
        Ok(())
    }

    /// Stop children, then the thread, then release anybody waiting on done
    pub fn stop(&self) -> EngineResult<()> {
        self.stop_children();

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.sync.wakeup.release();

        if let Some(join) = self.handle.lock().take() {
            if join.join().is_err() {
                log::error!("Audio worker '{}' panicked", self.shared.name);
            }
        }

        self.shared.running.store(false, Ordering::Release);
        self.shared.sync.done.release();
        Ok(())
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        if self.is_running() || self.shared.children.iter().any(ChannelWorker::is_running) {
            let _ = self.stop();
        }
    }
}
