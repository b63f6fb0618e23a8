// ChannelWorker - Dedicated thread running the staging program of one
// super-threaded channel
//
// The owning AudioWorker requests scopes and signals wakeup; the worker runs
// the program for those scopes and signals done. A request whose done was
// never waited for is outstanding: the next request or `settle()` consumes
// that done first, so run N always finishes before run N+1 starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::graph::channel::Channel;
use crate::graph::recall::StagingProgram;
use crate::graph::scope::ScopeMask;
use crate::pool::VectorBufferPool;
use crate::thread::sync::WorkerSync;

struct ChannelShared {
    name: String,
    channel: Arc<Channel>,
    sync: WorkerSync,
    running: AtomicBool,
    /// Set once the thread reached its wakeup wait
    synced: AtomicBool,
    requested: AtomicU32,
    /// A run was requested and its done not consumed yet
    outstanding: AtomicBool,
    program: Arc<RwLock<StagingProgram>>,
    pool: Arc<VectorBufferPool>,
    buffer_size: usize,
    runs: AtomicU64,
}

impl ChannelShared {
    fn thread_loop(&self) {
        log::debug!("Channel worker '{}' started", self.name);

        loop {
            self.synced.store(true, Ordering::Release);
            self.sync.wakeup.wait();

            if !self.running.load(Ordering::Acquire) {
                break;
            }

            let scopes = ScopeMask::from_bits(self.requested.swap(0, Ordering::AcqRel));
            {
                let program = self.program.read();
                self.channel
                    .run_program(scopes, &program, &self.pool, self.buffer_size);
            }
            self.runs.fetch_add(1, Ordering::Relaxed);

            self.sync.done.signal();
        }

        self.synced.store(false, Ordering::Release);
        log::debug!("Channel worker '{}' exiting", self.name);
    }
}

pub struct ChannelWorker {
    shared: Arc<ChannelShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelWorker {
    pub fn new(
        name: String,
        channel: Arc<Channel>,
        program: Arc<RwLock<StagingProgram>>,
        pool: Arc<VectorBufferPool>,
        buffer_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                name,
                channel,
                sync: WorkerSync::new(),
                running: AtomicBool::new(false),
                synced: AtomicBool::new(false),
                requested: AtomicU32::new(0),
                outstanding: AtomicBool::new(false),
                program,
                pool,
                buffer_size,
                runs: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.shared.channel
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Running and past its first rendezvous
    pub fn is_delegatable(&self) -> bool {
        self.is_running() && self.shared.synced.load(Ordering::Acquire)
    }

    /// Ticks this worker has run
    pub fn run_count(&self) -> u64 {
        self.shared.runs.load(Ordering::Relaxed)
    }

    pub fn start(&self) -> EngineResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(EngineError::AlreadyRunning(self.shared.name.clone()));
        }

        self.shared.sync.reset();
        self.shared.synced.store(false, Ordering::Release);
        self.shared.outstanding.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.thread_loop());

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(EngineError::WorkerSpawn(e))
            }
        }
    }

    /// Poll until the thread reached its first wait
    pub fn wait_synced(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_delegatable() {
            if !self.is_running() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(200));
        }
        true
    }

    /// Whether a requested run has not been waited for
    pub fn is_outstanding(&self) -> bool {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Ask for one run over `scopes`
    ///
    /// Blocks on the previous run first when nobody waited for it.
    pub fn request(&self, scopes: ScopeMask) {
        self.settle();
        self.shared.outstanding.store(true, Ordering::Release);
        self.shared
            .requested
            .fetch_or(scopes.bits(), Ordering::AcqRel);
        self.shared.sync.wakeup.signal();
    }

    /// Block until the requested run finished
    pub fn wait_done(&self) {
        self.shared.sync.done.wait();
        self.shared.outstanding.store(false, Ordering::Release);
    }

    /// Consume the done of an outstanding run, if any
    pub fn settle(&self) {
        if self.shared.outstanding.swap(false, Ordering::AcqRel) {
            self.shared.sync.done.wait();
        }
    }

    /// Stop the thread and release anybody parked on its done condition
    pub fn stop(&self) -> EngineResult<()> {
        let Some(join) = self.handle.lock().take() else {
            return Err(EngineError::NotRunning(self.shared.name.clone()));
        };

        self.shared.running.store(false, Ordering::Release);
        self.shared.sync.wakeup.release();

        if join.join().is_err() {
            log::error!("Channel worker '{}' panicked", self.shared.name);
        }

        self.shared.sync.done.release();
        self.shared.outstanding.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for ChannelWorker {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            let _ = self.stop();
        }
    }
}
